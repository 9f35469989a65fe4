//! Answer text → HTML.
//!
//! The text is split into prose and fenced code blocks. Prose gets `**bold**`
//! converted to `<strong>` and source path terms wrapped in `<mark>`; code
//! blocks are syntax-highlighted from their raw source, so prose markup never
//! lands inside code. Every step degrades to literal text instead of failing.

use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use url::Url;

use crate::error::SourceError;

const PLAINTEXT: &str = "plaintext";

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(|| SyntaxSet::load_defaults_newlines());

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(\w+)?\n(.*?)\n```").expect("fence pattern compiles")
});

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold pattern compiles"));

/// Render the final answer. Pure: the same `(text, sources)` always gives the
/// same HTML.
pub fn transform(text: &str, sources: &[String]) -> String {
    let highlighter = TermHighlighter::new(&source_terms(sources));
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in FENCE.captures_iter(text) {
        let Some(block) = caps.get(0) else { continue };
        out.push_str(&render_prose(&text[last..block.start()], &highlighter));
        let lang = caps.get(1).map(|m| m.as_str());
        let code = caps.get(2).map_or("", |m| m.as_str());
        out.push_str(&render_code_block(lang, code));
        last = block.end();
    }
    out.push_str(&render_prose(&text[last..], &highlighter));
    out
}

/// Non-empty path segments of every parseable source URL, de-duplicated
/// case-insensitively (first spelling wins).
pub fn source_terms(sources: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    for source in sources {
        let url = match Url::parse(source) {
            Ok(url) => url,
            Err(e) => {
                let issue = SourceError::UnparseableUrl {
                    url: source.clone(),
                    reason: e.to_string(),
                };
                tracing::debug!(error = %issue, "skipping source");
                continue;
            }
        };
        let Some(segments) = url.path_segments() else {
            continue;
        };
        for segment in segments.filter(|s| !s.is_empty()) {
            if seen.insert(segment.to_lowercase()) {
                terms.push(segment.to_string());
            }
        }
    }
    terms
}

/// Display label for a source link: host followed by path.
pub fn source_label(source: &str) -> String {
    match Url::parse(source) {
        Ok(url) => format!("{}{}", url.host_str().unwrap_or_default(), url.path()),
        Err(_) => source.to_string(),
    }
}

/// Wraps whole-word, case-insensitive occurrences of any term in `<mark>`, in
/// one pass so marks never nest.
struct TermHighlighter {
    pattern: Option<Regex>,
}

impl TermHighlighter {
    fn new(terms: &[String]) -> Self {
        let mut escaped: Vec<String> = terms.iter().map(|t| regex::escape(t)).collect();
        if escaped.is_empty() {
            return Self { pattern: None };
        }
        // Longest first: alternation is leftmost-first. Half boundaries only
        // look outward, so terms that start or end with punctuation still work.
        escaped.sort_by(|a, b| b.len().cmp(&a.len()));
        let pattern = format!(
            r"(?i)\b{{start-half}}(?:{})\b{{end-half}}",
            escaped.join("|")
        );
        let pattern = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(error = %e, "source highlighting disabled");
                None
            }
        };
        Self { pattern }
    }

    fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.pattern {
            Some(re) => re.replace_all(text, "<mark>$0</mark>"),
            None => Cow::Borrowed(text),
        }
    }
}

fn render_prose(text: &str, highlighter: &TermHighlighter) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in BOLD.captures_iter(text) {
        let (Some(span), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&highlighter.apply(&text[last..span.start()]));
        out.push_str("<strong>");
        out.push_str(&highlighter.apply(inner.as_str()));
        out.push_str("</strong>");
        last = span.end();
    }
    out.push_str(&highlighter.apply(&text[last..]));
    out
}

fn render_code_block(lang: Option<&str>, code: &str) -> String {
    let code = code.trim();
    let resolved = lang
        .map(|l| l.to_ascii_lowercase())
        .and_then(|l| find_syntax(&l).map(|syntax| (l, syntax)));
    let (language, body) = match resolved {
        Some((language, syntax)) => match highlight_code(code, syntax) {
            Ok(html) => (language, html),
            Err(e) => {
                tracing::warn!(%language, error = %e, "highlighting failed, rendering plain");
                (PLAINTEXT.to_string(), render_plain(code))
            }
        },
        None => (PLAINTEXT.to_string(), render_plain(code)),
    };
    format!(
        r#"<pre class="language-{0}"><code class="language-{0}">{1}</code></pre>"#,
        language, body
    )
}

/// Escaped code under the plain text grammar, which has no rules to fail.
fn render_plain(code: &str) -> String {
    highlight_code(code, SYNTAX_SET.find_syntax_plain_text()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "plain text rendering failed, dropping code block");
        String::new()
    })
}

fn find_syntax(lang: &str) -> Option<&'static SyntaxReference> {
    SYNTAX_SET.find_syntax_by_token(lang)
}

fn highlight_code(code: &str, syntax: &SyntaxReference) -> Result<String, syntect::Error> {
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, ClassStyle::Spaced);
    for line in LinesWithEndings::from(code) {
        generator.parse_html_for_line_which_includes_newline(line)?;
    }
    Ok(generator.finalize())
}
