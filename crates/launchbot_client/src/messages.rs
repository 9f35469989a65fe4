//! Wire messages. The request is a JSON object; the response body mixes plain
//! text with one terminal `{"type": "sources", "sources": [...]}` object.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::error::SourceError;

/// Kind tag of the terminal sources object.
pub const SOURCES_KIND: &str = "sources";

/// Client → server: `{"question": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMessage<'a> {
    pub question: &'a str,
}

impl<'a> QueryMessage<'a> {
    pub fn new(question: &'a str) -> Self {
        Self { question }
    }
}

/// One decoded chunk of the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// Part of the answer body.
    Text,
    /// The terminal sources object.
    Sources(Vec<String>),
}

impl StreamMessage {
    /// Classify a decoded chunk by shape: it is the sources message only when
    /// the whole chunk parses as JSON with `"type": "sources"`. Anything else,
    /// including valid JSON with another tag, is answer text.
    pub fn classify(chunk: &str) -> Self {
        let value: Value = match serde_json::from_str(chunk) {
            Ok(v) => v,
            Err(_) => return StreamMessage::Text,
        };
        let kind = value.get("type").and_then(|t| t.as_str());
        if kind != Some(SOURCES_KIND) {
            return StreamMessage::Text;
        }
        match source_list(value.get("sources")) {
            Ok(sources) => StreamMessage::Sources(deduplicate_sources(sources)),
            Err(e) => {
                tracing::warn!(error = %e, "treating sources as empty");
                StreamMessage::Sources(Vec::new())
            }
        }
    }
}

fn source_list(field: Option<&Value>) -> Result<Vec<String>, SourceError> {
    let items = field
        .and_then(|f| f.as_array())
        .ok_or(SourceError::MalformedPayload)?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or(SourceError::MalformedPayload)
        })
        .collect()
}

/// Drop repeated URLs, keeping the first occurrence of each.
pub fn deduplicate_sources(sources: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for source in sources {
        if seen.insert(source.clone()) {
            unique.push(source);
        }
    }
    unique
}
