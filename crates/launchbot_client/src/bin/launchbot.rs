//! launchbot: ask the Launchbot backend a question from the terminal.
//! Reads config, posts the question, streams the answer to stdout, then prints
//! the sources (and optionally the rendered HTML).

use clap::{ArgAction, Parser};
use launchbot_client::config::{self, Config};
use launchbot_client::{source_label, ExchangeError, QueryController};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "launchbot", version, about = "Ask Launchbot a question")]
struct Cli {
    /// Config file (defaults to ~/.launchbot/config.yaml).
    #[arg(long, env = "LAUNCHBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the server endpoint from the config.
    #[arg(long)]
    endpoint: Option<String>,

    /// Print the rendered HTML answer after streaming.
    #[arg(long)]
    html: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// The question; read from stdin when omitted.
    question: Option<String>,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(explicit: Option<PathBuf>) -> Config {
    // An explicit path must exist; a missing default file means defaults.
    if let Some(path) = explicit {
        return config::load(&path).unwrap_or_else(|e| {
            eprintln!("Error: failed to load config from {}: {}", path.display(), e);
            process::exit(1);
        });
    }
    match config::default_config_path() {
        Some(path) if path.exists() => config::load(&path).unwrap_or_else(|e| {
            eprintln!("Error: failed to load config from {}: {}", path.display(), e);
            process::exit(1);
        }),
        _ => Config::default(),
    }
}

fn read_question(arg: Option<String>) -> String {
    if let Some(q) = arg {
        return q.trim().to_string();
    }
    let mut line = String::new();
    if let Err(e) = io::stdin().lock().read_line(&mut line) {
        eprintln!("Error: failed to read question from stdin: {}", e);
        process::exit(1);
    }
    line.trim().to_string()
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cfg = load_config(cli.config);
    if let Some(endpoint) = cli.endpoint {
        cfg.server.endpoint = Some(endpoint);
    }

    let print_html = cli.html;
    let question = read_question(cli.question);
    if question.is_empty() {
        eprintln!("Error: no question provided");
        process::exit(1);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    let code = rt.block_on(async {
        let mut controller = match QueryController::from_config(&cfg) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let stdout = io::stdout();
        let mut out = stdout.lock();
        let mut printed = 0;
        let result = controller
            .ask_with_cancel(&question, &cancel, |answer| {
                let _ = write!(out, "{}", &answer[printed..]);
                let _ = out.flush();
                printed = answer.len();
            })
            .await;
        let _ = writeln!(out);

        let code = match result {
            Ok(()) => {
                if print_html {
                    if let Some(html) = controller.final_answer() {
                        let _ = writeln!(out, "\n{}", html);
                    }
                }
                if !controller.sources().is_empty() {
                    let _ = writeln!(out, "\nSources:");
                    for src in controller.sources() {
                        let _ = writeln!(out, "  {} ({})", source_label(src), src);
                    }
                }
                0
            }
            Err(ExchangeError::Cancelled) => {
                eprintln!("Cancelled.");
                130
            }
            Err(e) => {
                eprintln!(
                    "{}\nError: {}",
                    controller.error_message().unwrap_or_default(),
                    e
                );
                1
            }
        };
        let _ = out.flush();
        code
    });
    process::exit(code);
}
