//! Launchbot Q&A client library: sends a question, decodes the mixed
//! text/sources response stream, and renders the answer as annotated HTML.
//! Used by the `launchbot` CLI.

pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod messages;
pub mod transform;
pub mod transport;

pub use config::{default_config_path, ClientSection, Config, ConfigError, ServerSection};
pub use controller::{ExchangeSnapshot, ExchangeState, QueryController, NO_ANSWER_MESSAGE};
pub use decoder::{DecodeEvent, StreamDecoder};
pub use error::{ExchangeError, SourceError};
pub use messages::{QueryMessage, StreamMessage};
pub use transform::{source_label, source_terms, transform};
pub use transport::{ChunkSource, HttpChunkSource, HttpTransport, Transport};
