//! Transport seam: open a request for a question and pull raw body chunks.
//! `HttpTransport` is the production implementation over reqwest.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::Config;
use crate::error::ExchangeError;
use crate::messages::QueryMessage;

/// An open response body. Dropping it releases the underlying connection.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next raw chunk, or `None` once the body is complete. Chunk boundaries
    /// are arbitrary and may split a UTF-8 sequence.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ExchangeError>;
}

/// Issues one request per question.
#[async_trait]
pub trait Transport: Send + Sync {
    type Source: ChunkSource;

    async fn open(&self, question: &str) -> Result<Self::Source, ExchangeError>;
}

/// POSTs `{"question": ...}` as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Build from config: endpoint and connect timeout.
    pub fn from_config(config: &Config) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs()))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint().to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    type Source = HttpChunkSource;

    async fn open(&self, question: &str) -> Result<HttpChunkSource, ExchangeError> {
        tracing::info!(endpoint = %self.endpoint, "sending question");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&QueryMessage::new(question))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::StreamUnavailable(format!("HTTP {}", status)));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(ExchangeError::StreamUnavailable(
                "response has no body".into(),
            ));
        }
        Ok(HttpChunkSource { response })
    }
}

/// Streaming body of an HTTP response.
#[derive(Debug)]
pub struct HttpChunkSource {
    response: reqwest::Response,
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ExchangeError> {
        let chunk = self.response.chunk().await?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}
