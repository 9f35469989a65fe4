//! One question/answer exchange at a time: request, stream, transform.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DEFAULT_FALLBACK_MESSAGE};
use crate::decoder::{DecodeEvent, StreamDecoder};
use crate::error::ExchangeError;
use crate::transform::transform;
use crate::transport::{HttpTransport, Transport};

/// Final answer shown when the stream completes without any text.
pub const NO_ANSWER_MESSAGE: &str = "No answer returned.";

/// Lifecycle of the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    Idle,
    AwaitingFirstByte,
    StreamingText,
    SourcesReceived,
    Transforming,
    Completed,
    Failed,
    Cancelled,
}

impl ExchangeState {
    /// True while a request is outstanding or its answer is being built.
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            ExchangeState::AwaitingFirstByte
                | ExchangeState::StreamingText
                | ExchangeState::SourcesReceived
                | ExchangeState::Transforming
        )
    }
}

/// Controller state handed to a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeSnapshot {
    pub state: ExchangeState,
    pub loading: bool,
    /// Answer text accumulated so far.
    pub partial_answer: String,
    /// Rendered HTML, set once the exchange completes.
    pub final_answer: Option<String>,
    pub sources: Vec<String>,
    /// User-facing message when the exchange failed.
    pub error: Option<String>,
}

/// Drives exchanges over a [`Transport`].
///
/// `ask` takes `&mut self`, so exchanges on one controller never overlap. A new
/// `ask` supersedes an exchange whose future was dropped before finishing: its
/// answer, sources and error are discarded.
pub struct QueryController<T: Transport> {
    transport: T,
    fallback_message: String,
    state: ExchangeState,
    partial_answer: String,
    final_answer: Option<String>,
    sources: Vec<String>,
    error: Option<String>,
}

impl QueryController<HttpTransport> {
    /// HTTP controller with endpoint, timeout and fallback message from `config`.
    pub fn from_config(config: &Config) -> Result<Self, ExchangeError> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(transport).with_fallback_message(config.fallback_message()))
    }
}

impl<T: Transport> QueryController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            state: ExchangeState::Idle,
            partial_answer: String::new(),
            final_answer: None,
            sources: Vec::new(),
            error: None,
        }
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn partial_answer(&self) -> &str {
        &self.partial_answer
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn snapshot(&self) -> ExchangeSnapshot {
        ExchangeSnapshot {
            state: self.state,
            loading: self.loading(),
            partial_answer: self.partial_answer.clone(),
            final_answer: self.final_answer.clone(),
            sources: self.sources.clone(),
            error: self.error.clone(),
        }
    }

    /// Ask `question`, calling `on_progress` with the accumulated answer after
    /// every text token.
    pub async fn ask<F>(&mut self, question: &str, on_progress: F) -> Result<(), ExchangeError>
    where
        F: FnMut(&str),
    {
        self.ask_with_cancel(question, &CancellationToken::new(), on_progress)
            .await
    }

    /// Like [`QueryController::ask`], but stops reading and releases the
    /// response as soon as `cancel` fires.
    ///
    /// An empty question is rejected before any state change or request.
    /// On failure the partial answer is kept, `loading` is cleared and the
    /// fallback message is exposed through [`QueryController::error_message`].
    pub async fn ask_with_cancel<F>(
        &mut self,
        question: &str,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<(), ExchangeError>
    where
        F: FnMut(&str),
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(ExchangeError::EmptyQuestion);
        }
        if self.state.is_loading() {
            tracing::debug!(previous = ?self.state, "superseding unfinished exchange");
        }
        self.reset();
        self.transition(ExchangeState::AwaitingFirstByte);

        match self.exchange(question, cancel, on_progress).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn exchange<F>(
        &mut self,
        question: &str,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<(), ExchangeError>
    where
        F: FnMut(&str),
    {
        let mut source = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExchangeError::Cancelled),
            opened = self.transport.open(question) => opened?,
        };

        let mut decoder = StreamDecoder::new();
        let sources = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExchangeError::Cancelled),
                event = decoder.next_event(&mut source) => event?,
            };
            if self.state == ExchangeState::AwaitingFirstByte && event != DecodeEvent::End {
                self.transition(ExchangeState::StreamingText);
            }
            match event {
                DecodeEvent::Text(token) => {
                    self.partial_answer.push_str(&token);
                    on_progress(&self.partial_answer);
                }
                DecodeEvent::Pending => {}
                DecodeEvent::Sources(urls) => {
                    self.transition(ExchangeState::SourcesReceived);
                    break urls;
                }
                DecodeEvent::End => break Vec::new(),
            }
        };
        drop(source);

        self.sources = sources;
        self.transition(ExchangeState::Transforming);
        let html = if self.partial_answer.is_empty() {
            NO_ANSWER_MESSAGE.to_string()
        } else {
            transform(&self.partial_answer, &self.sources)
        };
        self.final_answer = Some(html);
        self.transition(ExchangeState::Completed);
        tracing::info!(
            answer_len = self.partial_answer.len(),
            sources = self.sources.len(),
            "exchange completed"
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.partial_answer.clear();
        self.final_answer = None;
        self.sources.clear();
        self.error = None;
    }

    fn fail(&mut self, error: &ExchangeError) {
        tracing::warn!(%error, state = ?self.state, "exchange ended early");
        if *error == ExchangeError::Cancelled {
            self.transition(ExchangeState::Cancelled);
        } else {
            self.error = Some(self.fallback_message.clone());
            self.transition(ExchangeState::Failed);
        }
    }

    fn transition(&mut self, next: ExchangeState) {
        tracing::debug!(from = ?self.state, to = ?next, "exchange state");
        self.state = next;
    }
}
