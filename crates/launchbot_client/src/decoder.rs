//! Response stream decoder.
//!
//! Chunks are decoded with a streaming UTF-8 decoder (incomplete sequences are
//! carried into the next chunk; byte order marks are not sniffed) and each
//! decoded chunk is classified on its own as either answer text or the
//! terminal sources message. There is no framing
//! on the wire: a text chunk that happens to be a JSON object tagged
//! `"sources"` is taken as the sources message.

use encoding_rs::{CoderResult, Decoder, UTF_8};

use crate::error::ExchangeError;
use crate::messages::StreamMessage;
use crate::transport::ChunkSource;

/// Outcome of one read step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A text token was appended to the answer.
    Text(String),
    /// Bytes arrived but did not yet complete a character.
    Pending,
    /// The sources message arrived; reading is over.
    Sources(Vec<String>),
    /// The body ended (or the decoder had already finished).
    End,
}

/// Decoder state for one exchange.
pub struct StreamDecoder {
    utf8: Decoder,
    answer: String,
    sources: Option<Vec<String>>,
    finished: bool,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            utf8: UTF_8.new_decoder_without_bom_handling(),
            answer: String::new(),
            sources: None,
            finished: false,
        }
    }

    /// Everything classified as text so far, in arrival order.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Source URLs, once the sources message has arrived.
    pub fn sources(&self) -> Option<&[String]> {
        self.sources.as_deref()
    }

    /// True after the sources message or the end of the body.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode and classify one raw chunk. Chunks fed after the decoder has
    /// finished are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> DecodeEvent {
        if self.finished {
            return DecodeEvent::End;
        }
        let text = self.decode(chunk, false);
        if text.is_empty() {
            return DecodeEvent::Pending;
        }
        match StreamMessage::classify(&text) {
            StreamMessage::Sources(urls) => {
                tracing::debug!(count = urls.len(), "sources message received");
                self.finished = true;
                self.sources = Some(urls.clone());
                DecodeEvent::Sources(urls)
            }
            StreamMessage::Text => {
                tracing::debug!(len = text.len(), "text token");
                self.answer.push_str(&text);
                DecodeEvent::Text(text)
            }
        }
    }

    /// Signal the end of the body. Bytes still held by the UTF-8 decoder are
    /// flushed (as U+FFFD) into a final text token.
    pub fn finish(&mut self) -> DecodeEvent {
        if self.finished {
            return DecodeEvent::End;
        }
        self.finished = true;
        let tail = self.decode(&[], true);
        if tail.is_empty() {
            DecodeEvent::End
        } else {
            self.answer.push_str(&tail);
            DecodeEvent::Text(tail)
        }
    }

    /// Pull one chunk from `source` and process it. Once finished, returns
    /// `End` without touching the source.
    pub async fn next_event<S>(&mut self, source: &mut S) -> Result<DecodeEvent, ExchangeError>
    where
        S: ChunkSource + ?Sized,
    {
        if self.finished {
            return Ok(DecodeEvent::End);
        }
        match source.next_chunk().await? {
            Some(bytes) => Ok(self.feed(&bytes)),
            None => Ok(self.finish()),
        }
    }

    /// Read `source` to completion, calling `on_progress` with the accumulated
    /// answer after every text token. Returns the source URLs (empty if the
    /// body ended without a sources message). On error, whatever was
    /// accumulated stays available through [`StreamDecoder::answer`].
    pub async fn run<S, F>(
        &mut self,
        source: &mut S,
        mut on_progress: F,
    ) -> Result<Vec<String>, ExchangeError>
    where
        S: ChunkSource + ?Sized,
        F: FnMut(&str),
    {
        loop {
            match self.next_event(source).await? {
                DecodeEvent::Text(_) => on_progress(&self.answer),
                DecodeEvent::Pending => {}
                DecodeEvent::Sources(urls) => return Ok(urls),
                DecodeEvent::End => return Ok(self.sources.clone().unwrap_or_default()),
            }
        }
    }

    fn decode(&mut self, bytes: &[u8], last: bool) -> String {
        let mut out = String::new();
        let mut input = bytes;
        loop {
            let needed = self
                .utf8
                .max_utf8_buffer_length(input.len())
                .unwrap_or(input.len() * 3 + 4);
            out.reserve(needed);
            let (result, read, _had_errors) = self.utf8.decode_to_string(input, &mut out, last);
            input = &input[read..];
            match result {
                CoderResult::InputEmpty => return out,
                CoderResult::OutputFull => continue,
            }
        }
    }
}
