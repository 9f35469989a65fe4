//! Shared test fixtures: an in-process axum server that streams scripted
//! replies on `/ask`, and an in-memory chunk source for the decoder.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures_util::{stream, StreamExt};
use launchbot_client::{ChunkSource, ExchangeError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Pause between body chunks so the client reads them separately.
const CHUNK_PAUSE: Duration = Duration::from_millis(30);

/// What the server answers to one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with a streamed body that ends normally.
    Chunks(Vec<Vec<u8>>),
    /// 200 with a streamed body that aborts after the chunks.
    ChunksThenDrop(Vec<Vec<u8>>),
    /// Bare status with an empty body.
    Status(u16),
}

impl Reply {
    pub fn text_chunks(chunks: &[&str]) -> Self {
        Reply::Chunks(chunks.iter().map(|c| c.as_bytes().to_vec()).collect())
    }
}

/// Request as seen by the server.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub content_type: Option<String>,
    pub body: String,
}

/// `{"type":"sources","sources":[...]}` with the backend's blank-line prefix.
pub fn sources_chunk(urls: &[&str]) -> String {
    let payload = serde_json::json!({ "type": "sources", "sources": urls });
    format!("\n\n{}", payload)
}

#[derive(Clone)]
struct ServerState {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    captured: mpsc::UnboundedSender<CapturedRequest>,
}

fn router(replies: Vec<Reply>) -> (Router, mpsc::UnboundedReceiver<CapturedRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = ServerState {
        replies: Arc::new(Mutex::new(replies.into())),
        captured: tx,
    };
    let app = Router::new().route("/ask", post(ask)).with_state(state);
    (app, rx)
}

async fn ask(State(state): State<ServerState>, headers: HeaderMap, body: String) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let _ = state.captured.send(CapturedRequest { content_type, body });

    let reply = state.replies.lock().unwrap().pop_front();
    match reply {
        Some(Reply::Chunks(chunks)) => streamed(chunks, false),
        Some(Reply::ChunksThenDrop(chunks)) => streamed(chunks, true),
        Some(Reply::Status(code)) => StatusCode::from_u16(code).unwrap().into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

fn streamed(chunks: Vec<Vec<u8>>, abort: bool) -> Response {
    let mut items: Vec<Result<Vec<u8>, std::io::Error>> = chunks.into_iter().map(Ok).collect();
    if abort {
        items.push(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "scripted drop",
        )));
    }
    let body = stream::iter(items).then(|item| async move {
        tokio::time::sleep(CHUNK_PAUSE).await;
        item
    });
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

/// Start a server on a free port. Returns the `/ask` URL and a receiver of
/// captured requests.
pub async fn spawn_server(
    replies: Vec<Reply>,
) -> (String, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/ask", listener.local_addr().unwrap());
    let (app, rx) = router(replies);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (url, rx)
}

/// Same as [`spawn_server`] but on its own thread and runtime, for tests that
/// block (e.g. running the CLI binary).
pub fn spawn_server_thread(replies: Vec<Reply>) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let url = format!("http://{}/ask", std_listener.local_addr().unwrap());
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = TcpListener::from_std(std_listener).unwrap();
            let (app, _rx) = router(replies);
            axum::serve(listener, app).await.unwrap();
        });
    });
    url
}

/// Pick a port nothing is listening on.
pub fn unused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/ask", port)
}

/// In-memory chunk source that replays a fixed script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    chunks: VecDeque<Result<Vec<u8>, ExchangeError>>,
}

impl ScriptedSource {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| Ok(c.into())).collect(),
        }
    }

    /// Append a read failure after the scripted chunks.
    pub fn then_fail(mut self, error: ExchangeError) -> Self {
        self.chunks.push_back(Err(error));
        self
    }

    /// Chunks not yet read.
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait]
impl ChunkSource for ScriptedSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ExchangeError> {
        self.chunks.pop_front().transpose()
    }
}
