//! In-memory `Transport` that replays one script per attempt.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;

use crate::cancel::CancelHandle;
use crate::errors::TransportError;
use crate::transport::{ChunkHandler, HttpRequest, HttpResponse, Transport};

/// What a single call to the transport does.
#[derive(Debug)]
pub enum Script {
    /// Deliver each chunk as one read, then end the body (or fail with `then`).
    Stream {
        chunks: Vec<Vec<u8>>,
        then: Option<TransportError>,
    },
    /// Fail before any byte.
    Fail(TransportError),
    /// Unary response.
    Json { status: u16, body: String },
}

impl Script {
    pub fn stream(chunks: Vec<Vec<u8>>) -> Self {
        Script::Stream { chunks, then: None }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub body: Value,
    pub had_bearer: bool,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<RecordedRequest>>,
    calls: AtomicUsize,
    read_delay: Duration,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    /// Pause before every read, so cancellation can land mid-stream.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    fn next(&self, req: &HttpRequest<'_>) -> Script {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(RecordedRequest {
            url: req.url.to_string(),
            body: req.body.clone(),
            had_bearer: req.bearer.is_some(),
        });
        self.scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Script::Fail(TransportError::Other("script exhausted".into())))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, req: HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        match self.next(&req) {
            Script::Json { status, body } => Ok(HttpResponse {
                status,
                body: Bytes::from(body),
            }),
            Script::Fail(err) => Err(err),
            Script::Stream { .. } => Err(TransportError::Other("stream script on post_json".into())),
        }
    }

    async fn post_stream(
        &self,
        req: HttpRequest<'_>,
        on_chunk: &mut ChunkHandler<'_>,
        cancel: &CancelHandle,
    ) -> Result<(), TransportError> {
        let (chunks, then) = match self.next(&req) {
            Script::Stream { chunks, then } => (chunks, then),
            Script::Fail(err) => return Err(err),
            Script::Json { .. } => return Err(TransportError::Other("json script on post_stream".into())),
        };
        for chunk in chunks {
            if !self.read_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                    _ = tokio::time::sleep(self.read_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            if let ControlFlow::Break(()) = on_chunk(&chunk) {
                return Ok(());
            }
        }
        match then {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
