//! HTTP transport with two verbs: unary `post_json` and chunked `post_stream`.
//!
//! Both verbs enforce a total-request deadline. `post_stream` checks the cancel handle at every
//! read and returns `TransportError::Cancelled` once it is set.

use std::ops::ControlFlow;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::time::{timeout_at, Instant};
use tokio_stream::StreamExt;

use crate::cancel::CancelHandle;
use crate::errors::{preview_body, redact_secrets, TransportError};

static USER_AGENT: Lazy<String> =
    Lazy::new(|| format!("ustudio-llm/{}", env!("CARGO_PKG_VERSION")));

/// One outbound POST.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub bearer: Option<&'a SecretString>,
    pub body: &'a Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Receives each network read. `Break` stops the stream early and counts as success.
pub type ChunkHandler<'a> = dyn FnMut(&[u8]) -> ControlFlow<()> + Send + 'a;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, req: HttpRequest<'_>) -> Result<HttpResponse, TransportError>;

    async fn post_stream(
        &self,
        req: HttpRequest<'_>,
        on_chunk: &mut ChunkHandler<'_>,
        cancel: &CancelHandle,
    ) -> Result<(), TransportError>;
}

/// reqwest-backed transport. One client is shared by all requests of an engine.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT.as_str())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Other(format!("http client init: {e}")))?;
        Ok(Self { client })
    }

    fn builder(&self, req: &HttpRequest<'_>) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(req.url).json(req.body);
        if let Some(token) = req.bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }
        builder
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn classify_send_error(err: reqwest::Error, started: Instant, secret: Option<&str>) -> TransportError {
    let msg = redact_secrets(&err.to_string(), secret);
    if err.is_timeout() {
        TransportError::Timeout {
            elapsed_ms: elapsed_ms(started),
            before_first_byte: true,
        }
    } else if err.is_connect() && !err.is_builder() {
        TransportError::Connect(msg)
    } else {
        TransportError::Other(msg)
    }
}

/// The body read is bounded by the request deadline; a stalled body yields an empty preview.
async fn status_error(resp: reqwest::Response, deadline: Instant, secret: Option<&str>) -> TransportError {
    let status = resp.status().as_u16();
    let body = match timeout_at(deadline, resp.text()).await {
        Ok(Ok(text)) => text,
        Ok(Err(_)) | Err(_) => String::new(),
    };
    TransportError::HttpStatus {
        status,
        body: redact_secrets(&preview_body(&body), secret),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, req: HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let started = Instant::now();
        let deadline = started + req.timeout;
        let secret = req.bearer.map(|s| s.expose_secret().as_str());
        let resp = match timeout_at(deadline, self.builder(&req).send()).await {
            Err(_) => {
                return Err(TransportError::Timeout {
                    elapsed_ms: elapsed_ms(started),
                    before_first_byte: true,
                })
            }
            Ok(Err(e)) => return Err(classify_send_error(e, started, secret)),
            Ok(Ok(resp)) => resp,
        };
        let status = resp.status().as_u16();
        let body = match timeout_at(deadline, resp.bytes()).await {
            Err(_) => {
                return Err(TransportError::Timeout {
                    elapsed_ms: elapsed_ms(started),
                    before_first_byte: false,
                })
            }
            Ok(Err(e)) => {
                return Err(TransportError::Other(redact_secrets(&e.to_string(), secret)))
            }
            Ok(Ok(b)) => b,
        };
        tracing::debug!(target = "ustudio_llm::transport", status, bytes = body.len(), "post_json complete");
        Ok(HttpResponse { status, body })
    }

    async fn post_stream(
        &self,
        req: HttpRequest<'_>,
        on_chunk: &mut ChunkHandler<'_>,
        cancel: &CancelHandle,
    ) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let started = Instant::now();
        let deadline = started + req.timeout;
        let secret = req.bearer.map(|s| s.expose_secret().as_str());
        let builder = self
            .builder(&req)
            .header("Accept", "text/event-stream");

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            sent = timeout_at(deadline, builder.send()) => match sent {
                Err(_) => {
                    return Err(TransportError::Timeout {
                        elapsed_ms: elapsed_ms(started),
                        before_first_byte: true,
                    })
                }
                Ok(Err(e)) => return Err(classify_send_error(e, started, secret)),
                Ok(Ok(resp)) => resp,
            },
        };

        if !resp.status().is_success() {
            return Err(tokio::select! {
                biased;
                _ = cancel.cancelled() => TransportError::Cancelled,
                err = status_error(resp, deadline, secret) => err,
            });
        }

        let mut stream = resp.bytes_stream();
        let mut received = 0usize;
        loop {
            // Dropping the stream on return aborts the connection.
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                next = timeout_at(deadline, stream.next()) => next,
            };
            let chunk = match next {
                Err(_) => {
                    return Err(TransportError::Timeout {
                        elapsed_ms: elapsed_ms(started),
                        before_first_byte: received == 0,
                    })
                }
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => {
                    let msg = redact_secrets(&e.to_string(), secret);
                    return Err(if received == 0 {
                        TransportError::Connect(msg)
                    } else {
                        TransportError::Other(msg)
                    });
                }
                Ok(Some(Ok(chunk))) => chunk,
            };
            if chunk.is_empty() {
                continue;
            }
            received += chunk.len();
            if on_chunk(&chunk).is_break() {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
        }
    }
}
