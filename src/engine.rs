//! Chat engine: the public facade.
//!
//! Owns a small multi-thread runtime whose worker count bounds concurrent requests. `submit`
//! never blocks the caller. Each request is driven by one task; sink calls for a request come
//! from that task only, so they are serialized.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

use crate::cancel::CancelHandle;
use crate::config::defaults::{MAX_PARSE_ERRORS_DEFAULT, REDIAL_BACKOFF_MS, WORKERS_DEFAULT, WORKERS_MAX};
use crate::config::{workers_from_env, Config, ProviderKind};
use crate::errors::{redact_secrets, LlmError, TransportError};
use crate::fim::{self, FimRequest};
use crate::privacy::PrivacyGate;
use crate::provider_adapters::{self, openai, DecodeBatch, StreamDecoder};
use crate::sink::{Sink, Terminal, TokenFragment};
use crate::state::{Lifecycle, RequestState};
use crate::transport::{HttpRequest, HttpTransport, Transport};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Worker threads, also the number of requests in flight at once.
    pub workers: usize,
    pub redial_backoff: Duration,
    /// Malformed events tolerated per request before `ParseFatal`.
    pub max_parse_errors: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            workers: WORKERS_DEFAULT,
            redial_backoff: Duration::from_millis(REDIAL_BACKOFF_MS),
            max_parse_errors: MAX_PARSE_ERRORS_DEFAULT,
        }
    }
}

impl EngineOptions {
    /// Defaults with the pool size taken from `UMI_LLM_WORKERS`.
    pub fn from_env() -> Self {
        Self {
            workers: workers_from_env(),
            ..Self::default()
        }
    }
}

/// One streaming chat submission.
pub struct ChatRequest {
    pub id: Uuid,
    pub system: String,
    pub user: String,
    pub config: Config,
    pub sink: Arc<dyn Sink>,
    pub cancel: CancelHandle,
}

impl ChatRequest {
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        config: Config,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            system: system.into(),
            user: user.into(),
            config,
            sink,
            cancel: CancelHandle::new(),
        }
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    options: EngineOptions,
}

pub struct ChatEngine {
    runtime: Option<Runtime>,
    shared: Arc<Shared>,
}

impl ChatEngine {
    pub fn new(options: EngineOptions) -> Result<Self, LlmError> {
        let transport = HttpTransport::new().map_err(LlmError::from)?;
        Self::with_transport(options, Arc::new(transport))
    }

    pub fn with_transport(
        mut options: EngineOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, LlmError> {
        options.workers = options.workers.clamp(1, WORKERS_MAX);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.workers)
            .thread_name("llm-worker")
            .enable_all()
            .build()
            .map_err(|e| LlmError::Unknown(format!("failed to start worker pool: {e}")))?;
        tracing::debug!(target = "ustudio_llm::engine", workers = options.workers, "engine started");
        Ok(Self {
            runtime: Some(runtime),
            shared: Arc::new(Shared {
                transport,
                permits: Arc::new(Semaphore::new(options.workers)),
                options,
            }),
        })
    }

    /// Queue a streaming chat. Returns at once; progress arrives on the request's sink.
    pub fn submit(&self, req: ChatRequest) -> CancelHandle {
        let cancel = req.cancel.clone();
        let span = tracing::info_span!(
            "chat",
            request_id = %req.id,
            provider = req.config.provider.as_str()
        );
        let shared = self.shared.clone();
        self.spawn(async move { drive_chat(shared, req).await }.instrument(span));
        cancel
    }

    /// Queue a FIM completion. The result arrives as one fragment followed by `Done`.
    pub fn submit_fim(&self, req: FimRequest, sink: Arc<dyn Sink>) -> CancelHandle {
        let cancel = CancelHandle::new();
        let span = tracing::info_span!(
            "fim",
            request_id = %Uuid::new_v4(),
            provider = req.config.provider.as_str()
        );
        let shared = self.shared.clone();
        let task_cancel = cancel.clone();
        self.spawn(async move { drive_fim(shared, req, sink, task_cancel).await }.instrument(span));
        cancel
    }

    /// Idempotent; a no-op once the request is terminal.
    pub fn cancel(&self, handle: &CancelHandle) {
        handle.cancel();
    }

    fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if let Some(rt) = &self.runtime {
            rt.spawn(fut);
        }
    }
}

impl Drop for ChatEngine {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.take() {
            if tokio::runtime::Handle::try_current().is_ok() {
                rt.shutdown_background();
            } else {
                rt.shutdown_timeout(Duration::from_secs(1));
            }
        }
    }
}

/// Per-request streaming state owned by the worker.
struct StreamContext {
    decoder: StreamDecoder,
    sink: Arc<dyn Sink>,
    cancel: CancelHandle,
    lifecycle: Lifecycle,
    bytes: usize,
    delivered: usize,
    fatal: Option<LlmError>,
}

impl StreamContext {
    fn on_chunk(&mut self, chunk: &[u8]) -> ControlFlow<()> {
        if self.bytes == 0 {
            advance(&mut self.lifecycle, RequestState::Streaming);
        }
        self.bytes += chunk.len();
        let batch = self.decoder.feed(chunk);
        self.deliver(batch)
    }

    fn deliver(&mut self, batch: DecodeBatch) -> ControlFlow<()> {
        for (fragment, alts) in batch.fragments {
            if self.cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            self.sink.on_fragment(fragment, alts);
            self.delivered += 1;
        }
        if let Some(fatal) = batch.fatal {
            self.fatal = Some(fatal);
            return ControlFlow::Break(());
        }
        if self.decoder.is_done() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

fn advance(lifecycle: &mut Lifecycle, to: RequestState) {
    if let Err(err) = lifecycle.transition(to) {
        tracing::warn!(target = "ustudio_llm::engine", error = %err, "ignored state transition");
    }
}

fn failure(err: &LlmError, secret: Option<&str>) -> Terminal {
    Terminal::failed(err.kind(), redact_secrets(&err.to_string(), secret))
}

async fn drive_chat(shared: Arc<Shared>, req: ChatRequest) {
    let mut lifecycle = Lifecycle::new();
    advance(&mut lifecycle, RequestState::Submitted);
    let (terminal, lifecycle) = run_chat(&shared, &req, lifecycle).await;
    tracing::info!(target = "ustudio_llm::engine", state = %lifecycle.state(), terminal = terminal.label(), "request finished");
    req.sink.on_terminal(terminal);
}

async fn run_chat(shared: &Shared, req: &ChatRequest, mut lifecycle: Lifecycle) -> (Terminal, Lifecycle) {
    let cfg = &req.config;

    let _permit = tokio::select! {
        biased;
        _ = req.cancel.cancelled() => {
            advance(&mut lifecycle, RequestState::Cancelled);
            return (Terminal::Cancelled, lifecycle);
        }
        permit = shared.permits.clone().acquire_owned() => match permit {
            Ok(p) => p,
            Err(_) => {
                advance(&mut lifecycle, RequestState::Failed);
                return (failure(&LlmError::Unknown("engine shut down".into()), None), lifecycle);
            }
        },
    };

    let url = provider_adapters::resolve_endpoint(&cfg.base_url, cfg.provider);
    if let Err(err) = PrivacyGate::from_config(cfg).allow(&url) {
        advance(&mut lifecycle, RequestState::Denied);
        let reason = match err {
            LlmError::PrivacyDenied(reason) => reason,
            other => other.to_string(),
        };
        tracing::info!(target = "ustudio_llm::engine", %reason, "privacy gate denied request");
        return (Terminal::Denied { reason }, lifecycle);
    }
    if req.cancel.is_cancelled() {
        advance(&mut lifecycle, RequestState::Cancelled);
        return (Terminal::Cancelled, lifecycle);
    }

    let body = match provider_adapters::build_chat_body(cfg, &req.system, &req.user) {
        Ok(body) => body,
        Err(err) => {
            advance(&mut lifecycle, RequestState::Failed);
            return (failure(&err, cfg.secret()), lifecycle);
        }
    };

    let mut ctx = StreamContext {
        decoder: StreamDecoder::new(cfg.provider, shared.options.max_parse_errors),
        sink: req.sink.clone(),
        cancel: req.cancel.clone(),
        lifecycle,
        bytes: 0,
        delivered: 0,
        fatal: None,
    };

    let mut redialed = false;
    loop {
        advance(&mut ctx.lifecycle, RequestState::Connecting);
        let http = HttpRequest {
            url: &url,
            bearer: cfg.api_key.as_ref(),
            body: &body,
            timeout: cfg.timeout(),
        };
        let result = {
            let mut on_chunk = |chunk: &[u8]| ctx.on_chunk(chunk);
            shared
                .transport
                .post_stream(http, &mut on_chunk, &req.cancel)
                .await
        };

        let terminal = match result {
            Ok(()) => finish_stream(&mut ctx, cfg),
            Err(TransportError::Cancelled) => Terminal::Cancelled,
            Err(err)
                if !redialed
                    && err.is_transient()
                    && ctx.bytes == 0
                    && ctx.delivered == 0
                    && !req.cancel.is_cancelled() =>
            {
                redialed = true;
                tracing::warn!(
                    target = "ustudio_llm::engine",
                    error = %redact_secrets(&err.to_string(), cfg.secret()),
                    backoff_ms = shared.options.redial_backoff.as_millis() as u64,
                    "transient transport failure, redialing once"
                );
                tokio::select! {
                    biased;
                    _ = req.cancel.cancelled() => Terminal::Cancelled,
                    _ = tokio::time::sleep(shared.options.redial_backoff) => continue,
                }
            }
            Err(err) => failure(&LlmError::from(err), cfg.secret()),
        };

        let terminal = if req.cancel.is_cancelled() && !matches!(terminal, Terminal::Failed { .. }) {
            Terminal::Cancelled
        } else {
            terminal
        };
        advance(&mut ctx.lifecycle, terminal_state(&terminal));
        return (terminal, ctx.lifecycle);
    }
}

/// Body ended or the handler stopped it: surface a parse failure, flush a trailing line, or finish.
fn finish_stream(ctx: &mut StreamContext, cfg: &Config) -> Terminal {
    if let Some(fatal) = ctx.fatal.take() {
        return failure(&fatal, cfg.secret());
    }
    if ctx.cancel.is_cancelled() {
        return Terminal::Cancelled;
    }
    if !ctx.decoder.is_done() {
        let batch = ctx.decoder.finish();
        let _ = ctx.deliver(batch);
        if let Some(fatal) = ctx.fatal.take() {
            return failure(&fatal, cfg.secret());
        }
    }
    Terminal::Done
}

async fn drive_fim(shared: Arc<Shared>, req: FimRequest, sink: Arc<dyn Sink>, cancel: CancelHandle) {
    let mut lifecycle = Lifecycle::new();
    advance(&mut lifecycle, RequestState::Submitted);

    let url = provider_adapters::resolve_endpoint(&req.config.base_url, req.config.provider);
    let terminal = if let Err(err) = PrivacyGate::from_config(&req.config).allow(&url) {
        Terminal::Denied {
            reason: match err {
                LlmError::PrivacyDenied(reason) => reason,
                other => other.to_string(),
            },
        }
    } else {
        advance(&mut lifecycle, RequestState::Connecting);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            outcome = async {
                let _permit = shared.permits.clone().acquire_owned().await;
                fim::complete(shared.transport.as_ref(), &req).await
            } => outcome,
        };
        match outcome {
            Ok(text) => {
                advance(&mut lifecycle, RequestState::Streaming);
                sink.on_fragment(TokenFragment::new(text), Vec::new());
                Terminal::Done
            }
            Err(LlmError::Cancelled) => Terminal::Cancelled,
            Err(err) => failure(&err, req.config.secret()),
        }
    };

    advance(&mut lifecycle, terminal_state(&terminal));
    tracing::info!(target = "ustudio_llm::engine", terminal = terminal.label(), "fim finished");
    sink.on_terminal(terminal);
}

fn terminal_state(terminal: &Terminal) -> RequestState {
    match terminal {
        Terminal::Done => RequestState::Done,
        Terminal::Cancelled => RequestState::Cancelled,
        Terminal::Denied { .. } => RequestState::Denied,
        Terminal::Failed { .. } => RequestState::Failed,
    }
}

/// Unary chat: posts `stream: false` and returns `choices[0].message.content`.
pub async fn chat_once(
    transport: &dyn Transport,
    cfg: &Config,
    system: &str,
    user: &str,
) -> Result<String, LlmError> {
    if cfg.provider != ProviderKind::OpenAiCompat {
        return Err(LlmError::ConfigMissing(format!(
            "unary chat needs an openai-compat provider, got {}",
            cfg.provider.as_str()
        )));
    }
    let url = provider_adapters::resolve_endpoint(&cfg.base_url, cfg.provider);
    PrivacyGate::from_config(cfg).allow(&url)?;
    let body = openai::build_body(cfg, system, user, false);
    let resp = transport
        .post_json(HttpRequest {
            url: &url,
            bearer: cfg.api_key.as_ref(),
            body: &body,
            timeout: cfg.timeout(),
        })
        .await?;
    if !resp.is_success() {
        return Err(LlmError::HttpStatus {
            status: resp.status,
            body: redact_secrets(
                &crate::errors::preview_body(&String::from_utf8_lossy(&resp.body)),
                cfg.secret(),
            ),
        });
    }
    let v: serde_json::Value = serde_json::from_slice(&resp.body).map_err(|e| LlmError::ParseFatal {
        count: 1,
        last: e.to_string(),
    })?;
    openai::message_content(&v)
        .map(str::to_string)
        .ok_or_else(|| LlmError::ParseFatal {
            count: 1,
            last: "response has no choices[0].message.content".into(),
        })
}
