//! Codestral fill-in-the-middle client.

use bytes::Bytes;

use crate::config::defaults::{FIM_MAX_TOKENS_DEFAULT, FIM_TEMPERATURE_DEFAULT};
use crate::config::Config;
use crate::errors::{preview_body, redact_secrets, LlmError};
use crate::privacy::PrivacyGate;
use crate::provider_adapters::{codestral, resolve_endpoint};
use crate::transport::{HttpRequest, Transport};

#[derive(Debug, Clone)]
pub struct FimRequest {
    pub prefix: String,
    pub suffix: String,
    pub config: Config,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl FimRequest {
    /// Sampling comes from the config when set, otherwise the FIM defaults.
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>, config: Config) -> Self {
        let max_tokens = config.max_tokens.unwrap_or(FIM_MAX_TOKENS_DEFAULT);
        let temperature = config.temperature.unwrap_or(FIM_TEMPERATURE_DEFAULT);
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            config,
            max_tokens,
            temperature,
        }
    }
}

/// Send the request and return the raw 2xx body.
pub async fn request_raw(transport: &dyn Transport, req: &FimRequest) -> Result<Bytes, LlmError> {
    let cfg = &req.config;
    let url = resolve_endpoint(&cfg.base_url, cfg.provider);
    PrivacyGate::from_config(cfg).allow(&url)?;
    let Some(key) = cfg.api_key.as_ref() else {
        return Err(LlmError::ConfigMissing("MISTRAL_API_KEY is not set".into()));
    };

    let body = codestral::build_body(cfg, &req.prefix, &req.suffix, req.max_tokens, req.temperature);
    tracing::debug!(target = "ustudio_llm::fim", %url, model = %cfg.model, "sending fim request");
    let resp = transport
        .post_json(HttpRequest {
            url: &url,
            bearer: Some(key),
            body: &body,
            timeout: cfg.timeout(),
        })
        .await?;
    if !resp.is_success() {
        return Err(LlmError::HttpStatus {
            status: resp.status,
            body: redact_secrets(&preview_body(&String::from_utf8_lossy(&resp.body)), cfg.secret()),
        });
    }
    Ok(resp.body)
}

/// Completion text of a FIM request.
pub async fn complete(transport: &dyn Transport, req: &FimRequest) -> Result<String, LlmError> {
    let body = request_raw(transport, req).await?;
    codestral::parse_response(&body)
}
