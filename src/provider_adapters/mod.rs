//! Provider adapter modules for the supported framing families.
//!
//! Each adapter owns its endpoint path, request body shape and per-event decoding. Dispatch is a
//! plain `match` on `ProviderKind`.

pub mod codestral;
pub mod openai;
pub mod plain;


use serde_json::Value;

use crate::config::{Config, ProviderKind};
use crate::errors::LlmError;
use crate::sink::{TokenAlt, TokenFragment};
use crate::sse::SseFramer;

/// One decoded event: a fragment plus its alternatives.
pub type Decoded = (TokenFragment, Vec<TokenAlt>);

pub fn endpoint_path(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAiCompat => openai::ENDPOINT_PATH,
        ProviderKind::PlainText => plain::ENDPOINT_PATH,
        ProviderKind::CodestralFim => codestral::ENDPOINT_PATH,
    }
}

/// Absolute endpoint URL. Trailing `/` on the base is trimmed; the path is not appended twice.
pub fn resolve_endpoint(base_url: &str, kind: ProviderKind) -> String {
    let base = base_url.trim_end_matches('/');
    let path = endpoint_path(kind);
    if base.ends_with(path) {
        base.to_string()
    } else {
        format!("{base}{path}")
    }
}

/// Streaming request body for a system + user pair.
pub fn build_chat_body(cfg: &Config, system: &str, user: &str) -> Result<Value, LlmError> {
    match cfg.provider {
        ProviderKind::OpenAiCompat => Ok(openai::build_body(cfg, system, user, true)),
        ProviderKind::PlainText => Ok(plain::build_body(cfg, system, user)),
        ProviderKind::CodestralFim => Err(LlmError::ConfigMissing(
            "codestral-fim is a unary completion provider and cannot serve chat".into(),
        )),
    }
}

/// Decode a single event payload. `Ok(None)` means the event carried nothing to deliver.
pub fn decode_event(kind: ProviderKind, payload: &[u8]) -> Result<Option<Decoded>, String> {
    match kind {
        ProviderKind::OpenAiCompat => openai::decode_event(payload),
        ProviderKind::PlainText => Ok(plain::decode_event(payload)),
        ProviderKind::CodestralFim => Err("codestral-fim responses are unary, not streamed".into()),
    }
}

/// Result of feeding one network read through a `StreamDecoder`.
#[derive(Debug, Default)]
pub struct DecodeBatch {
    pub fragments: Vec<Decoded>,
    /// Set when the malformed-event bound was exceeded; fragments before it are still valid.
    pub fatal: Option<LlmError>,
}

/// Framer + provider parser + malformed-event counter for one request.
#[derive(Debug)]
pub struct StreamDecoder {
    kind: ProviderKind,
    framer: SseFramer,
    parse_errors: u32,
    max_parse_errors: u32,
}

impl StreamDecoder {
    pub fn new(kind: ProviderKind, max_parse_errors: u32) -> Self {
        Self {
            kind,
            framer: SseFramer::new(),
            parse_errors: 0,
            max_parse_errors,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> DecodeBatch {
        let payloads = self.framer.feed(bytes);
        self.decode_all(payloads)
    }

    /// End of body: flush an unterminated final line.
    pub fn finish(&mut self) -> DecodeBatch {
        let payloads = self.framer.finish();
        self.decode_all(payloads)
    }

    pub fn is_done(&self) -> bool {
        self.framer.is_done()
    }

    pub fn parse_errors(&self) -> u32 {
        self.parse_errors
    }

    fn decode_all(&mut self, payloads: Vec<Vec<u8>>) -> DecodeBatch {
        let mut batch = DecodeBatch::default();
        for payload in payloads {
            match decode_event(self.kind, &payload) {
                Ok(Some(decoded)) => batch.fragments.push(decoded),
                Ok(None) => {}
                Err(err) => {
                    self.parse_errors += 1;
                    if self.parse_errors > self.max_parse_errors {
                        batch.fatal = Some(LlmError::ParseFatal {
                            count: self.parse_errors,
                            last: err,
                        });
                        break;
                    }
                    tracing::warn!(
                        target = "ustudio_llm::parser",
                        count = self.parse_errors,
                        error = %LlmError::ParseTransient(err),
                        "skipping malformed event"
                    );
                }
            }
        }
        batch
    }
}
