//! Error taxonomy for the LLM client.
//!
//! `TransportError` stays inside the HTTP layer; everything that can reach a sink is an
//! `LlmError`, and every `LlmError` maps onto exactly one `ErrorKind`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes surfaced next to terminal failures.
pub const ERR_PRIVACY_DENIED: &str = "E-UMI-LLM-0100";
pub const ERR_CONFIG_MISSING: &str = "E-UMI-LLM-0101";
pub const ERR_CONNECT: &str = "E-UMI-LLM-0102";
pub const ERR_TIMEOUT: &str = "E-UMI-LLM-0103";
pub const ERR_HTTP_STATUS: &str = "E-UMI-LLM-0104";
pub const ERR_PARSE_TRANSIENT: &str = "E-UMI-LLM-0105";
pub const ERR_PARSE_FATAL: &str = "E-UMI-LLM-0106";
pub const ERR_CANCELLED: &str = "E-UMI-LLM-0107";
pub const ERR_UNKNOWN: &str = "E-UMI-LLM-0199";

const HTTP_BODY_PREVIEW_CHARS: usize = 512;
const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PrivacyDenied,
    ConfigMissing,
    Connect,
    Timeout,
    HttpStatus(u16),
    ParseTransient,
    ParseFatal,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::PrivacyDenied => ERR_PRIVACY_DENIED,
            ErrorKind::ConfigMissing => ERR_CONFIG_MISSING,
            ErrorKind::Connect => ERR_CONNECT,
            ErrorKind::Timeout => ERR_TIMEOUT,
            ErrorKind::HttpStatus(_) => ERR_HTTP_STATUS,
            ErrorKind::ParseTransient => ERR_PARSE_TRANSIENT,
            ErrorKind::ParseFatal => ERR_PARSE_FATAL,
            ErrorKind::Cancelled => ERR_CANCELLED,
            ErrorKind::Unknown => ERR_UNKNOWN,
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("privacy gate: {0}")]
    PrivacyDenied(String),
    #[error("configuration missing: {0}")]
    ConfigMissing(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("request timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("malformed event: {0}")]
    ParseTransient(String),
    #[error("too many malformed events ({count}); last error: {last}")]
    ParseFatal { count: u32, last: String },
    #[error("request cancelled")]
    Cancelled,
    #[error("{0}")]
    Unknown(String),
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::PrivacyDenied(_) => ErrorKind::PrivacyDenied,
            LlmError::ConfigMissing(_) => ErrorKind::ConfigMissing,
            LlmError::Connect(_) => ErrorKind::Connect,
            LlmError::Timeout { .. } => ErrorKind::Timeout,
            LlmError::HttpStatus { status, .. } => ErrorKind::HttpStatus(*status),
            LlmError::ParseTransient(_) => ErrorKind::ParseTransient,
            LlmError::ParseFatal { .. } => ErrorKind::ParseFatal,
            LlmError::Cancelled => ErrorKind::Cancelled,
            LlmError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

/// Errors produced by a `Transport`. Kept separate from `LlmError` so the engine can decide
/// on redials before anything is surfaced.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("request timed out after {elapsed_ms} ms")]
    Timeout {
        elapsed_ms: u64,
        /// True when no response byte had arrived yet.
        before_first_byte: bool,
    },
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("request cancelled")]
    Cancelled,
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// DNS/TCP/TLS failures and first-byte timeouts qualify for the single redial.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connect(_) => true,
            TransportError::Timeout {
                before_first_byte, ..
            } => *before_first_byte,
            _ => false,
        }
    }
}

impl From<TransportError> for LlmError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect(msg) => LlmError::Connect(msg),
            TransportError::Timeout { elapsed_ms, .. } => LlmError::Timeout { elapsed_ms },
            TransportError::HttpStatus { status, body } => LlmError::HttpStatus { status, body },
            TransportError::Cancelled => LlmError::Cancelled,
            TransportError::Other(msg) => LlmError::Unknown(msg),
        }
    }
}

static AUTH_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(authorization["']?\s*[:=]\s*["']?)(bearer\s+)?[^\s"',}]+"#)
        .expect("authorization header regex")
});
static BEARER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=\-]+").expect("bearer token regex"));

/// Strip credentials from a message before it reaches a sink or a log line.
pub fn redact_secrets(message: &str, secret: Option<&str>) -> String {
    let mut out = AUTH_HEADER_RE
        .replace_all(message, format!("${{1}}{REDACTED}").as_str())
        .into_owned();
    out = BEARER_RE
        .replace_all(&out, format!("Bearer {REDACTED}").as_str())
        .into_owned();
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        out = out.replace(secret, REDACTED);
    }
    out
}

/// Bounded preview of an upstream body for error messages.
pub fn preview_body(input: &str) -> String {
    let mut iter = input.chars();
    let mut out = String::new();
    for _ in 0..HTTP_BODY_PREVIEW_CHARS {
        match iter.next() {
            Some(ch) => out.push(ch),
            None => return out,
        }
    }
    if iter.next().is_some() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_authorization_header_value() {
        let msg = "request failed: Authorization: Bearer sk-live-123 rejected";
        let out = redact_secrets(msg, None);
        assert!(!out.contains("sk-live-123"), "{out}");
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn redacts_bare_bearer_and_literal_secret() {
        let msg = "upstream echoed bearer abc.def-ghi and key sk-raw";
        let out = redact_secrets(msg, Some("sk-raw"));
        assert!(!out.contains("abc.def-ghi"));
        assert!(!out.contains("sk-raw"));
    }

    #[test]
    fn redacts_json_authorization_field() {
        let msg = r#"{"authorization":"Bearer tok_1"}"#;
        let out = redact_secrets(msg, None);
        assert!(!out.contains("tok_1"), "{out}");
    }

    #[test]
    fn leaves_clean_messages_alone() {
        assert_eq!(redact_secrets("HTTP 500: boom", None), "HTTP 500: boom");
    }

    #[test]
    fn transient_classification() {
        assert!(TransportError::Connect("dns".into()).is_transient());
        assert!(TransportError::Timeout {
            elapsed_ms: 10,
            before_first_byte: true
        }
        .is_transient());
        assert!(!TransportError::Timeout {
            elapsed_ms: 10,
            before_first_byte: false
        }
        .is_transient());
        assert!(!TransportError::HttpStatus {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!TransportError::Cancelled.is_transient());
    }

    #[test]
    fn kinds_map_one_to_one() {
        let err: LlmError = TransportError::HttpStatus {
            status: 401,
            body: "nope".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::HttpStatus(401));
        assert_eq!(err.kind().code(), ERR_HTTP_STATUS);
        assert_eq!(LlmError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = "x".repeat(600);
        let out = preview_body(&body);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 515);
    }
}
