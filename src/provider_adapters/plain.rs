//! Plain-text streaming adapter: every `data:` payload is the fragment itself.

use serde_json::{json, Value};

use super::Decoded;
use crate::config::Config;
use crate::sink::TokenFragment;

pub const ENDPOINT_PATH: &str = crate::config::defaults::PLAIN_COMPLETION_PATH;

pub fn build_body(cfg: &Config, system: &str, user: &str) -> Value {
    let prompt = if system.is_empty() {
        user.to_string()
    } else {
        format!("{system}\n\n{user}")
    };
    let mut body = json!({
        "model": cfg.model,
        "prompt": prompt,
        "stream": true,
    });
    if let Some(t) = cfg.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(n) = cfg.max_tokens {
        body["n_predict"] = json!(n);
    }
    body
}

/// Empty payloads are keepalives and are dropped. Invalid UTF-8 is replaced, never rejected.
pub fn decode_event(payload: &[u8]) -> Option<Decoded> {
    if payload.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(payload).into_owned();
    Some((TokenFragment::new(text), Vec::new()))
}
