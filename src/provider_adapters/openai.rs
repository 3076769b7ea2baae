//! OpenAI-compatible adapter (also serves the Z.ai preset).
//!
//! Streams `choices[0].delta.content`, with optional `logprobs.content[0].top_logprobs`.

use serde_json::{json, Map, Value};

use super::Decoded;
use crate::config::Config;
use crate::sink::{TokenAlt, TokenFragment};

pub const ENDPOINT_PATH: &str = crate::config::defaults::OPENAI_CHAT_PATH;

pub fn build_body(cfg: &Config, system: &str, user: &str, stream: bool) -> Value {
    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": user}));

    let mut body = Map::new();
    body.insert("model".into(), Value::String(cfg.model.clone()));
    body.insert("messages".into(), Value::Array(messages));
    body.insert("stream".into(), Value::Bool(stream));
    if let Some(t) = cfg.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(n) = cfg.max_tokens {
        body.insert("max_tokens".into(), json!(n));
    }
    if stream && cfg.top_logprobs > 0 {
        body.insert("logprobs".into(), Value::Bool(true));
        body.insert("top_logprobs".into(), json!(cfg.top_logprobs));
    }
    Value::Object(body)
}

pub fn decode_event(payload: &[u8]) -> Result<Option<Decoded>, String> {
    let v: Value = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
    let choice = v.pointer("/choices/0");
    let content = choice
        .and_then(|c| c.pointer("/delta/content"))
        .and_then(Value::as_str);
    let alts = choice
        .and_then(|c| c.pointer("/logprobs/content/0"))
        .map(extract_alts)
        .unwrap_or_default();

    match content {
        Some(text) if !text.is_empty() || !alts.is_empty() => {
            Ok(Some((TokenFragment::new(text), alts)))
        }
        None if !alts.is_empty() => Ok(Some((TokenFragment::default(), alts))),
        _ => Ok(None),
    }
}

/// `top_logprobs` in wire order; a lone `token`/`logprob` pair when the list is absent.
fn extract_alts(entry: &Value) -> Vec<TokenAlt> {
    if let Some(list) = entry.get("top_logprobs").and_then(Value::as_array) {
        return list.iter().filter_map(alt_from).collect();
    }
    alt_from(entry).into_iter().collect()
}

fn alt_from(v: &Value) -> Option<TokenAlt> {
    let token = v.get("token")?.as_str()?;
    let logprob = v.get("logprob")?.as_f64()?;
    Some(TokenAlt::new(token, logprob))
}

/// Content of a non-streaming chat completion.
pub fn message_content(v: &Value) -> Option<&str> {
    v.pointer("/choices/0/message/content").and_then(Value::as_str)
}
