//! Codestral fill-in-the-middle adapter. Unary only.

use serde_json::{json, Value};

use crate::config::{Config, FimSentinels};
use crate::errors::LlmError;

pub const ENDPOINT_PATH: &str = crate::config::defaults::CODESTRAL_FIM_PATH;

pub fn build_prompt(sentinels: &FimSentinels, prefix: &str, suffix: &str) -> String {
    let mut out = String::with_capacity(
        prefix.len()
            + suffix.len()
            + sentinels.prefix.len()
            + sentinels.suffix.len()
            + sentinels.middle.len(),
    );
    out.push_str(&sentinels.prefix);
    out.push_str(prefix);
    out.push_str(&sentinels.suffix);
    out.push_str(suffix);
    out.push_str(&sentinels.middle);
    out
}

pub fn build_body(cfg: &Config, prefix: &str, suffix: &str, max_tokens: u32, temperature: f32) -> Value {
    json!({
        "model": cfg.model,
        "prompt": build_prompt(&cfg.fim, prefix, suffix),
        "max_tokens": max_tokens,
        "temperature": temperature,
        "stream": false,
    })
}

/// Completion text: `choices[0].text`, else `choices[0].message.content`.
pub fn parse_response(body: &[u8]) -> Result<String, LlmError> {
    let v: Value = serde_json::from_slice(body)
        .map_err(|e| LlmError::ParseFatal { count: 1, last: e.to_string() })?;
    v.pointer("/choices/0/text")
        .or_else(|| v.pointer("/choices/0/message/content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::ParseFatal {
            count: 1,
            last: "response has no choices[0].text".into(),
        })
}
