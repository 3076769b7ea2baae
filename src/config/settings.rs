//! Optional JSON settings file written by the preferences panel.
//!
//! Every field is optional; environment variables win over anything read here.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::LlmError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub privacy_mode: Option<String>,
    pub privacy_allow_ranges: Vec<String>,
    pub timeout_ms: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_logprobs: Option<u8>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, LlmError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LlmError::ConfigMissing(format!("settings file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            LlmError::ConfigMissing(format!("settings file {} is malformed: {e}", path.display()))
        })
    }
}
