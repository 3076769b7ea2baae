//! Request configuration for the LLM client.
//!
//! A `Config` is resolved once per request from the environment (optionally layered over a JSON
//! settings file) and treated as immutable afterwards.

pub mod defaults;
pub mod settings;

use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::net::CidrRange;
use defaults::*;
use settings::Settings;

/// Framing family spoken by the upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    OpenAiCompat,
    PlainText,
    CodestralFim,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAiCompat => "openai-compat",
            ProviderKind::PlainText => "plain-text",
            ProviderKind::CodestralFim => "codestral-fim",
        }
    }
}

/// Named provider presets. Each preset picks a framing family and its own env variable names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    OpenAi,
    Zai,
    Plain,
    Codestral,
}

struct PresetVars {
    key: &'static [&'static str],
    base: &'static [&'static str],
    model: &'static [&'static str],
    base_default: &'static str,
    model_default: &'static str,
}

impl Preset {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compat" | "openai_compat" => Some(Preset::OpenAi),
            "zai" | "z.ai" | "glm" => Some(Preset::Zai),
            "plain" | "plain-text" | "plain_text" | "llama" => Some(Preset::Plain),
            "codestral" | "codestral-fim" | "mistral" => Some(Preset::Codestral),
            _ => None,
        }
    }

    pub fn kind(self) -> ProviderKind {
        match self {
            Preset::OpenAi | Preset::Zai => ProviderKind::OpenAiCompat,
            Preset::Plain => ProviderKind::PlainText,
            Preset::Codestral => ProviderKind::CodestralFim,
        }
    }

    fn vars(self) -> PresetVars {
        match self {
            Preset::OpenAi => PresetVars {
                key: &["OPENAI_API_KEY"],
                base: &["OPENAI_BASE_URL", "OPENAI_API_BASE"],
                model: &["OPENAI_MODEL"],
                base_default: OPENAI_BASE_DEFAULT,
                model_default: OPENAI_MODEL_DEFAULT,
            },
            Preset::Zai => PresetVars {
                key: &["ZAI_API_KEY"],
                base: &["ZAI_API_BASE", "ZAI_BASE_URL"],
                model: &["ZAI_MODEL"],
                base_default: ZAI_BASE_DEFAULT,
                model_default: ZAI_MODEL_DEFAULT,
            },
            Preset::Plain => PresetVars {
                key: &["PLAIN_API_KEY"],
                base: &["PLAIN_BASE_URL"],
                model: &["PLAIN_MODEL"],
                base_default: PLAIN_BASE_DEFAULT,
                model_default: PLAIN_MODEL_DEFAULT,
            },
            Preset::Codestral => PresetVars {
                key: &["MISTRAL_API_KEY"],
                base: &["UENG_MISTRAL_BASE_URL"],
                model: &["UENG_MISTRAL_MODEL"],
                base_default: CODESTRAL_BASE_DEFAULT,
                model_default: CODESTRAL_MODEL_DEFAULT,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrivacyMode {
    LocalOnly,
    Open,
}

impl PrivacyMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local-only" | "local_only" | "local" | "1" | "true" | "on" => {
                Some(PrivacyMode::LocalOnly)
            }
            "open" | "off" | "0" | "false" => Some(PrivacyMode::Open),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FimSentinels {
    pub prefix: String,
    pub suffix: String,
    pub middle: String,
}

impl Default for FimSentinels {
    fn default() -> Self {
        Self {
            prefix: FIM_PREFIX_SENTINEL.into(),
            suffix: FIM_SUFFIX_SENTINEL.into(),
            middle: FIM_MIDDLE_SENTINEL.into(),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout_ms: u64,
    pub privacy: PrivacyMode,
    /// Private ranges permitted in local-only mode, on top of loopback.
    pub allow_ranges: Vec<CidrRange>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// 0 disables logprobs.
    pub top_logprobs: u8,
    pub fim: FimSentinels,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self
                .api_key
                .as_ref()
                .map(|k| SecretString::new(k.expose_secret().clone())),
            timeout_ms: self.timeout_ms,
            privacy: self.privacy,
            allow_ranges: self.allow_ranges.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_logprobs: self.top_logprobs,
            fim: self.fim.clone(),
        }
    }
}

impl Config {
    /// Local-only, no key, default timeout.
    pub fn new(provider: ProviderKind, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            timeout_ms: TIMEOUT_MS_DEFAULT,
            privacy: PrivacyMode::LocalOnly,
            allow_ranges: Vec::new(),
            temperature: None,
            max_tokens: None,
            top_logprobs: 0,
            fim: FimSentinels::default(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(key.into()));
        self
    }

    pub fn with_privacy(mut self, mode: PrivacyMode) -> Self {
        self.privacy = mode;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_top_logprobs(mut self, n: u8) -> Self {
        self.top_logprobs = n.min(LOGPROBS_TOPK_CAP);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The bearer token, for redaction only.
    pub fn secret(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret().as_str())
    }

    pub fn from_env() -> Self {
        Self::from_vars(|k| std::env::var(k).ok())
    }

    /// Resolve a config from any variable lookup. `LLM_PROVIDER` (or the settings file) picks the preset.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = load_settings(&lookup);
        let preset = match var(&lookup, &["LLM_PROVIDER"]) {
            Some(raw) => Preset::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(target = "ustudio_llm::config", value = %raw, "unknown LLM_PROVIDER, using openai-compat");
                Preset::OpenAi
            }),
            None => settings
                .provider
                .as_deref()
                .and_then(Preset::parse)
                .unwrap_or(Preset::OpenAi),
        };
        Self::resolve(preset, &settings, &lookup)
    }

    /// Resolve a specific preset, ignoring `LLM_PROVIDER`.
    pub fn preset_from_vars<F>(preset: Preset, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = load_settings(&lookup);
        Self::resolve(preset, &settings, &lookup)
    }

    fn resolve<F>(preset: Preset, settings: &Settings, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let names = preset.vars();
        // Settings-file endpoint only applies when it was written for the same preset.
        let settings_match = settings
            .provider
            .as_deref()
            .and_then(Preset::parse)
            .map_or(true, |p| p == preset);

        let base_url = var(lookup, names.base)
            .or_else(|| settings_match.then(|| settings.base_url.clone()).flatten())
            .unwrap_or_else(|| names.base_default.to_string());
        let model = var(lookup, names.model)
            .or_else(|| settings_match.then(|| settings.model.clone()).flatten())
            .unwrap_or_else(|| names.model_default.to_string());

        let mut cfg = Config::new(preset.kind(), base_url, model);
        cfg.api_key = var(lookup, names.key).map(SecretString::new);

        cfg.privacy = match var(lookup, &["PRIVACY_MODE", "UMI_PRIVACY_MODE"])
            .or_else(|| settings.privacy_mode.clone())
        {
            Some(raw) => PrivacyMode::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(target = "ustudio_llm::config", value = %raw, "unrecognised privacy mode, staying local-only");
                PrivacyMode::LocalOnly
            }),
            None => PrivacyMode::LocalOnly,
        };

        let mut ranges: Vec<String> = settings.privacy_allow_ranges.clone();
        if let Some(raw) = var(lookup, &["PRIVACY_ALLOW_RANGES"]) {
            ranges = raw.split(',').map(|s| s.trim().to_string()).collect();
        }
        cfg.allow_ranges = ranges
            .iter()
            .filter(|r| !r.is_empty())
            .filter_map(|r| {
                let parsed = CidrRange::parse(r);
                if parsed.is_none() {
                    tracing::warn!(target = "ustudio_llm::config", range = %r, "ignoring malformed allow range");
                }
                parsed
            })
            .collect();

        cfg.timeout_ms = parsed(lookup, &["LLM_TIMEOUT_MS", "LLM_TIMEOUTMS"], |v: &u64| *v > 0)
            .or(settings.timeout_ms.filter(|v| *v > 0))
            .unwrap_or(TIMEOUT_MS_DEFAULT);
        cfg.temperature = parsed(lookup, &["LLM_TEMPERATURE"], |v: &f32| v.is_finite() && *v >= 0.0)
            .or(settings.temperature);
        cfg.max_tokens = parsed(lookup, &["LLM_MAX_TOKENS"], |v: &u32| *v > 0).or(settings.max_tokens);
        cfg.top_logprobs = parsed(lookup, &["LLM_LOGPROBS_TOPK"], |_: &u8| true)
            .or(settings.top_logprobs)
            .unwrap_or(0)
            .min(LOGPROBS_TOPK_CAP);

        if let Some(pre) = var(lookup, &["UMI_FIM_PRE"]) {
            cfg.fim.prefix = pre;
        }
        if let Some(suf) = var(lookup, &["UMI_FIM_SUF"]) {
            cfg.fim.suffix = suf;
        }
        if let Some(mid) = var(lookup, &["UMI_FIM_MID"]) {
            cfg.fim.middle = mid;
        }
        cfg
    }
}

/// Engine pool size from `UMI_LLM_WORKERS`, clamped to 1..=4.
pub fn workers_from_env() -> usize {
    std::env::var("UMI_LLM_WORKERS")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|n| n.clamp(1, WORKERS_MAX))
        .unwrap_or(WORKERS_DEFAULT)
}

fn var<F>(lookup: &F, names: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|n| lookup(n))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn parsed<F, T, P>(lookup: &F, names: &[&str], valid: P) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    P: Fn(&T) -> bool,
{
    let raw = var(lookup, names)?;
    match raw.parse::<T>() {
        Ok(v) if valid(&v) => Some(v),
        _ => {
            tracing::warn!(target = "ustudio_llm::config", var = names[0], value = %raw, "invalid value, using default");
            None
        }
    }
}

fn load_settings<F>(lookup: &F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    let Some(path) = var(lookup, &["UMI_LLM_SETTINGS"]) else {
        return Settings::default();
    };
    match Settings::load(Path::new(&path)) {
        Ok(s) => s,
        Err(err) => {
            tracing::warn!(target = "ustudio_llm::config", error = %err, "settings file ignored");
            Settings::default()
        }
    }
}
