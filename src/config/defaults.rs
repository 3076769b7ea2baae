//! Default endpoints, timeouts and limits

/// OpenAI-compatible defaults.
pub const OPENAI_BASE_DEFAULT: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL_DEFAULT: &str = "gpt-4o-mini";
pub const OPENAI_CHAT_PATH: &str = "/chat/completions";

/// Z.ai speaks the OpenAI framing under its own base path.
pub const ZAI_BASE_DEFAULT: &str = "https://api.z.ai/api/paas/v4";
pub const ZAI_MODEL_DEFAULT: &str = "glm-4.6";

/// Plain-text streaming server (llama.cpp style).
pub const PLAIN_BASE_DEFAULT: &str = "http://127.0.0.1:8080";
pub const PLAIN_MODEL_DEFAULT: &str = "default";
pub const PLAIN_COMPLETION_PATH: &str = "/completion";

/// Codestral FIM.
pub const CODESTRAL_BASE_DEFAULT: &str = "https://codestral.mistral.ai";
pub const CODESTRAL_MODEL_DEFAULT: &str = "codestral-latest";
pub const CODESTRAL_FIM_PATH: &str = "/v1/fim/completions";
pub const FIM_PREFIX_SENTINEL: &str = "<fim_prefix>";
pub const FIM_SUFFIX_SENTINEL: &str = "<fim_suffix>";
pub const FIM_MIDDLE_SENTINEL: &str = "<fim_middle>";
pub const FIM_MAX_TOKENS_DEFAULT: u32 = 64;
pub const FIM_TEMPERATURE_DEFAULT: f32 = 0.2;

/// Transport budget.
pub const TIMEOUT_MS_DEFAULT: u64 = 45_000;
pub const REDIAL_BACKOFF_MS: u64 = 200;

/// Streaming limits.
pub const MAX_PARSE_ERRORS_DEFAULT: u32 = 4;
pub const LOGPROBS_TOPK_CAP: u8 = 20;

/// Worker pool.
pub const WORKERS_DEFAULT: usize = 2;
pub const WORKERS_MAX: usize = 4;
