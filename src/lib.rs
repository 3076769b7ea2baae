//! Provider-agnostic LLM streaming client for Umicom Studio.
//!
//! `ChatEngine` takes chat submissions from the UI thread, streams SSE responses on a bounded
//! worker pool and hands fragments (with optional top-k alternatives) to a `Sink`. The FIM
//! client covers unary code completion.

pub mod cancel;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fim;
pub mod lab;
pub mod net;
pub mod privacy;
pub mod provider_adapters;
pub mod sink;
pub mod sse;
pub mod state;
pub mod telemetry;
pub mod transport;

// Test support infrastructure (test_support/) is only compiled for unit tests.
#[cfg(test)]
pub(crate) mod test_support;

pub use cancel::CancelHandle;
pub use config::{Config, PrivacyMode, Preset, ProviderKind};
pub use engine::{chat_once, ChatEngine, ChatRequest, EngineOptions};
pub use errors::{ErrorKind, LlmError, TransportError};
pub use fim::FimRequest;
pub use lab::LlmLab;
pub use privacy::PrivacyGate;
pub use sink::{ChannelSink, Sink, SinkEvent, Terminal, TokenAlt, TokenFragment};
pub use sse::SseFramer;
pub use transport::{HttpTransport, Transport};
