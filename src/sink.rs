//! The boundary between workers and the UI.
//!
//! A `Sink` is called from the worker thread, serialized per request. UIs that need their own
//! thread use `ChannelSink` and drain the receiver from their event loop.

use std::sync::mpsc::Sender;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;

/// A piece of generated text. May be empty when an event only carried alternatives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenFragment {
    pub text: String,
}

impl TokenFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAlt {
    pub token: String,
    pub logprob: f64,
}

impl TokenAlt {
    pub fn new(token: impl Into<String>, logprob: f64) -> Self {
        Self {
            token: token.into(),
            logprob,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Terminal {
    Done,
    Cancelled,
    Denied { reason: String },
    Failed { kind: ErrorKind, message: String },
}

impl Terminal {
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Terminal::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Terminal::Done => "done",
            Terminal::Cancelled => "cancelled",
            Terminal::Denied { .. } => "denied",
            Terminal::Failed { .. } => "failed",
        }
    }
}

pub trait Sink: Send + Sync {
    /// `alts` is moved into the sink.
    fn on_fragment(&self, fragment: TokenFragment, alts: Vec<TokenAlt>);

    /// Called exactly once per request, last.
    fn on_terminal(&self, terminal: Terminal);
}

/// What a `ChannelSink` posts to the UI loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Fragment {
        request: u64,
        text: String,
        alts: Vec<TokenAlt>,
    },
    Terminal {
        request: u64,
        terminal: Terminal,
    },
}

impl SinkEvent {
    pub fn request(&self) -> u64 {
        match self {
            SinkEvent::Fragment { request, .. } | SinkEvent::Terminal { request, .. } => *request,
        }
    }
}

/// Forwards sink calls over an mpsc channel tagged with a request ticket.
#[derive(Debug)]
pub struct ChannelSink {
    request: u64,
    tx: Mutex<Sender<SinkEvent>>,
}

impl ChannelSink {
    pub fn new(request: u64, tx: Sender<SinkEvent>) -> Self {
        Self {
            request,
            tx: Mutex::new(tx),
        }
    }

    fn post(&self, event: SinkEvent) {
        // A closed receiver means the pane went away; the request still runs to its terminal.
        if self.tx.lock().send(event).is_err() {
            tracing::trace!(target = "ustudio_llm::sink", request = self.request, "receiver dropped");
        }
    }
}

impl Sink for ChannelSink {
    fn on_fragment(&self, fragment: TokenFragment, alts: Vec<TokenAlt>) {
        self.post(SinkEvent::Fragment {
            request: self.request,
            text: fragment.text,
            alts,
        });
    }

    fn on_terminal(&self, terminal: Terminal) {
        self.post(SinkEvent::Terminal {
            request: self.request,
            terminal,
        });
    }
}
