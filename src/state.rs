//! Per-request lifecycle.
//!
//! ```text
//! Created -> Submitted -> Connecting -> Streaming -> Done
//!                 |            |            |
//!               Denied       Failed      Cancelled
//! ```
//! Connecting may re-enter itself once for a redial. Terminal states accept no transitions.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Created,
    Submitted,
    Connecting,
    Streaming,
    Done,
    Denied,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid request transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RequestState,
    pub to: RequestState,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Done | RequestState::Denied | RequestState::Failed | RequestState::Cancelled
        )
    }

    pub fn can_transition(self, to: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, to),
            (Created, Submitted)
                | (Submitted, Connecting | Denied | Failed | Cancelled)
                | (Connecting, Connecting | Streaming | Done | Failed | Cancelled)
                | (Streaming, Done | Failed | Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Created => "created",
            RequestState::Submitted => "submitted",
            RequestState::Connecting => "connecting",
            RequestState::Streaming => "streaming",
            RequestState::Done => "done",
            RequestState::Denied => "denied",
            RequestState::Failed => "failed",
            RequestState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one request's state and logs each move.
#[derive(Debug)]
pub struct Lifecycle {
    state: RequestState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: RequestState::Created,
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn transition(&mut self, to: RequestState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition(to) {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(target = "ustudio_llm::state", from = %self.state, %to, "transition");
        self.state = to;
        Ok(())
    }
}
