//! Model behind the LLM Lab pane.
//!
//! The GUI calls `enqueue`/`cancel` from its thread and `pump` from its idle loop. Sink events
//! travel over a channel, so nothing here ever blocks on the network. Events belonging to a
//! superseded request are dropped by ticket.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::cancel::CancelHandle;
use crate::config::Config;
use crate::engine::{ChatEngine, ChatRequest};
use crate::sink::{ChannelSink, SinkEvent, Terminal, TokenAlt};

/// At most this many alternatives enter the entropy readout.
pub const ENTROPY_MAX_ALTS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct AltReadout {
    pub fragment: String,
    pub alts: Vec<TokenAlt>,
    /// Shannon entropy in nats of the renormalized top-k set.
    pub entropy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabStatus {
    Idle,
    Streaming { ticket: u64 },
    Finished(Terminal),
}

pub struct LlmLab {
    engine: Arc<ChatEngine>,
    tx: Sender<SinkEvent>,
    rx: Receiver<SinkEvent>,
    ticket: u64,
    active: Option<CancelHandle>,
    transcript: String,
    readouts: Vec<AltReadout>,
    status: LabStatus,
}

impl LlmLab {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            engine,
            tx,
            rx,
            ticket: 0,
            active: None,
            transcript: String::new(),
            readouts: Vec::new(),
            status: LabStatus::Idle,
        }
    }

    /// Start a new request, cancelling whatever was running. Returns the new ticket.
    pub fn enqueue(&mut self, system: &str, user: &str, config: Config) -> u64 {
        self.cancel();
        self.ticket += 1;
        self.transcript.clear();
        self.readouts.clear();
        let sink = Arc::new(ChannelSink::new(self.ticket, self.tx.clone()));
        let req = ChatRequest::new(system, user, config, sink);
        tracing::debug!(target = "ustudio_llm::lab", ticket = self.ticket, request_id = %req.id, "lab enqueue");
        self.active = Some(self.engine.submit(req));
        self.status = LabStatus::Streaming { ticket: self.ticket };
        self.ticket
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            self.engine.cancel(&handle);
        }
    }

    /// Apply every pending event of the current ticket. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            if event.request() != self.ticket {
                continue;
            }
            applied += 1;
            match event {
                SinkEvent::Fragment { text, alts, .. } => {
                    self.transcript.push_str(&text);
                    if !alts.is_empty() {
                        let entropy = entropy(&alts);
                        self.readouts.push(AltReadout {
                            fragment: text,
                            alts,
                            entropy,
                        });
                    }
                }
                SinkEvent::Terminal { terminal, .. } => {
                    self.active = None;
                    self.status = LabStatus::Finished(terminal);
                }
            }
        }
        applied
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn readouts(&self) -> &[AltReadout] {
        &self.readouts
    }

    pub fn status(&self) -> &LabStatus {
        &self.status
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// Entropy of the top-k distribution, renormalized with log-sum-exp.
pub fn entropy(alts: &[TokenAlt]) -> f64 {
    let alts = &alts[..alts.len().min(ENTROPY_MAX_ALTS)];
    if alts.is_empty() {
        return 0.0;
    }
    let max = alts
        .iter()
        .map(|a| a.logprob)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return 0.0;
    }
    let weights: Vec<f64> = alts.iter().map(|a| (a.logprob - max).exp()).collect();
    let z: f64 = weights.iter().sum();
    let z = if z > 0.0 { z } else { 1.0 };
    weights
        .iter()
        .map(|w| w / z)
        .filter(|p| *p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}
