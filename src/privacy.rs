//! Privacy gate: decides whether a destination URL may be contacted at all.

use std::net::IpAddr;

use crate::config::{Config, PrivacyMode};
use crate::errors::LlmError;
use crate::net::{is_ip_literal, is_loopback_host, is_private_ip, parse_target, CidrRange};

pub const NON_LOCAL_REJECTED: &str = "non-local host rejected";

#[derive(Debug, Clone)]
pub struct PrivacyGate {
    mode: PrivacyMode,
    allow_ranges: Vec<CidrRange>,
}

impl PrivacyGate {
    pub fn new(mode: PrivacyMode, allow_ranges: Vec<CidrRange>) -> Self {
        Self { mode, allow_ranges }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.privacy, cfg.allow_ranges.clone())
    }

    /// `Ok(())` when the URL may be contacted, otherwise `PrivacyDenied` with a readable reason.
    /// Hostnames are never resolved; only literals can match an allow range.
    pub fn allow(&self, url: &str) -> Result<(), LlmError> {
        let (scheme, host) = parse_target(url)?;
        if scheme != "http" && scheme != "https" {
            return Err(LlmError::PrivacyDenied(format!(
                "unsupported scheme {scheme}"
            )));
        }
        if self.mode == PrivacyMode::Open || is_loopback_host(&host) {
            return Ok(());
        }
        if is_ip_literal(&host) {
            if let Ok(ip) = host.parse::<IpAddr>() {
                if self.allow_ranges.iter().any(|r| r.contains(ip)) {
                    return Ok(());
                }
            }
            if is_private_ip(&host) {
                tracing::debug!(target = "ustudio_llm::privacy", %host, "private address not in PRIVACY_ALLOW_RANGES");
            }
        }
        Err(LlmError::PrivacyDenied(NON_LOCAL_REJECTED.into()))
    }
}
