use std::net::IpAddr;

use url::{Host, Url};

use crate::errors::LlmError;

/// Scheme and host of an absolute URL, lowercased. IPv6 hosts come back without brackets.
pub fn parse_target(u: &str) -> Result<(String, String), LlmError> {
    let url = Url::parse(u).map_err(|e| LlmError::PrivacyDenied(format!("invalid URL: {e}")))?;
    let host = match url.host() {
        Some(Host::Domain(d)) => d.to_ascii_lowercase(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(LlmError::PrivacyDenied("invalid URL: no host".into())),
    };
    Ok((url.scheme().to_ascii_lowercase(), host))
}

pub fn is_ip_literal(h: &str) -> bool {
    h.parse::<IpAddr>().is_ok()
}

/// `localhost`, 127.0.0.0/8 and `::1`.
pub fn is_loopback_host(h: &str) -> bool {
    if h.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match h.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback(),
        Err(_) => false,
    }
}

pub fn is_private_ip(h: &str) -> bool {
    if let Ok(IpAddr::V4(ip)) = h.parse() {
        let o = ip.octets();
        return o[0] == 10
            || (o[0] == 172 && (16..=31).contains(&o[1]))
            || (o[0] == 192 && o[1] == 168);
    }
    if let Ok(IpAddr::V6(ip)) = h.parse() {
        return ip.segments()[0] & 0xfe00 == 0xfc00;
    }
    false
}

/// An address block such as `10.0.0.0/8` or `fd00::/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix: u8,
}

impl CidrRange {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (addr, prefix) = match raw.split_once('/') {
            Some((a, p)) => (a, p.parse::<u8>().ok()?),
            None => {
                let ip: IpAddr = raw.parse().ok()?;
                let full = if ip.is_ipv4() { 32 } else { 128 };
                (raw, full)
            }
        };
        let network: IpAddr = addr.parse().ok()?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return None;
        }
        Some(Self { network, prefix })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}
