//! Client IP extraction from HTTP headers with trust validation
//!
//! This module resolves the visitor address that gets logged and checked
//! against the exclusion list:
//! - Honors X-Forwarded-For and Forwarded only when proxies are trusted
//! - Supports CF-Connecting-IP behind Cloudflare
//! - Falls back to the socket remote address otherwise

use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{TrackingConfig, TrustedProxyMode};

/// Which forwarding headers to believe
#[derive(Debug, Clone)]
pub struct ProxyTrust {
    pub mode: TrustedProxyMode,
    /// Number of proxy hops appended to X-Forwarded-For in front of the app
    pub num_trusted_proxies: Option<usize>,
    /// Proxy networks skipped when walking X-Forwarded-For from the right
    pub trusted_proxies: Vec<IpNet>,
}

impl ProxyTrust {
    pub fn from_config(config: &TrackingConfig) -> Self {
        let trusted_proxies = config
            .trusted_proxies
            .iter()
            .filter_map(|entry| parse_network(entry))
            .collect();

        Self {
            mode: config.trusted_proxy_mode,
            num_trusted_proxies: config.num_trusted_proxies,
            trusted_proxies,
        }
    }

    pub fn none() -> Self {
        Self {
            mode: TrustedProxyMode::None,
            num_trusted_proxies: None,
            trusted_proxies: Vec::new(),
        }
    }

    fn is_trusted_proxy(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(&ip))
    }
}

fn parse_network(entry: &str) -> Option<IpNet> {
    let entry = entry.trim();
    let parsed = entry
        .parse::<IpNet>()
        .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from));
    match parsed {
        Ok(net) => Some(net),
        Err(err) => {
            warn!(entry = %entry, error = %err, "ignoring malformed trusted proxy entry");
            None
        }
    }
}

/// Extract the client IP address from HTTP headers
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address (fallback)
/// * `trust` - Which forwarding headers to honor
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr, trust: &ProxyTrust) -> IpAddr {
    match trust.mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, trust).unwrap_or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

/// Extract IP from Cloudflare-specific header
fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Extract IP from standard headers (Forwarded, X-Forwarded-For)
fn extract_standard_ip(headers: &HeaderMap, trust: &ProxyTrust) -> Option<IpAddr> {
    // Prefer RFC 7239 Forwarded header
    if let Some(ips) = parse_forwarded(headers) {
        if let Some(ip) = pick_client(&ips, trust) {
            return Some(ip);
        }
    }

    let ips = parse_x_forwarded_for(headers)?;
    pick_client(&ips, trust)
}

/// Collect the `for=` addresses of a Forwarded header, left to right
fn parse_forwarded(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    // Forwarded: for=192.0.2.60;proto=http;by=203.0.113.43, for="[2001:db8::1]:4711"
    let ips: Vec<IpAddr> = forwarded
        .split(',')
        .flat_map(|element| element.split(';'))
        .filter_map(|param| {
            let param = param.trim();
            let (key, value) = param.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case("for") {
                return None;
            }
            parse_forwarded_node(value.trim())
        })
        .collect();

    if ips.is_empty() {
        None
    } else {
        Some(ips)
    }
}

fn parse_forwarded_node(value: &str) -> Option<IpAddr> {
    let value = value.trim_matches('"');
    if let Some(rest) = value.strip_prefix('[') {
        // Bracketed IPv6, optionally followed by :port
        let (addr, _) = rest.split_once(']')?;
        return addr.parse().ok();
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    // IPv4 with :port
    let (addr, _) = value.rsplit_once(':')?;
    addr.parse().ok()
}

fn parse_x_forwarded_for(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let ips: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    if ips.is_empty() {
        None
    } else {
        Some(ips)
    }
}

/// Pick the client out of a forwarding chain, validating trust right to left
fn pick_client(ips: &[IpAddr], trust: &ProxyTrust) -> Option<IpAddr> {
    // If num_trusted_proxies is specified, skip that many from the right
    if let Some(num_trusted) = trust.num_trusted_proxies {
        if ips.len() > num_trusted {
            return Some(ips[ips.len() - num_trusted - 1]);
        }
        // Not enough IPs in chain, return the leftmost (least trusted)
        return ips.first().copied();
    }

    // Walk from the right, the first address that is not a known proxy is the client
    if !trust.trusted_proxies.is_empty() {
        return ips
            .iter()
            .rev()
            .find(|ip| !trust.is_trusted_proxy(**ip))
            .or_else(|| ips.first())
            .copied();
    }

    // No trust configuration, return the rightmost IP
    ips.last().copied()
}
