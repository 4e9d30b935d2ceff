//! IP address and user-agent deny-lists
//!
//! Requests from listed addresses or user agents (office networks, monitoring
//! probes, crawlers) are never logged. The lists are built once from
//! configuration and are immutable afterwards.

use ipnet::IpNet;
use std::net::IpAddr;
use std::path::Path;
use tracing::{info, warn};

use crate::config::{ExclusionConfig, MatchMode};

#[derive(Debug, Clone, Default)]
struct DenyList {
    entries: Vec<String>,
    mode: MatchMode,
}

impl DenyList {
    fn new(entries: Vec<String>, mode: MatchMode) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        Self { entries, mode }
    }

    fn matches(&self, value: &str) -> bool {
        match self.mode {
            MatchMode::Exact => self.entries.iter().any(|e| e == value),
            MatchMode::Substring => self.entries.iter().any(|e| value.contains(e.as_str())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    ips: DenyList,
    /// IP entries written as networks, matched by containment in any mode
    networks: Vec<IpNet>,
    user_agents: DenyList,
}

impl ExclusionPolicy {
    pub fn new(
        ips: Vec<String>,
        ip_mode: MatchMode,
        user_agents: Vec<String>,
        user_agent_mode: MatchMode,
    ) -> Self {
        let ips = DenyList::new(ips, ip_mode);
        let networks = ips
            .entries
            .iter()
            .filter(|e| e.contains('/'))
            .filter_map(|e| match e.parse::<IpNet>() {
                Ok(net) => Some(net),
                Err(err) => {
                    warn!(entry = %e, error = %err, "ignoring malformed network in IP exclusion list");
                    None
                }
            })
            .collect();

        Self {
            ips,
            networks,
            user_agents: DenyList::new(user_agents, user_agent_mode),
        }
    }

    /// Build the policy from configuration, reading list files when given.
    ///
    /// An unreadable or malformed list file contributes nothing; the problem is
    /// logged and startup continues.
    pub fn from_config(config: &ExclusionConfig) -> Self {
        let mut ips = config.ips.clone();
        if let Some(path) = &config.ip_file {
            ips.extend(load_list_file(path));
        }

        let mut user_agents = config.user_agents.clone();
        if let Some(path) = &config.user_agent_file {
            user_agents.extend(load_list_file(path));
        }

        let policy = Self::new(
            ips,
            config.ip_match,
            user_agents,
            config.user_agent_match,
        );
        info!(
            ip_entries = policy.ips.entries.len(),
            user_agent_entries = policy.user_agents.entries.len(),
            "Loaded exclusion lists"
        );
        policy
    }

    /// Whether a request from this address and user agent must not be tracked
    pub fn is_excluded(&self, ip_address: &str, user_agent: &str) -> bool {
        self.is_ip_excluded(ip_address) || self.user_agents.matches(user_agent)
    }

    fn is_ip_excluded(&self, ip_address: &str) -> bool {
        if self.ips.matches(ip_address) {
            return true;
        }
        if self.networks.is_empty() {
            return false;
        }
        match ip_address.parse::<IpAddr>() {
            Ok(ip) => self.networks.iter().any(|net| net.contains(&ip)),
            Err(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ips.entries.is_empty() && self.user_agents.entries.is_empty()
    }
}

/// Read a yaml/toml/json list file with an `entries` array, or a bare yaml sequence
fn load_list_file(path: &str) -> Vec<String> {
    match read_entries(path) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %path, error = %err, "failed to load exclusion list, treating it as empty");
            Vec::new()
        }
    }
}

fn read_entries(path: &str) -> Result<Vec<String>, config::ConfigError> {
    let keyed = config::Config::builder()
        .add_source(config::File::from(Path::new(path)))
        .build()
        .and_then(|s| s.get::<Vec<String>>("entries"));

    match keyed {
        Ok(entries) => Ok(entries),
        Err(err) if is_yaml(path) => read_bare_sequence(path).map_err(|_| err),
        Err(err) => Err(err),
    }
}

fn is_yaml(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
}

/// Top-level `- entry` lists, parsed by nesting them under an `entries` key
fn read_bare_sequence(path: &str) -> Result<Vec<String>, config::ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| config::ConfigError::Message(format!("{path}: {e}")))?;
    let nested: String = text
        .lines()
        .filter(|line| !matches!(line.trim(), "---" | "..."))
        .map(|line| format!("  {line}\n"))
        .collect();

    config::Config::builder()
        .add_source(config::File::from_str(
            &format!("entries:\n{nested}"),
            config::FileFormat::Yaml,
        ))
        .build()?
        .get::<Vec<String>>("entries")
}
