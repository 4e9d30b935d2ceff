use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub storefront_server: ServerConfig,
    pub auth: AuthConfig,
    pub storefront: StorefrontConfig,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accepted `X-API-Key` values. Empty disables authentication.
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontConfig {
    /// Directory with the static storefront served behind the tracker
    pub static_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket address only
    None,
    /// Honor Forwarded / X-Forwarded-For
    Standard,
    /// Honor CF-Connecting-IP
    Cloudflare,
}

/// How deny-list entries are compared against request values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-sensitive equality
    #[default]
    Exact,
    /// Case-sensitive containment
    Substring,
}

impl MatchMode {
    fn from_env_value(name: &str, value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "exact" => MatchMode::Exact,
            "substring" | "contains" => MatchMode::Substring,
            other => {
                tracing::warn!(
                    "Unknown {name} '{other}', falling back to 'exact'. Supported values: exact, substring"
                );
                MatchMode::Exact
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionConfig {
    /// Inline IP entries (addresses or CIDR networks)
    pub ips: Vec<String>,
    /// Inline user-agent entries
    pub user_agents: Vec<String>,
    /// Optional list file with an `entries` array (yaml, toml or json)
    pub ip_file: Option<String>,
    pub user_agent_file: Option<String>,
    pub ip_match: MatchMode,
    pub user_agent_match: MatchMode,
}

/// Upper bound on the visitor cookie lifetime (about ten years)
pub const MAX_COOKIE_DAYS: i64 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub enabled: bool,
    /// Query parameter carrying the ad tracking code
    pub ad_param: String,
    pub cookie_name: String,
    pub cookie_days: i64,
    pub cookie_secure: bool,
    /// Inactivity after which the next request starts a new visit
    pub visit_timeout_secs: i64,
    /// Bound on every storage call made from the tracking path
    pub write_timeout_ms: u64,
    /// How long known ad codes stay cached
    pub ad_cache_secs: u64,
    pub trusted_proxy_mode: TrustedProxyMode,
    pub num_trusted_proxies: Option<usize>,
    /// CIDR ranges of proxies allowed to set forwarding headers
    pub trusted_proxies: Vec<String>,
    pub exclude: ExclusionConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ad_param: "ad".to_string(),
            cookie_name: "adtrack_vid".to_string(),
            cookie_days: 30,
            cookie_secure: false,
            visit_timeout_secs: 1800,
            write_timeout_ms: 500,
            ad_cache_secs: 60,
            trusted_proxy_mode: TrustedProxyMode::None,
            num_trusted_proxies: None,
            trusted_proxies: Vec::new(),
            exclude: ExclusionConfig {
                ips: Vec::new(),
                user_agents: Vec::new(),
                ip_file: None,
                user_agent_file: None,
                ip_match: MatchMode::Exact,
                user_agent_match: MatchMode::Exact,
            },
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} has an invalid value '{v}'")),
        Err(_) => Ok(default),
    }
}

fn cookie_days_in_range(days: i64) -> i64 {
    let clamped = days.clamp(1, MAX_COOKIE_DAYS);
    if clamped != days {
        tracing::warn!(
            "TRACKING_COOKIE_DAYS {days} is out of range, using {clamped}. Supported range: 1..={MAX_COOKIE_DAYS}"
        );
    }
    clamped
}

impl TrackingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = TrackingConfig::default();

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .with_context(|| format!("NUM_TRUSTED_PROXIES has an invalid value '{v}'"))
            })
            .transpose()?;

        let ip_match = std::env::var("EXCLUDE_IP_MATCH")
            .map(|v| MatchMode::from_env_value("EXCLUDE_IP_MATCH", &v))
            .unwrap_or_default();
        let user_agent_match = std::env::var("EXCLUDE_UA_MATCH")
            .map(|v| MatchMode::from_env_value("EXCLUDE_UA_MATCH", &v))
            .unwrap_or_default();

        Ok(TrackingConfig {
            enabled: env_flag("TRACKING_ENABLED", defaults.enabled),
            ad_param: std::env::var("TRACKING_AD_PARAM").unwrap_or(defaults.ad_param),
            cookie_name: std::env::var("TRACKING_COOKIE_NAME").unwrap_or(defaults.cookie_name),
            cookie_days: cookie_days_in_range(env_parse(
                "TRACKING_COOKIE_DAYS",
                defaults.cookie_days,
            )?),
            cookie_secure: env_flag("TRACKING_COOKIE_SECURE", defaults.cookie_secure),
            visit_timeout_secs: env_parse(
                "TRACKING_VISIT_TIMEOUT_SECS",
                defaults.visit_timeout_secs,
            )?,
            write_timeout_ms: env_parse("TRACKING_WRITE_TIMEOUT_MS", defaults.write_timeout_ms)?,
            ad_cache_secs: env_parse("TRACKING_AD_CACHE_SECS", defaults.ad_cache_secs)?,
            trusted_proxy_mode,
            num_trusted_proxies,
            trusted_proxies: env_list("TRUSTED_PROXIES"),
            exclude: ExclusionConfig {
                ips: env_list("EXCLUDE_IPS"),
                user_agents: env_list("EXCLUDE_USER_AGENTS"),
                ip_file: std::env::var("EXCLUDE_IP_FILE").ok(),
                user_agent_file: std::env::var("EXCLUDE_UA_FILE").ok(),
                ip_match,
                user_agent_match,
            },
        })
    }
}

impl TrackingConfig {
    /// Re-read tracking settings for a running server.
    ///
    /// Values from the env file replace variables that are already set, so
    /// edits made after startup take effect.
    pub fn reload_from_env(env_file: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let loaded = match env_file {
            Some(path) => dotenvy::from_path_override(path).map(|_| ()),
            None => dotenvy::dotenv_override().map(|_| ()),
        };
        if let Err(e) = loaded {
            if !e.not_found() {
                tracing::warn!("Failed to re-read env file, keeping current environment: {}", e);
            }
        }
        Self::from_env()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./adtrack.db?mode=rwc".to_string());
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = env_parse("API_PORT", 8080u16)?;

        let storefront_host =
            std::env::var("STOREFRONT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let storefront_port = env_parse("STOREFRONT_PORT", 3000u16)?;

        let static_dir =
            std::env::var("STOREFRONT_STATIC_DIR").unwrap_or_else(|_| "./public".to_string());

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            storefront_server: ServerConfig {
                host: storefront_host,
                port: storefront_port,
            },
            auth: AuthConfig {
                api_keys: env_list("API_KEYS"),
            },
            storefront: StorefrontConfig { static_dir },
            tracking: TrackingConfig::from_env()?,
        })
    }
}
