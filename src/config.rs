use crate::address::{AddressRange, DEFAULT_RESERVED_RANGES};
use crate::error::GuardError;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("link-guard/", env!("CARGO_PKG_VERSION"));

/// Process-lifetime guard configuration.
///
/// Built once at startup, then shared read-only (usually behind an `Arc`)
/// by every guard invocation.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Schemes that may be fetched (default: ["http", "https"])
    pub allowed_schemes: HashSet<String>,
    /// Known-dangerous schemes, used only for a more specific rejection message
    pub denied_scheme_hints: HashSet<String>,
    /// Reserved address table consulted for every resolved address
    pub reserved_ranges: Vec<AddressRange>,
    /// Upper bound on the initial hostname lookup (default: 3s)
    pub dns_timeout: Duration,
    /// Upper bound on the whole fetch: every hop, body and redirect lookup included (default: 5s)
    pub fetch_timeout: Duration,
    /// Maximum number of redirects followed (default: 5)
    pub max_redirects: usize,
    /// Client identifier sent with every request
    pub user_agent: String,
    /// Maximum response body size in bytes (default: 5MB)
    pub max_content_size: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        let allowed_schemes = ["http", "https"].iter().map(|s| s.to_string()).collect();
        let denied_scheme_hints = ["file", "gopher", "ldap", "dict", "ftp", "javascript", "data"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        Self {
            allowed_schemes,
            denied_scheme_hints,
            reserved_ranges: DEFAULT_RESERVED_RANGES.to_vec(),
            dns_timeout: Duration::from_secs(3),
            fetch_timeout: Duration::from_secs(5),
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_content_size: 5 * 1024 * 1024,
        }
    }
}

impl GuardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration overlaid with `LINK_GUARD_*` environment variables.
    pub fn from_env() -> Result<Self, GuardError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, GuardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64, _>(&lookup, "LINK_GUARD_FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "LINK_GUARD_DNS_TIMEOUT_SECS")? {
            config.dns_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var::<usize, _>(&lookup, "LINK_GUARD_MAX_REDIRECTS")? {
            config.max_redirects = max;
        }
        if let Some(bytes) = parse_var::<usize, _>(&lookup, "LINK_GUARD_MAX_BODY_BYTES")? {
            config.max_content_size = bytes;
        }
        if let Some(agent) = lookup("LINK_GUARD_USER_AGENT") {
            if agent.trim().is_empty() {
                return Err(GuardError::Config(
                    "LINK_GUARD_USER_AGENT must not be empty".into(),
                ));
            }
            config.user_agent = agent;
        }

        if config.fetch_timeout.is_zero() || config.dns_timeout.is_zero() {
            return Err(GuardError::Config("timeouts must be greater than zero".into()));
        }

        Ok(config)
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_content_size(mut self, bytes: usize) -> Self {
        self.max_content_size = bytes;
        self
    }

    pub fn with_reserved_range(mut self, range: AddressRange) -> Self {
        self.reserved_ranges.push(range);
        self
    }

    /// Drops a reserved range by name. Only meant for local test harnesses.
    pub fn without_range(mut self, name: &str) -> Self {
        self.reserved_ranges.retain(|range| range.name != name);
        self
    }

    pub fn https_only(mut self) -> Self {
        self.allowed_schemes.retain(|scheme| scheme == "https");
        self.denied_scheme_hints.insert("http".to_string());
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, GuardError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| GuardError::Config(format!("{key}={raw:?}: {e}"))),
    }
}
