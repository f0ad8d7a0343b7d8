use crate::config::GuardConfig;
use crate::error::GuardError;
use std::collections::HashSet;
use std::net::IpAddr;
use url::{Host, Url};

/// Host segment of a candidate URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetHost {
    Domain(String),
    Ip(IpAddr),
}

impl TargetHost {
    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            TargetHost::Ip(ip) => Some(*ip),
            TargetHost::Domain(_) => None,
        }
    }
}

impl std::fmt::Display for TargetHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetHost::Domain(domain) => f.write_str(domain),
            TargetHost::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

/// A URL that passed syntax and scheme checks. Not yet cleared for network I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    raw: String,
    url: Url,
    host: TargetHost,
}

impl CandidateUrl {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &TargetHost {
        &self.host
    }

    /// Explicit port, or 80/443 for http/https.
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

/// Validates URL syntax and scheme. Pure; performs no I/O.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    denied_scheme_hints: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new(&GuardConfig::default())
    }
}

impl UrlValidator {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            allowed_schemes: config.allowed_schemes.clone(),
            denied_scheme_hints: config.denied_scheme_hints.clone(),
        }
    }

    pub fn validate(&self, raw: &str) -> Result<CandidateUrl, GuardError> {
        let url = Url::parse(raw.trim()).map_err(GuardError::from)?;
        self.validate_parsed(raw, url)
    }

    /// Same checks as [`validate`](Self::validate) for an already-parsed URL,
    /// used for redirect targets joined against the previous hop.
    pub fn validate_url(&self, url: Url) -> Result<CandidateUrl, GuardError> {
        let raw = url.to_string();
        self.validate_parsed(&raw, url)
    }

    fn validate_parsed(&self, raw: &str, url: Url) -> Result<CandidateUrl, GuardError> {
        let scheme = url.scheme();

        // The allow-list is what is enforced; the hint set only sharpens the message.
        if self.denied_scheme_hints.contains(scheme) {
            return Err(GuardError::DisallowedProtocol(scheme.to_string()));
        }
        if !self.allowed_schemes.contains(scheme) {
            return Err(GuardError::DisallowedProtocol(scheme.to_string()));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(GuardError::InvalidUrl(
                "embedded credentials are not allowed".into(),
            ));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                if domain.is_empty() {
                    return Err(GuardError::InvalidUrl("empty host".into()));
                }
                TargetHost::Domain(domain)
            }
            Some(Host::Ipv4(ip)) => TargetHost::Ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => TargetHost::Ip(IpAddr::V6(ip)),
            None => return Err(GuardError::InvalidUrl("URL has no host".into())),
        };

        Ok(CandidateUrl {
            raw: raw.to_string(),
            url,
            host,
        })
    }
}
