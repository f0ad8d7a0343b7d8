use serde::Serialize;
use std::net::IpAddr;
use thiserror::Error;
use tracing::{error, warn};

use crate::guard::DenyReason;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Protocol not allowed: {0}")]
    DisallowedProtocol(String),

    #[error("DNS resolution failed for {host}: {message}")]
    DnsResolutionFailure { host: String, message: String },

    #[error("Blocked private address {address} ({range})")]
    BlockedPrivateAddress { address: IpAddr, range: String },

    #[error("Too many redirects (max {max})")]
    TooManyRedirects { max: usize },

    #[error("Request timeout: {0}")]
    FetchTimeout(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Content too large (limit {limit} bytes)")]
    ContentTooLarge { limit: usize },

    #[error("Failed to parse content: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// JSON body a caller can hand back to an HTTP client.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
    pub retryable: bool,
}

impl GuardError {
    /// Which validation gate produced this error, if any.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            GuardError::InvalidUrl(_) => Some(DenyReason::InvalidUrl),
            GuardError::DisallowedProtocol(_) => Some(DenyReason::DisallowedProtocol),
            GuardError::DnsResolutionFailure { .. } => Some(DenyReason::DnsResolutionFailure),
            GuardError::BlockedPrivateAddress { .. } => Some(DenyReason::BlockedPrivateAddress),
            _ => None,
        }
    }

    /// HTTP-equivalent status class for the failure.
    pub fn status_class(&self) -> u16 {
        match self {
            GuardError::InvalidUrl(_) | GuardError::DisallowedProtocol(_) => 400,
            GuardError::BlockedPrivateAddress { .. } => 403,
            GuardError::ContentTooLarge { .. } => 413,
            GuardError::DnsResolutionFailure { .. }
            | GuardError::TooManyRedirects { .. }
            | GuardError::UpstreamError(_)
            | GuardError::ParseError(_) => 502,
            GuardError::FetchTimeout(_) => 504,
            GuardError::Config(_) => 500,
        }
    }

    /// Validation verdicts never change on retry. Transport failures might.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GuardError::DnsResolutionFailure { .. }
                | GuardError::FetchTimeout(_)
                | GuardError::UpstreamError(_)
        )
    }

    /// Message safe to return to the requester. Never contains a resolved address.
    pub fn user_message(&self) -> String {
        match self {
            GuardError::InvalidUrl(_) => "The URL is not valid".to_string(),
            GuardError::DisallowedProtocol(scheme) => {
                format!("Protocol `{scheme}` is not allowed, only HTTP and HTTPS are supported")
            }
            GuardError::DnsResolutionFailure { host, .. } => {
                format!("Could not resolve host `{host}`")
            }
            GuardError::BlockedPrivateAddress { .. } => {
                "The URL points to an internal network address and was blocked".to_string()
            }
            GuardError::TooManyRedirects { max } => {
                format!("The URL redirected more than {max} times")
            }
            GuardError::FetchTimeout(_) => "The remote server took too long to respond".to_string(),
            GuardError::UpstreamError(_) => "The remote server could not be reached".to_string(),
            GuardError::ContentTooLarge { .. } => "The remote content is too large".to_string(),
            GuardError::ParseError(_) => "The remote content could not be read".to_string(),
            GuardError::Config(_) => "Link previews are misconfigured".to_string(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.user_message(),
            status: self.status_class(),
            retryable: self.is_retryable(),
        }
    }

    pub fn log(&self) {
        match self {
            GuardError::InvalidUrl(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            GuardError::DisallowedProtocol(scheme) => {
                warn!(scheme = %scheme, "Disallowed protocol rejected");
            }
            GuardError::DnsResolutionFailure { host, message } => {
                warn!(host = %host, error = %message, "DNS resolution failed");
            }
            GuardError::BlockedPrivateAddress { address, range } => {
                warn!(address = %address, range = %range, "Blocked request to reserved address");
            }
            GuardError::TooManyRedirects { max } => {
                warn!(max = max, "Redirect limit exceeded");
            }
            GuardError::FetchTimeout(e) => {
                warn!(error = %e, "Request timed out");
            }
            GuardError::UpstreamError(e) => {
                error!(error = %e, "Upstream fetch failed");
            }
            GuardError::ContentTooLarge { limit } => {
                warn!(limit = limit, "Response body exceeded size limit");
            }
            GuardError::ParseError(e) => {
                warn!(error = %e, "Content parsing failed");
            }
            GuardError::Config(e) => {
                error!(error = %e, "Invalid configuration");
            }
        }
    }
}

impl From<url::ParseError> for GuardError {
    fn from(e: url::ParseError) -> Self {
        GuardError::InvalidUrl(e.to_string())
    }
}

impl From<reqwest::Error> for GuardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GuardError::FetchTimeout(e.to_string())
        } else {
            GuardError::UpstreamError(e.to_string())
        }
    }
}
