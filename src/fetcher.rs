use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::resolver::ResolvedAddress;
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{redirect, Client, StatusCode};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

/// One HTTP exchange, never following redirects on its own.
#[derive(Debug, Clone)]
pub struct HopResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HopResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }
}

/// Bounded response of a guarded fetch. Only produced after an `Allowed` verdict.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub final_url: Url,
    /// Every hop that was validated and requested, the original URL first.
    pub chain: Vec<Url>,
}

impl FetchResult {
    /// Media type without parameters, lowercased (`text/html`).
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|media| media.trim().to_ascii_lowercase())
            .filter(|media| !media.is_empty())
    }

    /// `charset` parameter of the Content-Type header, if any.
    pub fn charset(&self) -> Option<String> {
        let value = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        value.split(';').skip(1).find_map(|param| {
            let (name, label) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| label.trim().trim_matches('"').to_string())
        })
    }

    /// Body decoded with the declared charset, UTF-8 when none is declared
    /// or the label is unknown. A byte order mark takes precedence.
    pub fn text(&self) -> String {
        let encoding = self
            .charset()
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8);
        let (text, used, had_errors) = encoding.decode(&self.body);
        if had_errors {
            debug!(encoding = used.name(), "Body contained malformed sequences");
        }
        text.into_owned()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a single GET for `url`, connecting only to `pinned`.
    async fn get(&self, url: &Url, pinned: ResolvedAddress) -> Result<HopResponse, GuardError>;
}

/// reqwest-backed transport.
///
/// A client is built per hop so the hostname can be pinned to the address the
/// guard already classified; the client never re-resolves or follows redirects.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
    user_agent: String,
    max_content_size: usize,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&GuardConfig::default())
    }
}

impl HttpTransport {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            timeout: config.fetch_timeout,
            user_agent: config.user_agent.clone(),
            max_content_size: config.max_content_size,
        }
    }

    fn client_for(&self, url: &Url, pinned: IpAddr) -> Result<Client, GuardError> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .redirect(redirect::Policy::none())
            .no_proxy();

        if let Some(url::Host::Domain(domain)) = url.host() {
            // The port here is ignored by reqwest; the URL's port is used.
            builder = builder.resolve(domain, SocketAddr::new(pinned, 0));
        }

        builder.build().map_err(|e| {
            error!(error = %e, "Failed to create HTTP client");
            GuardError::Config(format!("failed to initialize HTTP client: {e}"))
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(level = "debug", skip(self, url), fields(url = %url), err)]
    async fn get(&self, url: &Url, pinned: ResolvedAddress) -> Result<HopResponse, GuardError> {
        let client = self.client_for(url, pinned.ip)?;

        let mut response = client.get(url.clone()).send().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to send request");
            GuardError::from(e)
        })?;

        let status = response.status();
        let headers = response.headers().clone();

        if let Some(length) = response.content_length() {
            if length > self.max_content_size as u64 {
                return Err(GuardError::ContentTooLarge {
                    limit: self.max_content_size,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to read response body");
            GuardError::from(e)
        })? {
            if body.len() + chunk.len() > self.max_content_size {
                return Err(GuardError::ContentTooLarge {
                    limit: self.max_content_size,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %url, status = %status, content_length = body.len(), "Fetched hop");
        Ok(HopResponse {
            status,
            headers,
            body,
        })
    }
}
