//! The fetch guard: decides whether a caller-supplied URL may be fetched and,
//! once cleared, performs the bounded fetch.
//!
//! ```text
//! Validating -> Resolving -> Classifying -> Allowed -> Fetching -> Extracting -> Done
//!                    \______________\____________\-> Denied
//! ```
//!
//! Every redirect target goes back through validation, resolution and
//! classification before it is requested, and each hop connects only to the
//! address that was classified for it.

use crate::address::AddressClassifier;
use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::extractor::MetadataExtractor;
use crate::fetcher::{FetchResult, HttpTransport, Transport};
use crate::resolver::{resolve_host, ResolvedAddress, Resolver, SystemResolver};
use crate::url_validator::{CandidateUrl, UrlValidator};
use crate::{PreviewGenerator, PreviewResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    InvalidUrl,
    DisallowedProtocol,
    DnsResolutionFailure,
    BlockedPrivateAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Validating,
    Resolving,
    Classifying,
    Allowed,
    Denied,
    Fetching,
    Extracting,
    Done,
}

/// A URL cleared for fetching, with the full address set it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedTarget {
    pub candidate: CandidateUrl,
    pub addresses: Vec<ResolvedAddress>,
    /// The classified address the fetch will connect to.
    pub pinned: ResolvedAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Allowed(AllowedTarget),
    Denied(GuardError),
}

impl ValidationVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ValidationVerdict::Allowed(_))
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            ValidationVerdict::Allowed(_) => None,
            ValidationVerdict::Denied(e) => e.deny_reason(),
        }
    }

    pub fn into_result(self) -> Result<AllowedTarget, GuardError> {
        match self {
            ValidationVerdict::Allowed(target) => Ok(target),
            ValidationVerdict::Denied(e) => Err(e),
        }
    }
}

pub struct FetchGuard {
    config: Arc<GuardConfig>,
    validator: UrlValidator,
    classifier: AddressClassifier,
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn Transport>,
    extractor: MetadataExtractor,
}

impl FetchGuard {
    /// Guard using the system DNS configuration and the reqwest transport.
    pub fn new(config: GuardConfig) -> Result<Self, GuardError> {
        let resolver = Arc::new(SystemResolver::new()?);
        Ok(Self::with_resolver(config, resolver))
    }

    pub fn with_resolver(config: GuardConfig, resolver: Arc<dyn Resolver>) -> Self {
        let transport = Arc::new(HttpTransport::new(&config));
        Self::with_parts(config, resolver, transport)
    }

    pub fn with_parts(
        config: GuardConfig,
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        debug!(
            ranges = config.reserved_ranges.len(),
            max_redirects = config.max_redirects,
            "FetchGuard initialized"
        );

        Self {
            validator: UrlValidator::new(&config),
            classifier: AddressClassifier::new(config.reserved_ranges.clone()),
            config: Arc::new(config),
            resolver,
            transport,
            extractor: MetadataExtractor::new(),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Runs syntax, resolution and classification without any request to the target.
    #[instrument(level = "debug", skip(self))]
    pub async fn validate(&self, raw: &str) -> ValidationVerdict {
        debug!(state = ?GuardState::Validating, "Validating URL");
        let verdict = match self.validator.validate(raw) {
            Ok(candidate) => self.clear(candidate).await,
            Err(e) => Err(e),
        };

        match verdict {
            Ok(target) => {
                debug!(state = ?GuardState::Allowed, url = %target.candidate.url(), "URL allowed");
                ValidationVerdict::Allowed(target)
            }
            Err(e) => {
                debug!(state = ?GuardState::Denied, "URL denied");
                e.log();
                ValidationVerdict::Denied(e)
            }
        }
    }

    /// Resolution and classification for a syntactically valid URL.
    async fn clear(&self, candidate: CandidateUrl) -> Result<AllowedTarget, GuardError> {
        debug!(state = ?GuardState::Resolving, host = %candidate.host(), "Resolving host");
        let addresses =
            resolve_host(self.resolver.as_ref(), candidate.host(), self.config.dns_timeout)
                .await?;

        debug!(state = ?GuardState::Classifying, count = addresses.len(), "Classifying addresses");
        // One reserved answer denies the whole request, whatever the other answers are.
        for address in &addresses {
            if let Some(range) = self.classifier.classify(address.ip) {
                return Err(GuardError::BlockedPrivateAddress {
                    address: address.ip,
                    range: range.name.to_string(),
                });
            }
        }

        let pinned = match addresses.first() {
            Some(address) => *address,
            None => {
                return Err(GuardError::DnsResolutionFailure {
                    host: candidate.host().to_string(),
                    message: "no addresses found".into(),
                })
            }
        };

        Ok(AllowedTarget {
            candidate,
            addresses,
            pinned,
        })
    }

    /// Validates `raw` and, if allowed, fetches it with per-hop redirect validation.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn fetch(&self, raw: &str) -> Result<FetchResult, GuardError> {
        let target = self.validate(raw).await.into_result()?;
        self.fetch_allowed(target).await
    }

    /// One deadline covers every hop, including the lookups for redirect targets.
    async fn fetch_allowed(&self, target: AllowedTarget) -> Result<FetchResult, GuardError> {
        let limit = self.config.fetch_timeout;
        let url = target.candidate.url().clone();

        tokio::time::timeout(limit, self.follow_redirects(target))
            .await
            .map_err(|_| {
                let e = GuardError::FetchTimeout(format!("{url} not fetched within {limit:?}"));
                e.log();
                e
            })?
    }

    async fn follow_redirects(&self, mut target: AllowedTarget) -> Result<FetchResult, GuardError> {
        let mut chain = Vec::new();

        loop {
            let url = target.candidate.url().clone();
            chain.push(url.clone());

            debug!(
                state = ?GuardState::Fetching,
                url = %url,
                pinned = %target.pinned.ip,
                "Fetching"
            );
            let response = self.transport.get(&url, target.pinned).await.map_err(|e| {
                e.log();
                e
            })?;

            let location = if response.status.is_redirection() {
                response.location().map(str::to_string)
            } else {
                None
            };

            // A redirect status without a Location is handed back as-is.
            let location = match location {
                Some(location) => location,
                None => {
                    return Ok(FetchResult {
                        status: response.status,
                        headers: response.headers,
                        body: response.body,
                        final_url: url,
                        chain,
                    })
                }
            };

            if chain.len() > self.config.max_redirects {
                let e = GuardError::TooManyRedirects {
                    max: self.config.max_redirects,
                };
                e.log();
                return Err(e);
            }

            let next = url.join(&location)?;
            debug!(from = %url, to = %next, "Re-validating redirect target");

            let candidate = self.validator.validate_url(next).map_err(|e| {
                e.log();
                e
            })?;
            target = self.clear(candidate).await.map_err(|e| {
                warn!(from = %url, "Redirect target denied");
                e.log();
                e
            })?;
        }
    }

    /// Guarded preview: validate, fetch, extract.
    ///
    /// Extraction problems never fail the call. Recognised video links fall back
    /// to a synthesised preview when the page itself cannot be fetched.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn validate_and_fetch(&self, raw: &str) -> Result<PreviewResult, GuardError> {
        let target = self.validate(raw).await.into_result()?;
        let original = target.candidate.url().clone();

        match self.fetch_allowed(target).await {
            Ok(result) => {
                debug!(state = ?GuardState::Extracting, "Extracting metadata");
                let preview = self.extractor.extract_fetch(&result, raw);
                debug!(state = ?GuardState::Done, "Preview ready");
                Ok(preview)
            }
            Err(e) => match self.extractor.video_preview(&original, raw) {
                Some(preview) if e.deny_reason().is_none() => {
                    warn!(error = %e, "Video page fetch failed, using synthesized preview");
                    Ok(preview)
                }
                _ => Err(e),
            },
        }
    }
}

#[async_trait]
impl PreviewGenerator for FetchGuard {
    async fn generate_preview(&self, url: &str) -> Result<PreviewResult, GuardError> {
        self.validate_and_fetch(url).await
    }
}
