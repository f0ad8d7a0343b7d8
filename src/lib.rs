//! # link-guard
//!
//! SSRF-guarded link previews. A caller-supplied URL is only fetched after its
//! syntax, scheme and every address its host resolves to have been cleared;
//! the fetch itself is pinned to the cleared address, bounded in time, size and
//! redirects, and each redirect hop is cleared again before it is followed.
//!
//! ```rust,no_run
//! use link_guard::{FetchGuard, GuardConfig};
//!
//! # async fn example() -> Result<(), link_guard::GuardError> {
//! let guard = FetchGuard::new(GuardConfig::from_env()?)?;
//! let preview = guard.validate_and_fetch("https://example.com/").await?;
//! println!("{} - {}", preview.title, preview.description);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

mod address;
mod config;
mod embed;
mod error;
mod extractor;
mod fetcher;
mod guard;
mod logging;
mod preview_service;
mod resolver;
mod url_validator;
mod utils;

#[cfg(feature = "unguarded-demo")]
pub mod unguarded;

pub use address::{is_reserved_address, AddressClassifier, AddressRange, DEFAULT_RESERVED_RANGES};
pub use config::{GuardConfig, DEFAULT_USER_AGENT};
pub use embed::{video_embed, youtube_video_id};
pub use error::{ErrorBody, GuardError};
pub use extractor::MetadataExtractor;
pub use fetcher::{FetchResult, HopResponse, HttpTransport, Transport};
pub use guard::{AllowedTarget, DenyReason, FetchGuard, GuardState, ValidationVerdict};
pub use logging::{log_denial_card, log_preview_card};
#[cfg(feature = "logging")]
pub use logging::{setup_logging, LogConfig, LogLevelGuard};
pub use preview_service::{PreviewService, MAX_CONCURRENT_REQUESTS};
pub use resolver::{
    resolve_host, AddressFamily, ResolvedAddress, Resolver, StaticResolver, SystemResolver,
};
pub use url_validator::{CandidateUrl, TargetHost, UrlValidator};

/// Normalized link preview. Missing fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PreviewResult {
    /// The URL as the caller supplied it.
    pub url: String,
    /// The URL the body was finally read from, after redirects.
    pub final_url: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub site_name: String,
    /// Response media type, e.g. `text/html`.
    pub content_type: String,
    /// `og:type`, defaulting to `website`; `video` for recognised embeds.
    pub kind: String,
    pub status: Option<u16>,
    pub video: Option<VideoEmbed>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VideoEmbed {
    pub video_id: String,
    pub embed_url: String,
    pub thumbnail_url: String,
    pub image_url: String,
}

#[async_trait]
pub trait PreviewGenerator {
    async fn generate_preview(&self, url: &str) -> Result<PreviewResult, GuardError>;
}
