//! Unguarded fetch, kept only to demonstrate what the guard prevents.
//!
//! Nothing here validates the scheme, resolves or classifies the host, or
//! re-checks redirects, and JSON bodies are echoed back whole. It shares no
//! fetch code with [`FetchGuard`](crate::FetchGuard) and is only compiled with
//! the `unguarded-demo` feature. Never wire it to untrusted input.

use crate::{GuardConfig, GuardError, MetadataExtractor, PreviewResult};
use reqwest::{redirect, Client};
use serde::Serialize;
use tracing::{instrument, warn};
use url::Url;

#[derive(Debug, Clone, Serialize)]
pub struct UnguardedPreview {
    pub preview: PreviewResult,
    pub status: u16,
    pub header_names: Vec<String>,
    /// The full JSON payload when the body parsed as JSON.
    pub raw_json: Option<serde_json::Value>,
}

#[instrument(level = "debug", skip(config), err)]
pub async fn fetch_preview(
    url: &str,
    config: &GuardConfig,
) -> Result<UnguardedPreview, GuardError> {
    warn!(url = %url, "Unguarded fetch requested");

    let parsed = Url::parse(url.trim())?;

    let client = Client::builder()
        .timeout(config.fetch_timeout)
        .user_agent(config.user_agent.as_str())
        .redirect(redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| GuardError::Config(format!("failed to initialize HTTP client: {e}")))?;

    let response = client.get(parsed).send().await?;
    let status = response.status().as_u16();
    let final_url = response.url().clone();
    let header_names = response
        .headers()
        .keys()
        .map(|name| name.as_str().to_string())
        .collect();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|media| media.trim().to_ascii_lowercase());

    let body = response.text().await?;
    let raw_json = serde_json::from_str(&body).ok();

    let mut preview =
        MetadataExtractor::new().extract(&body, content_type.as_deref(), &final_url, url);
    preview.status = Some(status);

    Ok(UnguardedPreview {
        preview,
        status,
        header_names,
        raw_json,
    })
}
