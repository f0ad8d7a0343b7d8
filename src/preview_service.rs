use crate::{FetchGuard, GuardConfig, GuardError, PreviewGenerator, PreviewResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

/// Caller-facing preview service: guarded previews with a bound on how many
/// run at once. Holds no cache and never retries.
#[derive(Clone)]
pub struct PreviewService {
    guard: Arc<FetchGuard>,
    // Max Concurrent Requests
    semaphore: Arc<Semaphore>,
}

pub const MAX_CONCURRENT_REQUESTS: usize = 64;

impl PreviewService {
    /// Service over the system resolver with the given configuration.
    pub fn new(config: GuardConfig) -> Result<Self, GuardError> {
        Ok(Self::with_guard(FetchGuard::new(config)?))
    }

    pub fn with_guard(guard: FetchGuard) -> Self {
        Self::with_guard_and_limit(guard, MAX_CONCURRENT_REQUESTS)
    }

    pub fn with_guard_and_limit(guard: FetchGuard, max_concurrent_requests: usize) -> Self {
        debug!(max_concurrent_requests, "PreviewService initialized");

        Self {
            guard: Arc::new(guard),
            semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        }
    }

    pub fn guard(&self) -> &FetchGuard {
        &self.guard
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn generate_preview(&self, url: &str) -> Result<PreviewResult, GuardError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| GuardError::Config("preview service is shut down".into()))?;

        self.guard.validate_and_fetch(url).await
    }

    /// Runs previews for every URL concurrently, at most the configured limit at
    /// a time. Results keep the input order.
    pub async fn generate_previews(
        &self,
        urls: &[&str],
    ) -> Vec<(String, Result<PreviewResult, GuardError>)> {
        let futures = urls.iter().map(|url| async move {
            let result = self.generate_preview(url).await;
            (url.to_string(), result)
        });

        futures::future::join_all(futures).await
    }
}

#[async_trait]
impl PreviewGenerator for PreviewService {
    async fn generate_preview(&self, url: &str) -> Result<PreviewResult, GuardError> {
        PreviewService::generate_preview(self, url).await
    }
}
