//! Transparent retries for transport failures.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{BundleStore, CreatePlacement, StoreError};
use crate::model::{BundleDescription, DependencyKey, Worksheet, WorksheetItem, WorksheetSummary};

/// Retry policy for store calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts per call, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after every retry
    pub backoff_factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2,
        }
    }
}

/// TOML representation of the retry policy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlRetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub backoff_factor: Option<u32>,
}

impl RetryConfig {
    /// Apply the fields present in a TOML section on top of this policy
    pub fn merge(&mut self, toml: &TomlRetryConfig) {
        if let Some(max_attempts) = toml.max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(delay_ms) = toml.initial_delay_ms {
            self.initial_delay = Duration::from_millis(delay_ms);
        }
        if let Some(factor) = toml.backoff_factor {
            self.backoff_factor = factor;
        }
    }

    /// A policy that never sleeps, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            backoff_factor: 1,
        }
    }
}

/// Decorator retrying every call of the wrapped store on transient errors
pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: BundleStore> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_delay;
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    return Err(StoreError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    if delay > Duration::ZERO {
                        tokio::time::sleep(delay).await;
                    }
                    delay = delay.saturating_mul(self.config.backoff_factor);
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<S: BundleStore> BundleStore for RetryingStore<S> {
    async fn fetch_bundles(
        &self,
        specs: &[String],
        depth: Option<u32>,
    ) -> Result<Vec<BundleDescription>, StoreError> {
        self.with_retry("fetch_bundles", || self.inner.fetch_bundles(specs, depth))
            .await
    }

    async fn fetch_bundle(&self, id: &str) -> Result<BundleDescription, StoreError> {
        self.with_retry("fetch_bundle", || self.inner.fetch_bundle(id))
            .await
    }

    async fn fetch_worksheets_by_bundle(
        &self,
        bundle_id: &str,
    ) -> Result<Vec<WorksheetSummary>, StoreError> {
        self.with_retry("fetch_worksheets_by_bundle", || {
            self.inner.fetch_worksheets_by_bundle(bundle_id)
        })
        .await
    }

    async fn fetch_worksheet(&self, id: &str) -> Result<Worksheet, StoreError> {
        self.with_retry("fetch_worksheet", || self.inner.fetch_worksheet(id))
            .await
    }

    async fn create_bundle(
        &self,
        description: &BundleDescription,
        worksheet_id: &str,
        placement: &CreatePlacement,
    ) -> Result<BundleDescription, StoreError> {
        self.with_retry("create_bundle", || {
            self.inner.create_bundle(description, worksheet_id, placement)
        })
        .await
    }

    async fn create_worksheet_item(
        &self,
        item: &WorksheetItem,
        worksheet_id: &str,
    ) -> Result<WorksheetItem, StoreError> {
        self.with_retry("create_worksheet_item", || {
            self.inner.create_worksheet_item(item, worksheet_id)
        })
        .await
    }

    async fn search_bundles_by_command_and_dependencies(
        &self,
        command: Option<&str>,
        dependencies: &[DependencyKey],
    ) -> Result<Vec<BundleDescription>, StoreError> {
        self.with_retry("search_bundles_by_command_and_dependencies", || {
            self.inner
                .search_bundles_by_command_and_dependencies(command, dependencies)
        })
        .await
    }
}
