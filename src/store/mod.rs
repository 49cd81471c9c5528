//! Boundary to the remote bundle and worksheet service.
//!
//! The replay engine only ever talks to the service through [`BundleStore`].
//! [`RetryingStore`] adds transparent retries for transport failures and
//! [`MemoryStore`] is an in-process implementation used by the CLI driver and
//! in tests.

pub mod error;
pub mod memory;
pub mod retry;

use async_trait::async_trait;

use crate::model::{BundleDescription, DependencyKey, Worksheet, WorksheetItem, WorksheetSummary};

pub use error::StoreError;
pub use memory::{CallCounts, MemoryStore, StoreSnapshot};
pub use retry::{RetryConfig, RetryingStore};

/// Where a newly created bundle goes on its worksheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatePlacement {
    /// Insert right after every existing occurrence of this bundle
    Shadow(String),
    /// Do not add to any worksheet; the caller places it later
    Detached,
}

/// Operations consumed from the bundle service
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Resolve bundle specs; with `depth`, also return descendants down to
    /// that many levels.
    async fn fetch_bundles(
        &self,
        specs: &[String],
        depth: Option<u32>,
    ) -> Result<Vec<BundleDescription>, StoreError>;

    async fn fetch_bundle(&self, id: &str) -> Result<BundleDescription, StoreError>;

    /// Worksheets holding a bundle item that references `bundle_id`
    async fn fetch_worksheets_by_bundle(
        &self,
        bundle_id: &str,
    ) -> Result<Vec<WorksheetSummary>, StoreError>;

    /// Worksheet with all of its items
    async fn fetch_worksheet(&self, id: &str) -> Result<Worksheet, StoreError>;

    async fn create_bundle(
        &self,
        description: &BundleDescription,
        worksheet_id: &str,
        placement: &CreatePlacement,
    ) -> Result<BundleDescription, StoreError>;

    async fn create_worksheet_item(
        &self,
        item: &WorksheetItem,
        worksheet_id: &str,
    ) -> Result<WorksheetItem, StoreError>;

    /// Bundles with this command and exactly this dependency shape, oldest
    /// first.
    async fn search_bundles_by_command_and_dependencies(
        &self,
        command: Option<&str>,
        dependencies: &[DependencyKey],
    ) -> Result<Vec<BundleDescription>, StoreError>;
}
