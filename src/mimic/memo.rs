use crate::model::{BundleDescription, DependencyKey};
use crate::store::{BundleStore, StoreError};

/// Finds bundles that already did the work a replay is about to request.
///
/// Two bundles are equivalent when they run the same command over the same
/// `(parent_id, child_path)` dependency set. When several match, the most
/// recently created one wins; there is no similarity ranking.
pub struct EquivalenceMemoizer<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> EquivalenceMemoizer<'a, S>
where
    S: BundleStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// All equivalent bundles, oldest first
    pub async fn find_equivalent(
        &self,
        command: Option<&str>,
        shape: &[DependencyKey],
    ) -> Result<Vec<BundleDescription>, StoreError> {
        self.store
            .search_bundles_by_command_and_dependencies(command, shape)
            .await
    }

    /// The most recently created equivalent bundle, if any
    pub async fn latest(
        &self,
        command: Option<&str>,
        shape: &[DependencyKey],
    ) -> Result<Option<BundleDescription>, StoreError> {
        let mut matches = self.find_equivalent(command, shape).await?;
        Ok(matches.pop())
    }
}
