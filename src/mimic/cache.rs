use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::model::BundleDescription;
use crate::store::{BundleStore, StoreError};

/// Bundle descriptions fetched during one replay.
///
/// Append-only: an entry is never replaced or evicted once present.
#[derive(Debug, Default)]
pub struct BundleInfoCache {
    infos: HashMap<String, BundleDescription>,
}

impl BundleInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&BundleDescription> {
        self.infos.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.infos.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Add fetched bundles, returning their ids in the given order.
    ///
    /// Bundles without an id cannot be addressed and are skipped.
    pub fn extend(&mut self, bundles: Vec<BundleDescription>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let Some(id) = bundle.id.clone() else {
                continue;
            };
            self.infos.entry(id.clone()).or_insert(bundle);
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        ids
    }

    /// Description of `id`, fetching it from the store if absent
    pub async fn ensure<S>(&mut self, store: &S, id: &str) -> Result<&BundleDescription, StoreError>
    where
        S: BundleStore + ?Sized,
    {
        match self.infos.entry(id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let bundle = store.fetch_bundle(id).await?;
                Ok(entry.insert(bundle))
            }
        }
    }
}
