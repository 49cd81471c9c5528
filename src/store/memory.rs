//! In-process bundle store
//!
//! Implements [`BundleStore`] over plain in-memory collections so the replay
//! engine can run without a service: the CLI driver loads it from a JSON
//! snapshot, and tests use it to inspect every interaction afterwards.
//!
//! # Example
//! ```no_run
//! use mimic::model::{BundleDescription, BundleType, Worksheet};
//! use mimic::store::{BundleStore, MemoryStore, StoreError};
//!
//! # async fn demo() -> Result<(), StoreError> {
//! let store = MemoryStore::new();
//! let id = store.insert_bundle(BundleDescription::new(BundleType::Dataset, "data"));
//! store.insert_worksheet(Worksheet::new("0xws", "main"));
//!
//! let bundle = store.fetch_bundle(&id).await?;
//! assert_eq!(bundle.name(), "data");
//! # Ok(())
//! # }
//! ```

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BundleStore, CreatePlacement, StoreError};
use crate::model::{
    BundleDescription, BundleState, DependencyKey, Worksheet, WorksheetItem, WorksheetSummary,
};

/// Serializable contents of a [`MemoryStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Owner recorded on bundles created through the store
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Bundles in creation order
    #[serde(default)]
    pub bundles: Vec<BundleDescription>,
    #[serde(default)]
    pub worksheets: Vec<Worksheet>,
}

/// Number of calls received per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetch_bundles: usize,
    pub fetch_bundle: usize,
    pub fetch_worksheets_by_bundle: usize,
    pub fetch_worksheet: usize,
    pub create_bundle: usize,
    pub create_worksheet_item: usize,
    pub search: usize,
}

impl CallCounts {
    /// Calls that changed the store
    pub fn mutations(&self) -> usize {
        self.create_bundle + self.create_worksheet_item
    }
}

/// In-memory [`BundleStore`]
pub struct MemoryStore {
    state: Mutex<StoreSnapshot>,
    calls: Mutex<CallCounts>,
    /// Errors returned, in order, by the next calls of any operation
    failures: Mutex<VecDeque<StoreError>>,
    created_bundles: Mutex<Vec<String>>,
    created_items: Mutex<Vec<(String, WorksheetItem)>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_snapshot(StoreSnapshot::default())
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            calls: Mutex::new(CallCounts::default()),
            failures: Mutex::new(VecDeque::new()),
            created_bundles: Mutex::new(Vec::new()),
            created_items: Mutex::new(Vec::new()),
        }
    }

    /// Load a store from a JSON snapshot file
    pub fn load_snapshot(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&contents)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current contents as a JSON snapshot file
    pub fn save_snapshot(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(&*self.state.lock())?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().clone()
    }

    pub fn with_owner(self, owner_id: impl Into<String>) -> Self {
        self.state.lock().owner_id = Some(owner_id.into());
        self
    }

    /// Add an existing bundle, allocating an id when it has none
    pub fn insert_bundle(&self, mut bundle: BundleDescription) -> String {
        let id = bundle.id.clone().unwrap_or_else(new_bundle_id);
        bundle.id = Some(id.clone());
        for dep in &mut bundle.dependencies {
            dep.child_id = id.clone();
        }
        self.state.lock().bundles.push(bundle);
        id
    }

    pub fn insert_worksheet(&self, worksheet: Worksheet) {
        self.state.lock().worksheets.push(worksheet);
    }

    pub fn bundle(&self, id: &str) -> Option<BundleDescription> {
        self.state
            .lock()
            .bundles
            .iter()
            .find(|b| b.id.as_deref() == Some(id))
            .cloned()
    }

    pub fn worksheet(&self, id: &str) -> Option<Worksheet> {
        self.state
            .lock()
            .worksheets
            .iter()
            .find(|w| w.id == id)
            .cloned()
    }

    pub fn bundle_count(&self) -> usize {
        self.state.lock().bundles.len()
    }

    /// Freeze a bundle so it can no longer be mutated
    pub fn freeze(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let bundle = state
            .bundles
            .iter_mut()
            .find(|b| b.id.as_deref() == Some(id))
            .ok_or_else(|| StoreError::NotFound(format!("bundle {id}")))?;
        bundle.ensure_not_frozen()?;
        bundle.ensure_freezable()?;
        bundle.frozen = Some(Utc::now());
        Ok(())
    }

    /// Make the next `count` calls fail with `error`
    pub fn fail_next(&self, count: usize, error: StoreError) {
        let mut failures = self.failures.lock();
        for _ in 0..count {
            failures.push_back(error.clone());
        }
    }

    pub fn call_counts(&self) -> CallCounts {
        *self.calls.lock()
    }

    /// Ids of bundles created through [`BundleStore::create_bundle`]
    pub fn created_bundle_ids(&self) -> Vec<String> {
        self.created_bundles.lock().clone()
    }

    /// Items created through [`BundleStore::create_worksheet_item`], with
    /// their worksheet id
    pub fn created_items(&self) -> Vec<(String, WorksheetItem)> {
        self.created_items.lock().clone()
    }

    /// Reset call counters and captured interactions
    pub fn reset_captures(&self) {
        *self.calls.lock() = CallCounts::default();
        self.created_bundles.lock().clear();
        self.created_items.lock().clear();
    }

    fn begin(&self, record: impl FnOnce(&mut CallCounts)) -> Result<(), StoreError> {
        record(&mut *self.calls.lock());
        match self.failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn new_bundle_id() -> String {
    format!("0x{}", Uuid::new_v4().simple())
}

fn with_state_details(mut bundle: BundleDescription) -> BundleDescription {
    bundle.state_details = Some(bundle.describe_state());
    bundle
}

fn resolve_spec<'a>(bundles: &'a [BundleDescription], spec: &str) -> Option<&'a BundleDescription> {
    bundles
        .iter()
        .find(|b| b.id.as_deref() == Some(spec))
        .or_else(|| bundles.iter().rev().find(|b| b.name() == spec))
}

fn sorted_keys(keys: impl Iterator<Item = DependencyKey>) -> Vec<DependencyKey> {
    let mut keys: Vec<_> = keys.collect();
    keys.sort();
    keys
}

#[async_trait]
impl BundleStore for MemoryStore {
    async fn fetch_bundles(
        &self,
        specs: &[String],
        depth: Option<u32>,
    ) -> Result<Vec<BundleDescription>, StoreError> {
        self.begin(|c| c.fetch_bundles += 1)?;
        let state = self.state.lock();

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for spec in specs {
            let bundle = resolve_spec(&state.bundles, spec)
                .ok_or_else(|| StoreError::NotFound(format!("bundle spec {spec}")))?;
            if let Some(id) = bundle.id.clone() {
                if seen.insert(id) {
                    result.push(bundle.clone());
                }
            }
        }

        // Descendants, level by level.
        let mut frontier: Vec<String> = result.iter().filter_map(|b| b.id.clone()).collect();
        for _ in 0..depth.unwrap_or(0) {
            let mut next = Vec::new();
            for bundle in &state.bundles {
                let Some(id) = bundle.id.as_ref() else {
                    continue;
                };
                if seen.contains(id) {
                    continue;
                }
                if bundle
                    .dependencies
                    .iter()
                    .any(|dep| frontier.contains(&dep.parent_id))
                {
                    seen.insert(id.clone());
                    next.push(id.clone());
                    result.push(bundle.clone());
                }
            }
            frontier = next;
        }

        Ok(result.into_iter().map(with_state_details).collect())
    }

    async fn fetch_bundle(&self, id: &str) -> Result<BundleDescription, StoreError> {
        self.begin(|c| c.fetch_bundle += 1)?;
        self.bundle(id)
            .map(with_state_details)
            .ok_or_else(|| StoreError::NotFound(format!("bundle {id}")))
    }

    async fn fetch_worksheets_by_bundle(
        &self,
        bundle_id: &str,
    ) -> Result<Vec<WorksheetSummary>, StoreError> {
        self.begin(|c| c.fetch_worksheets_by_bundle += 1)?;
        Ok(self
            .state
            .lock()
            .worksheets
            .iter()
            .filter(|w| w.contains_bundle(bundle_id))
            .map(Worksheet::summary)
            .collect())
    }

    async fn fetch_worksheet(&self, id: &str) -> Result<Worksheet, StoreError> {
        self.begin(|c| c.fetch_worksheet += 1)?;
        self.worksheet(id)
            .ok_or_else(|| StoreError::NotFound(format!("worksheet {id}")))
    }

    async fn create_bundle(
        &self,
        description: &BundleDescription,
        worksheet_id: &str,
        placement: &CreatePlacement,
    ) -> Result<BundleDescription, StoreError> {
        self.begin(|c| c.create_bundle += 1)?;
        if !description.bundle_type.is_mimicable() {
            return Err(StoreError::Usage(format!(
                "Cannot create a {} bundle from a description",
                description.bundle_type
            )));
        }

        let mut state = self.state.lock();
        if !state.worksheets.iter().any(|w| w.id == worksheet_id) {
            return Err(StoreError::NotFound(format!("worksheet {worksheet_id}")));
        }

        let id = new_bundle_id();
        let mut bundle = description.clone();
        bundle.id = Some(id.clone());
        bundle.owner_id = state.owner_id.clone();
        bundle.state = BundleState::Created;
        bundle.frozen = None;
        bundle.data_hash = None;
        bundle.state_details = None;
        for dep in &mut bundle.dependencies {
            dep.child_id = id.clone();
        }
        state.bundles.push(bundle.clone());

        if let CreatePlacement::Shadow(old_id) = placement {
            let mut shadowed = false;
            for worksheet in &mut state.worksheets {
                let mut i = 0;
                while i < worksheet.items.len() {
                    if worksheet.items[i].bundle_id() == Some(old_id.as_str()) {
                        worksheet.items.insert(i + 1, WorksheetItem::bundle(id.clone()));
                        shadowed = true;
                        i += 1;
                    }
                    i += 1;
                }
            }
            if !shadowed {
                if let Some(worksheet) = state.worksheets.iter_mut().find(|w| w.id == worksheet_id)
                {
                    worksheet.items.push(WorksheetItem::bundle(id.clone()));
                }
            }
        }
        drop(state);

        self.created_bundles.lock().push(id);
        Ok(with_state_details(bundle))
    }

    async fn create_worksheet_item(
        &self,
        item: &WorksheetItem,
        worksheet_id: &str,
    ) -> Result<WorksheetItem, StoreError> {
        self.begin(|c| c.create_worksheet_item += 1)?;
        let mut state = self.state.lock();
        if let Some(bundle_id) = item.bundle_id() {
            if !state.bundles.iter().any(|b| b.id.as_deref() == Some(bundle_id)) {
                return Err(StoreError::NotFound(format!("bundle {bundle_id}")));
            }
        }
        let worksheet = state
            .worksheets
            .iter_mut()
            .find(|w| w.id == worksheet_id)
            .ok_or_else(|| StoreError::NotFound(format!("worksheet {worksheet_id}")))?;
        worksheet.items.push(item.clone());
        drop(state);

        self.created_items
            .lock()
            .push((worksheet_id.to_string(), item.clone()));
        Ok(item.clone())
    }

    async fn search_bundles_by_command_and_dependencies(
        &self,
        command: Option<&str>,
        dependencies: &[DependencyKey],
    ) -> Result<Vec<BundleDescription>, StoreError> {
        self.begin(|c| c.search += 1)?;
        let wanted = sorted_keys(dependencies.iter().cloned());
        Ok(self
            .state
            .lock()
            .bundles
            .iter()
            .filter(|b| b.command.as_deref() == command)
            .filter(|b| sorted_keys(b.dependencies.iter().map(|d| d.key())) == wanted)
            .cloned()
            .map(with_state_details)
            .collect())
    }
}
