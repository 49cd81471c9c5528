use serde::{Deserialize, Serialize};

use crate::model::BundleDescription;

/// An old bundle and the bundle standing in for it after the replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub old: BundleDescription,
    pub new: BundleDescription,
}

impl PlanEntry {
    pub fn old_id(&self) -> Option<&str> {
        self.old.id.as_deref()
    }

    /// Absent for dry-run placeholders
    pub fn new_id(&self) -> Option<&str> {
        self.new.id.as_deref()
    }
}

/// Bundles produced by a replay, parents before children
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplayPlan {
    entries: Vec<PlanEntry>,
}

impl ReplayPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, old: BundleDescription, new: BundleDescription) {
        self.entries.push(PlanEntry { old, new });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&PlanEntry> {
        self.entries.last()
    }

    /// New ids in plan order, skipping dry-run placeholders
    pub fn new_ids(&self) -> Vec<&str> {
        self.entries.iter().filter_map(PlanEntry::new_id).collect()
    }

    /// Entry whose old bundle has this id
    pub fn entry_for(&self, old_id: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.old_id() == Some(old_id))
    }
}

impl<'a> IntoIterator for &'a ReplayPlan {
    type Item = &'a PlanEntry;
    type IntoIter = std::slice::Iter<'a, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
