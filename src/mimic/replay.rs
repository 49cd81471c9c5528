//! Substitution of a provenance sub-graph.
//!
//! [`GraphReplayer`] visits bundles parents-first. A bundle gets a new
//! counterpart when one of its parents was substituted (or when it is the
//! output of a replay without inputs); every other bundle maps to itself.
//! Resolutions are permanent: once an old id is mapped, later visits return
//! the same answer without touching the store again.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::{BundleInfoCache, EquivalenceMemoizer, MimicError, MimicRequest, ReplayPlan};
use crate::model::metadata::metadata_str;
use crate::model::{BundleDescription, BundleType, Dependency, DependencyKey};
use crate::store::{BundleStore, CreatePlacement, StoreError};

/// Old id to new id, written at most once per key.
///
/// A `None` target marks a dry-run placeholder whose id was never allocated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionMap {
    map: HashMap<String, Option<String>>,
}

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping unless `old` already has one; returns whether it was
    /// recorded.
    pub fn insert_if_absent(&mut self, old: impl Into<String>, new: Option<String>) -> bool {
        match self.map.entry(old.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(new);
                true
            }
        }
    }

    /// `None` when unmapped, `Some(None)` for a dry-run placeholder
    pub fn get(&self, old: &str) -> Option<Option<&str>> {
        self.map.get(old).map(Option::as_deref)
    }

    pub fn contains(&self, old: &str) -> bool {
        self.map.contains_key(old)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

/// Everything a finished traversal produced
#[derive(Debug, Clone, Default)]
pub struct ReplayOutcome {
    pub plan: ReplayPlan,
    pub substitutions: SubstitutionMap,
    /// Ids of bundles created by this replay (not reused ones)
    pub created: HashSet<String>,
}

/// Postorder substitution engine over a populated [`BundleInfoCache`]
pub struct GraphReplayer<'a, S: ?Sized> {
    store: &'a S,
    request: &'a MimicRequest,
    cache: &'a BundleInfoCache,
    memoizer: Option<EquivalenceMemoizer<'a, S>>,
    substitutions: SubstitutionMap,
    /// Old ids whose descendants need new bundles
    downstream: HashSet<String>,
    created: HashSet<String>,
    plan: ReplayPlan,
}

impl<'a, S> GraphReplayer<'a, S>
where
    S: BundleStore + ?Sized,
{
    /// Prepare a traversal, seeding the explicit input substitutions
    pub fn new(store: &'a S, request: &'a MimicRequest, cache: &'a BundleInfoCache) -> Self {
        let mut substitutions = SubstitutionMap::new();
        let mut downstream = HashSet::new();
        for (old, new) in request.old_inputs.iter().zip(&request.new_inputs) {
            if !substitutions.insert_if_absent(old.clone(), Some(new.clone())) {
                tracing::warn!(old_id = %old, new_id = %new, "Ignoring repeated old input");
            }
            downstream.insert(old.clone());
        }

        let memoizer = (request.memoize && !request.dry_run).then(|| EquivalenceMemoizer::new(store));

        Self {
            store,
            request,
            cache,
            memoizer,
            substitutions,
            downstream,
            created: HashSet::new(),
            plan: ReplayPlan::new(),
        }
    }

    pub fn substitutions(&self) -> &SubstitutionMap {
        &self.substitutions
    }

    pub fn plan(&self) -> &ReplayPlan {
        &self.plan
    }

    /// Resolve `old_id` to the bundle standing in for it, creating new
    /// bundles for it and its ancestors as needed.
    ///
    /// Returns `None` only for dry-run placeholders.
    pub async fn substitute(&mut self, old_id: &str) -> Result<Option<String>, MimicError> {
        if let Some(resolved) = self.substitutions.get(old_id) {
            return Ok(resolved.map(str::to_string));
        }

        let cache = self.cache;
        let mut stack: Vec<String> = vec![old_id.to_string()];
        let mut on_stack: HashSet<String> = HashSet::from([old_id.to_string()]);

        while let Some(current) = stack.last().cloned() {
            if self.substitutions.contains(&current) {
                stack.pop();
                on_stack.remove(&current);
                continue;
            }

            let Some(info) = cache.get(&current) else {
                // Beyond the discovered graph: leave it alone.
                self.substitutions
                    .insert_if_absent(current.clone(), Some(current.clone()));
                stack.pop();
                on_stack.remove(&current);
                continue;
            };

            let pending = info
                .dependencies
                .iter()
                .map(|dep| &dep.parent_id)
                .find(|parent| !self.substitutions.contains(parent) && !on_stack.contains(*parent))
                .cloned();
            if let Some(parent) = pending {
                on_stack.insert(parent.clone());
                stack.push(parent);
                continue;
            }

            self.resolve(&current, info).await?;
            stack.pop();
            on_stack.remove(&current);
        }

        Ok(self
            .substitutions
            .get(old_id)
            .map_or_else(|| Some(old_id.to_string()), |resolved| resolved.map(str::to_string)))
    }

    /// Decide and record the counterpart of a bundle whose parents are all
    /// resolved.
    async fn resolve(&mut self, old_id: &str, old: &BundleDescription) -> Result<(), MimicError> {
        let new_dependencies: Vec<Dependency> = old
            .dependencies
            .iter()
            .map(|dep| Dependency {
                parent_id: self.substituted_parent(old_id, dep),
                ..dep.clone()
            })
            .collect();

        let lone_output = self.request.old_inputs.is_empty() && self.request.is_output(old_id);
        let downstream_of_inputs = old
            .dependencies
            .iter()
            .any(|dep| self.downstream.contains(&dep.parent_id));

        if !lone_output && !downstream_of_inputs {
            tracing::debug!(old_id = %old_id, "Reusing unaffected bundle");
            self.substitutions
                .insert_if_absent(old_id, Some(old_id.to_string()));
            return Ok(());
        }

        let mut new_info = rewrite_description(old_id, old, new_dependencies, self.request);

        let memoized = match &self.memoizer {
            Some(memoizer) => {
                let shape: Vec<DependencyKey> =
                    new_info.dependencies.iter().map(Dependency::key).collect();
                memoizer.latest(old.command.as_deref(), &shape).await?
            }
            None => None,
        };

        let mut fresh = false;
        if self.request.dry_run {
            new_info.id = None;
        } else if let Some(existing) = memoized {
            tracing::info!(
                old_id = %old_id,
                new_id = %existing.id.as_deref().unwrap_or_default(),
                "Reusing equivalent bundle"
            );
            new_info = existing;
        } else {
            if !old.bundle_type.is_mimicable() {
                return Err(MimicError::Usage(format!(
                    "Can't mimic {old_id} since it is not make or run"
                )));
            }

            let placement = if self.request.shadow {
                CreatePlacement::Shadow(old_id.to_string())
            } else {
                CreatePlacement::Detached
            };
            new_info = self
                .store
                .create_bundle(&new_info, &self.request.worksheet_id, &placement)
                .await?;
            if new_info.id.is_none() {
                return Err(StoreError::Internal(format!(
                    "store returned no id for the bundle mimicking {old_id}"
                ))
                .into());
            }
            fresh = true;
            tracing::info!(
                old_id = %old_id,
                new_id = %new_info.id.as_deref().unwrap_or_default(),
                bundle_type = %old.bundle_type,
                "Created bundle"
            );
        }

        let new_id = new_info.id.clone();
        self.plan.push(old.clone(), new_info);
        self.downstream.insert(old_id.to_string());
        if let (true, Some(id)) = (fresh, new_id.as_ref()) {
            self.created.insert(id.clone());
        }
        self.substitutions.insert_if_absent(old_id, new_id);
        Ok(())
    }

    fn substituted_parent(&self, old_id: &str, dep: &Dependency) -> String {
        match self.substitutions.get(&dep.parent_id) {
            Some(Some(new_parent)) => new_parent.to_string(),
            // Dry-run placeholder: the parent has no id yet.
            Some(None) => String::new(),
            None => {
                tracing::warn!(
                    old_id = %old_id,
                    parent_id = %dep.parent_id,
                    "Dependency cycle detected; keeping the original parent"
                );
                dep.parent_id.clone()
            }
        }
    }

    pub fn finish(self) -> ReplayOutcome {
        ReplayOutcome {
            plan: self.plan,
            substitutions: self.substitutions,
            created: self.created,
        }
    }
}

/// Build the creation payload for the bundle replacing `old`.
///
/// Identity and transient fields are dropped; metadata is rewritten in this
/// order: output name, pinned docker image, generated keys removed, caller
/// overrides applied last.
pub fn rewrite_description(
    old_id: &str,
    old: &BundleDescription,
    dependencies: Vec<Dependency>,
    request: &MimicRequest,
) -> BundleDescription {
    let mut new_info = old.clone();
    new_info.id = None;
    new_info.state_details = None;

    let metadata = &mut new_info.metadata;
    if let Some(name) = request.output_name() {
        let new_name = if request.is_output(old_id) {
            name.to_string()
        } else {
            format!("{name}-{}", old.name())
        };
        metadata.insert("name".into(), Value::String(new_name));
    }

    if old.bundle_type == BundleType::Run {
        if let Some(image) = metadata_str(metadata, "docker_image").filter(|i| !i.is_empty()) {
            let image = Value::String(image.to_string());
            metadata.insert("request_docker_image".into(), image);
        }
    }

    for spec in old.bundle_type.metadata_specs() {
        if spec.generated {
            metadata.remove(spec.key);
        }
        if let Some(value) = request.metadata_override.get(spec.key) {
            metadata.insert(spec.key.to_string(), value.clone());
        }
    }

    new_info.dependencies = dependencies;
    new_info
}
