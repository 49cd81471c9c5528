use std::collections::HashSet;

use super::BundleInfoCache;
use crate::store::{BundleStore, StoreError};

/// Walk up to `depth` levels of ancestors from `seeds`, making sure every
/// bundle visited on the way is in `cache`.
///
/// Each round fetches the current frontier and collects the parents that are
/// not cached yet; those become the next frontier and are prepended to the
/// result, so the oldest ancestors come first. Exactly `depth` rounds run even
/// when the frontier empties early, which bounds the walk on cyclic data. The
/// last frontier is reported but not fetched.
pub async fn collect_ancestors<S>(
    store: &S,
    cache: &mut BundleInfoCache,
    seeds: &[String],
    depth: u32,
) -> Result<Vec<String>, StoreError>
where
    S: BundleStore + ?Sized,
{
    let mut result: Vec<String> = seeds.to_vec();
    let mut frontier: Vec<String> = seeds.to_vec();
    let mut visited: HashSet<String> = HashSet::new();

    for round in 0..depth {
        let mut next = Vec::new();
        for id in &frontier {
            if visited.contains(id) {
                continue;
            }

            let info = cache.ensure(store, id).await?;
            let parents: Vec<String> = info
                .dependencies
                .iter()
                .map(|dep| dep.parent_id.clone())
                .collect();
            next.extend(parents.into_iter().filter(|parent| !cache.contains(parent)));

            visited.insert(id.clone());
        }

        tracing::debug!(round, discovered = next.len(), "Collected ancestor round");

        let mut combined = next.clone();
        combined.append(&mut result);
        result = combined;
        frontier = next;
    }

    Ok(result)
}
