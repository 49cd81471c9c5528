//! Provenance replay.
//!
//! Given bundles to substitute (`old_inputs` → `new_inputs`) and optionally
//! a single output whose history should be replayed, [`mimic_bundles`]
//! rebuilds the affected part of the dependency graph on top of the new
//! inputs:
//!
//! 1. fetch the starting bundles and discover their ancestors up to `depth`
//!    levels ([`collect_ancestors`]);
//! 2. resolve every bundle parents-first, creating a counterpart only when a
//!    parent was substituted ([`GraphReplayer`]);
//! 3. lay the new bundles out on the target worksheet the way the old ones
//!    are laid out ([`WorksheetPlacer`]).
//!
//! Bundles created before a failure stay in the store.

mod ancestors;
mod cache;
mod error;
mod memo;
mod placement;
mod plan;
mod replay;
mod request;

pub use ancestors::collect_ancestors;
pub use cache::BundleInfoCache;
pub use error::MimicError;
pub use memo::EquivalenceMemoizer;
pub use placement::{PlacementReport, WorksheetPlacer};
pub use plan::{PlanEntry, ReplayPlan};
pub use replay::{rewrite_description, GraphReplayer, ReplayOutcome, SubstitutionMap};
pub use request::MimicRequest;

use crate::store::BundleStore;

/// Result of a full replay including placement details
#[derive(Debug, Clone, Default)]
pub struct MimicOutcome {
    pub plan: ReplayPlan,
    /// Absent for dry runs and shadow placement
    pub placement: Option<PlacementReport>,
}

/// Replay `request` against `store`, returning the bundles standing in for
/// the replaced ones, parents first.
pub async fn mimic_bundles<S>(store: &S, request: &MimicRequest) -> Result<ReplayPlan, MimicError>
where
    S: BundleStore + ?Sized,
{
    Ok(run_mimic(store, request).await?.plan)
}

/// Same as [`mimic_bundles`], also reporting where new bundles were placed
pub async fn run_mimic<S>(store: &S, request: &MimicRequest) -> Result<MimicOutcome, MimicError>
where
    S: BundleStore + ?Sized,
{
    request.validate()?;
    let resolved = resolve_specs(store, request).await?;
    let request = &resolved;

    // With an output, only its ancestry matters. Without one, start from the
    // inputs' descendants and take in their ancestry as well.
    let infos = match &request.old_output {
        Some(output) => store.fetch_bundles(std::slice::from_ref(output), None).await?,
        None => {
            store
                .fetch_bundles(&request.old_inputs, Some(request.depth))
                .await?
        }
    };

    let mut cache = BundleInfoCache::new();
    let seeds = cache.extend(infos);
    let closure = collect_ancestors(store, &mut cache, &seeds, request.depth).await?;
    tracing::info!(
        seeds = seeds.len(),
        discovered = cache.len(),
        depth = request.depth,
        "Collected replay graph"
    );

    let mut replayer = GraphReplayer::new(store, request, &cache);
    match &request.old_output {
        Some(output) => {
            replayer.substitute(output).await?;
        }
        None => {
            for id in &closure {
                replayer.substitute(id).await?;
            }
        }
    }
    let ReplayOutcome {
        plan,
        substitutions,
        created,
    } = replayer.finish();
    tracing::info!(
        planned = plan.len(),
        created = created.len(),
        dry_run = request.dry_run,
        "Replayed graph"
    );

    let placement = if request.dry_run || request.shadow {
        None
    } else {
        let placer = WorksheetPlacer::new(store);
        let report = placer
            .place(
                &plan,
                &substitutions,
                &created,
                &request.worksheet_id,
                request.anchor(),
                request.skip_prelude,
            )
            .await?;
        Some(report)
    };

    Ok(MimicOutcome { plan, placement })
}

/// Copy of `request` with every bundle spec (id or name) replaced by the id
/// the store resolves it to.
async fn resolve_specs<S>(store: &S, request: &MimicRequest) -> Result<MimicRequest, MimicError>
where
    S: BundleStore + ?Sized,
{
    let mut resolved = request.clone();
    if let Some(output) = resolved.old_output.as_mut() {
        let id = resolve_spec(store, output).await?;
        *output = id;
    }
    for spec in resolved
        .old_inputs
        .iter_mut()
        .chain(resolved.new_inputs.iter_mut())
    {
        let id = resolve_spec(store, spec).await?;
        *spec = id;
    }
    Ok(resolved)
}

async fn resolve_spec<S>(store: &S, spec: &str) -> Result<String, MimicError>
where
    S: BundleStore + ?Sized,
{
    let found = store.fetch_bundles(&[spec.to_string()], None).await?;
    let id = found
        .into_iter()
        .next()
        .and_then(|bundle| bundle.id)
        .ok_or_else(|| MimicError::Usage(format!("No bundle matches {spec}")))?;
    if id != spec {
        tracing::debug!(spec = %spec, id = %id, "Resolved bundle spec");
    }
    Ok(id)
}
