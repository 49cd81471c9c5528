//! Integration tests for replaying the pipeline fixture
//!
//! Exercises collection, substitution and placement together through
//! `mimic_bundles` / `run_mimic` against the in-memory store.

use super::common::graph_fixtures::{Pipeline, MAIN_WORKSHEET, OWNER, SCRATCH_WORKSHEET};
use mimic::mimic::PlanEntry;
use mimic::store::RetryConfig;
use mimic::{
    mimic_bundles, run_mimic, MimicError, MimicRequest, ReplayPlan, RetryingStore, StoreError,
    WorksheetItem,
};
use serde_json::json;

/// Swap `data` for `new_data` and replay `eval`
fn eval_request(p: &Pipeline) -> MimicRequest {
    MimicRequest::new(MAIN_WORKSHEET)
        .with_input(p.data.clone(), p.new_data.clone())
        .with_output(p.eval.clone())
}

fn old_ids(plan: &ReplayPlan) -> Vec<&str> {
    plan.iter().filter_map(PlanEntry::old_id).collect()
}

fn new_id_for<'a>(plan: &'a ReplayPlan, old: &str) -> &'a str {
    plan.entry_for(old)
        .and_then(PlanEntry::new_id)
        .unwrap_or_else(|| panic!("no new bundle for {old}"))
}

#[tokio::test]
async fn test_replay_recreates_only_the_affected_chain() {
    let p = Pipeline::new();
    let plan = mimic_bundles(&p.store, &eval_request(&p)).await.unwrap();

    assert_eq!(old_ids(&plan), vec![p.prep.as_str(), p.train.as_str(), p.eval.as_str()]);
    assert_eq!(p.store.call_counts().create_bundle, 3);

    let new_prep = p.store.bundle(new_id_for(&plan, &p.prep)).unwrap();
    assert_eq!(new_prep.dependencies[0].parent_id, p.new_data);
    assert_eq!(new_prep.dependencies[0].parent_path, "csv");
    assert_eq!(new_prep.owner_id.as_deref(), Some(OWNER));

    // vocab is not downstream of data, so the new train still uses it.
    let new_train = p.store.bundle(new_id_for(&plan, &p.train)).unwrap();
    let parents: Vec<&str> = new_train
        .dependencies
        .iter()
        .map(|d| d.parent_id.as_str())
        .collect();
    assert_eq!(parents, vec![new_prep.id.as_deref().unwrap(), p.vocab.as_str()]);
    assert_eq!(new_train.command, p.store.bundle(&p.train).unwrap().command);
}

#[tokio::test]
async fn test_bundles_can_be_named_instead_of_ids() {
    let p = Pipeline::new();
    let request = MimicRequest::new(MAIN_WORKSHEET)
        .with_input("data", "data-v2")
        .with_output("eval");
    let outcome = run_mimic(&p.store, &request).await.unwrap();
    let plan = &outcome.plan;

    assert_eq!(old_ids(plan), vec![p.prep.as_str(), p.train.as_str(), p.eval.as_str()]);
    let new_prep = p.store.bundle(new_id_for(plan, &p.prep)).unwrap();
    assert_eq!(new_prep.dependencies[0].parent_id, p.new_data);

    // The anchor resolves too, so placement follows the host layout.
    let report = outcome.placement.unwrap();
    assert_eq!(report.host_worksheet.as_deref(), Some(MAIN_WORKSHEET));
    assert_eq!(report.placed.len(), 3);
}

#[tokio::test]
async fn test_inputs_named_without_an_output_replay_descendants() {
    let p = Pipeline::new();
    let request = MimicRequest::new(SCRATCH_WORKSHEET)
        .with_input("data", p.new_data.clone())
        .with_depth(3)
        .with_dry_run(true);
    let plan = mimic_bundles(&p.store, &request).await.unwrap();

    assert_eq!(plan.len(), 4);
    assert!(plan.entry_for(&p.stats).is_some());
}

#[tokio::test]
async fn test_unknown_bundle_name_fails() {
    let p = Pipeline::new();
    let request = MimicRequest::new(MAIN_WORKSHEET)
        .with_input("no-such-bundle", p.new_data.clone())
        .with_output(p.eval.clone());

    let err = mimic_bundles(&p.store, &request).await.unwrap_err();
    assert!(err.is_usage());
    assert_eq!(p.store.call_counts().mutations(), 0);
}

#[tokio::test]
async fn test_explicit_substitution_is_never_recreated() {
    let p = Pipeline::new();
    let plan = mimic_bundles(&p.store, &eval_request(&p)).await.unwrap();

    assert!(plan.entry_for(&p.data).is_none());
    assert!(plan.new_ids().iter().all(|id| *id != p.new_data));
    let new_prep = p.store.bundle(new_id_for(&plan, &p.prep)).unwrap();
    assert_eq!(new_prep.dependencies[0].parent_id, p.new_data);
}

#[tokio::test]
async fn test_siblings_outside_the_output_ancestry_are_untouched() {
    let p = Pipeline::new();
    let before = p.store.bundle_count();
    let plan = mimic_bundles(&p.store, &eval_request(&p)).await.unwrap();

    assert!(plan.entry_for(&p.stats).is_none());
    assert!(plan.entry_for(&p.vocab).is_none());
    assert_eq!(p.store.bundle_count(), before + 3);
}

#[tokio::test]
async fn test_memoized_replay_is_idempotent() {
    let p = Pipeline::new();
    let request = eval_request(&p).with_memoize(true);

    let first = mimic_bundles(&p.store, &request).await.unwrap();
    let created = p.store.call_counts().create_bundle;
    let second = mimic_bundles(&p.store, &request).await.unwrap();

    assert_eq!(p.store.call_counts().create_bundle, created);
    assert_eq!(first.new_ids(), second.new_ids());
}

#[tokio::test]
async fn test_depth_bounds_discovery() {
    // eval -> train -> prep -> data needs three rounds to reach prep.
    for (depth, planned) in [(0, 0), (1, 0), (2, 0), (3, 3)] {
        let p = Pipeline::new();
        let plan = mimic_bundles(&p.store, &eval_request(&p).with_depth(depth))
            .await
            .unwrap();
        assert_eq!(plan.len(), planned, "depth {depth}");
        if planned == 0 {
            assert_eq!(p.store.call_counts().mutations(), 0, "depth {depth}");
        }
    }
}

#[tokio::test]
async fn test_dry_run_matches_the_real_plan_without_mutating() {
    let real = Pipeline::new();
    let real_plan = mimic_bundles(&real.store, &eval_request(&real)).await.unwrap();

    let dry = Pipeline::new();
    let request = eval_request(&dry).with_dry_run(true).with_memoize(true);
    let dry_plan = mimic_bundles(&dry.store, &request).await.unwrap();

    assert_eq!(old_ids(&dry_plan), old_ids(&real_plan));
    assert!(dry_plan.iter().all(|entry| entry.new_id().is_none()));
    assert_eq!(dry.store.call_counts().mutations(), 0);
    assert_eq!(dry.store.call_counts().search, 0);
    assert_eq!(dry.store.worksheet(MAIN_WORKSHEET).unwrap().items.len(), Pipeline::MAIN_ITEMS);

    // Parents that would only exist after a real run are left blank.
    let dry_eval = &dry_plan.entry_for(&dry.eval).unwrap().new;
    assert_eq!(dry_eval.dependencies[0].parent_id, "");
    assert_eq!(dry_eval.dependencies[0].child_path, "model");

    // Substituted inputs and untouched parents are still named.
    let dry_prep = &dry_plan.entry_for(&dry.prep).unwrap().new;
    assert_eq!(dry_prep.dependencies[0].parent_id, dry.new_data);
    let dry_train = &dry_plan.entry_for(&dry.train).unwrap().new;
    assert_eq!(dry_train.dependencies[1].parent_id, dry.vocab);
}

#[tokio::test]
async fn test_new_bundles_are_placed_with_their_preludes() {
    let p = Pipeline::new();
    let outcome = run_mimic(&p.store, &eval_request(&p)).await.unwrap();
    let plan = &outcome.plan;

    let report = outcome.placement.unwrap();
    assert_eq!(report.host_worksheet.as_deref(), Some(MAIN_WORKSHEET));
    assert_eq!(report.prelude_items, 3);
    assert!(report.appended.is_empty());

    let items = p.store.worksheet(MAIN_WORKSHEET).unwrap().items;
    assert_eq!(
        items[Pipeline::MAIN_ITEMS..],
        [
            WorksheetItem::markup("Preprocessing"),
            WorksheetItem::directive("% display table"),
            WorksheetItem::bundle(new_id_for(plan, &p.prep)),
            WorksheetItem::markup("Training"),
            WorksheetItem::bundle(new_id_for(plan, &p.train)),
            WorksheetItem::bundle(new_id_for(plan, &p.eval)),
        ]
    );
}

#[tokio::test]
async fn test_placement_on_another_worksheet_follows_the_host_layout() {
    let p = Pipeline::new();
    let request = MimicRequest::new(SCRATCH_WORKSHEET)
        .with_input(p.data.clone(), p.new_data.clone())
        .with_output(p.eval.clone())
        .with_skip_prelude(true);
    let plan = mimic_bundles(&p.store, &request).await.unwrap();

    assert_eq!(
        p.store.worksheet(SCRATCH_WORKSHEET).unwrap().items,
        plan.new_ids()
            .into_iter()
            .map(WorksheetItem::bundle)
            .collect::<Vec<_>>()
    );
    assert_eq!(p.store.worksheet(MAIN_WORKSHEET).unwrap().items.len(), Pipeline::MAIN_ITEMS);
}

#[tokio::test]
async fn test_shadow_mode_leaves_placement_to_the_store() {
    let p = Pipeline::new();
    let outcome = run_mimic(&p.store, &eval_request(&p).with_shadow(true))
        .await
        .unwrap();

    assert!(outcome.placement.is_none());
    assert_eq!(p.store.call_counts().create_worksheet_item, 0);

    let items = p.store.worksheet(MAIN_WORKSHEET).unwrap().items;
    let new_prep = new_id_for(&outcome.plan, &p.prep);
    let at = items
        .iter()
        .position(|item| item.bundle_id() == Some(p.prep.as_str()))
        .unwrap();
    assert_eq!(items[at + 1], WorksheetItem::bundle(new_prep));
}

#[tokio::test]
async fn test_overrides_take_precedence_over_the_output_name() {
    let p = Pipeline::new();
    let request = eval_request(&p)
        .with_output_name("eval-v2")
        .with_metadata_override("name", "X")
        .with_metadata_override("request_gpus", 2);
    let plan = mimic_bundles(&p.store, &request).await.unwrap();

    for entry in &plan {
        assert_eq!(entry.new.name(), "X");
    }
    let train = &plan.entry_for(&p.train).unwrap().new;
    assert_eq!(train.metadata["request_gpus"], json!(2));
    assert_eq!(
        train.metadata["request_docker_image"],
        json!("codalab/torch@sha256:1f2e")
    );
    assert!(!train.metadata.contains_key("exitcode"));
}

#[tokio::test]
async fn test_output_name_and_synthesized_names() {
    let p = Pipeline::new();
    let plan = mimic_bundles(&p.store, &eval_request(&p).with_output_name("eval-v2"))
        .await
        .unwrap();

    assert_eq!(plan.entry_for(&p.eval).unwrap().new.name(), "eval-v2");
    assert_eq!(plan.entry_for(&p.prep).unwrap().new.name(), "eval-v2-prep");
    assert!(!plan.entry_for(&p.prep).unwrap().new.metadata.contains_key("time"));
}

#[tokio::test]
async fn test_dataset_downstream_of_an_input_aborts() {
    let p = Pipeline::new();
    let copy = p.add_derived_dataset();
    let request = MimicRequest::new(MAIN_WORKSHEET)
        .with_input(p.data.clone(), p.new_data.clone())
        .with_output(copy.clone());

    let err = mimic_bundles(&p.store, &request).await.unwrap_err();
    assert!(err.is_usage());
    assert_eq!(
        err.to_string(),
        format!("Can't mimic {copy} since it is not make or run")
    );
    assert_eq!(p.store.call_counts().mutations(), 0);
}

#[tokio::test]
async fn test_without_output_every_descendant_is_replayed() {
    let p = Pipeline::new();
    let request =
        MimicRequest::new(SCRATCH_WORKSHEET).with_input(p.data.clone(), p.new_data.clone());
    let plan = mimic_bundles(&p.store, &request).await.unwrap();

    let mut replayed = old_ids(&plan);
    replayed.sort_unstable();
    let mut expected = vec![
        p.prep.as_str(),
        p.stats.as_str(),
        p.train.as_str(),
        p.eval.as_str(),
    ];
    expected.sort_unstable();
    assert_eq!(replayed, expected);

    // Parents first.
    let position = |old: &str| old_ids(&plan).iter().position(|id| *id == old).unwrap();
    assert!(position(p.prep.as_str()) < position(p.train.as_str()));
    assert!(position(p.train.as_str()) < position(p.eval.as_str()));

    // Anchored on data, which the scratch worksheet does not host.
    assert_eq!(p.store.worksheet(SCRATCH_WORKSHEET).unwrap().items.len(), 4 + 3);
}

#[tokio::test]
async fn test_lone_output_is_copied() {
    let p = Pipeline::new();
    let request = MimicRequest::new(SCRATCH_WORKSHEET)
        .with_output(p.vocab.clone())
        .with_output_name("vocab-rerun");
    let plan = mimic_bundles(&p.store, &request).await.unwrap();

    assert_eq!(old_ids(&plan), vec![p.vocab.as_str()]);
    assert_eq!(plan.entries()[0].new.name(), "vocab-rerun");
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_any_call() {
    let p = Pipeline::new();
    let mut request = eval_request(&p);
    request.new_inputs.clear();

    let err = mimic_bundles(&p.store, &request).await.unwrap_err();
    assert!(matches!(err, MimicError::Usage(_)));
    assert_eq!(p.store.call_counts(), Default::default());
}

#[tokio::test]
async fn test_missing_output_is_a_usage_error() {
    let p = Pipeline::new();
    let request = MimicRequest::new(MAIN_WORKSHEET).with_output("0xdoesnotexist");
    let err = mimic_bundles(&p.store, &request).await.unwrap_err();
    assert!(err.is_usage());
    assert!(matches!(err, MimicError::Store(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let p = Pipeline::new();
    let request = eval_request(&p);
    p.store
        .fail_next(2, StoreError::Transport("connection reset".into()));
    let store = RetryingStore::new(p.store, RetryConfig::immediate(3));

    let plan = mimic_bundles(&store, &request).await.unwrap();
    assert_eq!(plan.len(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_abort_the_replay() {
    let p = Pipeline::new();
    let request = eval_request(&p);
    p.store
        .fail_next(2, StoreError::Transport("connection reset".into()));
    let store = RetryingStore::new(p.store, RetryConfig::immediate(2));

    let err = mimic_bundles(&store, &request).await.unwrap_err();
    assert!(matches!(
        err,
        MimicError::Store(StoreError::RetriesExhausted { attempts: 2, .. })
    ));
    assert_eq!(store.inner().call_counts().mutations(), 0);
}
