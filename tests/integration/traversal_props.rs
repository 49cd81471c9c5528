//! Property-based tests for replay invariants.
//!
//! Random layered DAGs hang off a single dataset; replacing it and
//! replaying the last bundle must recreate exactly the bundles on a path
//! between the two, parents first.

use std::collections::{HashMap, HashSet};

use mimic::model::{BundleDescription, BundleType, Dependency, Worksheet};
use mimic::{mimic_bundles, MemoryStore, MimicRequest};
use proptest::prelude::*;
use tokio_test::block_on;

const WORKSHEET: &str = "0xws";

/// Parent indices of every run bundle; bundle 0 is the dataset
fn arb_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (2usize..10).prop_flat_map(|n| {
        (1..n)
            .map(|i| prop::collection::btree_set(0..i, 1..=i.min(3)))
            .collect::<Vec<_>>()
            .prop_map(|sets| sets.into_iter().map(|s| s.into_iter().collect()).collect())
    })
}

fn id(i: usize) -> String {
    format!("0x{i:032x}")
}

fn build(parents: &[Vec<usize>]) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_bundle(BundleDescription::new(BundleType::Dataset, "input").with_id(id(0)));
    store.insert_bundle(BundleDescription::new(BundleType::Dataset, "input-v2").with_id("0xnew"));
    for (offset, deps) in parents.iter().enumerate() {
        let i = offset + 1;
        let mut bundle = BundleDescription::new(BundleType::Run, format!("step{i}"))
            .with_id(id(i))
            .with_command(format!("step {i}"));
        for parent in deps {
            bundle = bundle.with_dependency(Dependency::new(id(*parent), format!("in{parent}")));
        }
        store.insert_bundle(bundle);
    }
    store.insert_worksheet(Worksheet::new(WORKSHEET, "props"));
    store
}

/// Bundles reachable from 0 that are also ancestors of (or equal to) `output`
fn affected(parents: &[Vec<usize>], output: usize) -> HashSet<usize> {
    let n = parents.len() + 1;
    let mut downstream = vec![false; n];
    downstream[0] = true;
    for i in 1..n {
        downstream[i] = parents[i - 1].iter().any(|p| downstream[*p]);
    }

    let mut ancestry = HashSet::from([output]);
    let mut stack = vec![output];
    while let Some(i) = stack.pop() {
        if i == 0 {
            continue;
        }
        for p in &parents[i - 1] {
            if ancestry.insert(*p) {
                stack.push(*p);
            }
        }
    }

    ancestry
        .into_iter()
        .filter(|i| *i != 0 && downstream[*i])
        .collect()
}

proptest! {
    #[test]
    fn prop_replay_recreates_exactly_the_affected_bundles(parents in arb_dag()) {
        let store = build(&parents);
        let output = parents.len();
        let request = MimicRequest::new(WORKSHEET)
            .with_input(id(0), "0xnew")
            .with_output(id(output))
            .with_depth(output as u32 + 1);

        let plan = block_on(mimic_bundles(&store, &request)).unwrap();

        let replayed: HashSet<usize> = plan
            .iter()
            .map(|entry| {
                let old = entry.old_id().unwrap();
                usize::from_str_radix(old.trim_start_matches("0x"), 16).unwrap()
            })
            .collect();
        prop_assert_eq!(replayed.len(), plan.len());
        prop_assert_eq!(&replayed, &affected(&parents, output));
        prop_assert_eq!(store.call_counts().create_bundle, plan.len());

        // Every new dependency points at a replacement created earlier in
        // the plan, the new input, or an untouched original.
        let replacement: HashMap<&str, &str> = plan
            .iter()
            .map(|entry| (entry.old_id().unwrap(), entry.new_id().unwrap()))
            .collect();
        let mut seen: HashSet<&str> = HashSet::from(["0xnew"]);
        for entry in &plan {
            for (old_dep, new_dep) in entry.old.dependencies.iter().zip(&entry.new.dependencies) {
                prop_assert_eq!(&old_dep.child_path, &new_dep.child_path);
                match replacement.get(old_dep.parent_id.as_str()) {
                    Some(new_parent) => {
                        prop_assert_eq!(new_dep.parent_id.as_str(), *new_parent);
                        prop_assert!(seen.contains(*new_parent));
                    }
                    None if old_dep.parent_id == id(0) => {
                        prop_assert_eq!(new_dep.parent_id.as_str(), "0xnew");
                    }
                    None => prop_assert_eq!(&new_dep.parent_id, &old_dep.parent_id),
                }
            }
            seen.insert(entry.new_id().unwrap());
        }
    }

    #[test]
    fn prop_dry_run_never_mutates(parents in arb_dag()) {
        let store = build(&parents);
        let output = parents.len();
        let request = MimicRequest::new(WORKSHEET)
            .with_input(id(0), "0xnew")
            .with_output(id(output))
            .with_depth(output as u32 + 1)
            .with_dry_run(true)
            .with_memoize(true);

        let plan = block_on(mimic_bundles(&store, &request)).unwrap();

        prop_assert_eq!(plan.len(), affected(&parents, output).len());
        prop_assert_eq!(store.call_counts().mutations(), 0);
        prop_assert_eq!(store.call_counts().search, 0);
    }
}
