use std::collections::HashSet;

use serde::Serialize;

use super::{ReplayPlan, SubstitutionMap};
use crate::model::WorksheetItem;
use crate::store::{BundleStore, StoreError};

/// What the placer wrote to the target worksheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlacementReport {
    /// Worksheet whose layout was followed, if the anchor had one
    pub host_worksheet: Option<String>,
    /// New bundles placed following the host layout, in placement order
    pub placed: Vec<String>,
    /// New bundles appended at the end because the host layout had no slot
    pub appended: Vec<String>,
    /// Markup and directive items copied ahead of placed bundles
    pub prelude_items: usize,
}

/// Inserts freshly created bundles into a worksheet, mirroring the layout of
/// the worksheet the replayed graph lives on.
///
/// A bundle's prelude is the run of non-empty markup and directive items
/// directly above it. When a replaced bundle is found on the host worksheet,
/// its prelude is copied to the target along with the new bundle.
pub struct WorksheetPlacer<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> WorksheetPlacer<'a, S>
where
    S: BundleStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn place(
        &self,
        plan: &ReplayPlan,
        substitutions: &SubstitutionMap,
        created: &HashSet<String>,
        target: &str,
        anchor: Option<&str>,
        skip_prelude: bool,
    ) -> Result<PlacementReport, StoreError> {
        let mut report = PlacementReport::default();
        let mut placed: HashSet<String> = HashSet::new();

        let hosts = match anchor {
            Some(anchor) => self.store.fetch_worksheets_by_bundle(anchor).await?,
            None => Vec::new(),
        };

        // First host wins unless the target itself hosts the anchor.
        let host = hosts
            .iter()
            .find(|h| h.id == target)
            .or_else(|| hosts.first())
            .map(|h| h.id.clone());

        if let Some(host_id) = host.as_deref() {
            let worksheet = self.store.fetch_worksheet(host_id).await?;
            tracing::debug!(
                host = %host_id,
                target = %target,
                items = worksheet.items.len(),
                "Following host worksheet layout"
            );

            let mut prelude: Vec<&WorksheetItem> = Vec::new();
            for item in &worksheet.items {
                if item.is_prelude() {
                    prelude.push(item);
                    continue;
                }

                let fresh = item
                    .bundle_id()
                    .and_then(|old| substitutions.get(old))
                    .flatten()
                    .filter(|new| created.contains(*new));
                if let Some(new_id) = fresh {
                    if !skip_prelude {
                        for prelude_item in &prelude {
                            self.store.create_worksheet_item(prelude_item, target).await?;
                            report.prelude_items += 1;
                        }
                    }
                    self.store
                        .create_worksheet_item(&WorksheetItem::bundle(new_id), target)
                        .await?;
                    placed.insert(new_id.to_string());
                    report.placed.push(new_id.to_string());
                }
                prelude.clear();
            }
        }
        report.host_worksheet = host;

        for entry in plan {
            let Some(new_id) = entry.new_id() else {
                continue;
            };
            if placed.contains(new_id) {
                continue;
            }
            self.store
                .create_worksheet_item(&WorksheetItem::bundle(new_id), target)
                .await?;
            report.appended.push(new_id.to_string());
        }

        tracing::info!(
            target = %target,
            placed = report.placed.len(),
            appended = report.appended.len(),
            prelude_items = report.prelude_items,
            "Placed replayed bundles"
        );
        Ok(report)
    }
}
