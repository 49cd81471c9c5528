//! Shared data model for bundles and worksheets.
//!
//! These types mirror the JSON shapes exchanged with the bundle service, so
//! every type here round-trips through `serde_json` unchanged.

pub mod bundle;
pub mod metadata;
pub mod worksheet;

pub use bundle::{
    BundleDescription, BundleGuardError, BundleState, BundleType, Dependency, DependencyKey,
};
pub use metadata::{Metadata, MetadataSpec};
pub use worksheet::{Worksheet, WorksheetItem, WorksheetSummary};
