pub mod config;
pub mod mimic;
pub mod model;
pub mod store;
pub mod util;

pub use config::Config;
pub use mimic::{
    mimic_bundles, run_mimic, MimicError, MimicOutcome, MimicRequest, PlanEntry, ReplayPlan,
};
pub use model::{BundleDescription, BundleType, Dependency, Worksheet, WorksheetItem};
pub use store::{BundleStore, CreatePlacement, MemoryStore, RetryingStore, StoreError};
