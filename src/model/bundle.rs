use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::metadata::{metadata_str, Metadata, MetadataSpec, DATASET_SPECS, MAKE_SPECS, RUN_SPECS};

/// Kind of bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleType {
    /// Uploaded contents
    Dataset,
    /// Composite assembled from its dependencies
    Make,
    /// Output of running a command
    Run,
}

impl BundleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleType::Dataset => "dataset",
            BundleType::Make => "make",
            BundleType::Run => "run",
        }
    }

    /// Metadata keys declared for this bundle type
    pub fn metadata_specs(&self) -> &'static [MetadataSpec] {
        match self {
            BundleType::Dataset => DATASET_SPECS,
            BundleType::Make => MAKE_SPECS,
            BundleType::Run => RUN_SPECS,
        }
    }

    /// Only derived bundles can be recreated from their recipe
    pub fn is_mimicable(&self) -> bool {
        matches!(self, BundleType::Make | BundleType::Run)
    }
}

impl std::fmt::Display for BundleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    #[default]
    Created,
    Uploading,
    Making,
    Staged,
    Starting,
    Preparing,
    Running,
    Finalizing,
    Ready,
    Failed,
    Killed,
    WorkerOffline,
    #[serde(other)]
    Unknown,
}

impl BundleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleState::Created => "created",
            BundleState::Uploading => "uploading",
            BundleState::Making => "making",
            BundleState::Staged => "staged",
            BundleState::Starting => "starting",
            BundleState::Preparing => "preparing",
            BundleState::Running => "running",
            BundleState::Finalizing => "finalizing",
            BundleState::Ready => "ready",
            BundleState::Failed => "failed",
            BundleState::Killed => "killed",
            BundleState::WorkerOffline => "worker_offline",
            BundleState::Unknown => "unknown",
        }
    }

    /// States a bundle never leaves
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            BundleState::Ready | BundleState::Failed | BundleState::Killed
        )
    }
}

/// One edge of the provenance graph.
///
/// `child_id` is informational only; the edge is identified by
/// `parent_id` + `child_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub parent_id: String,
    #[serde(default)]
    pub parent_path: String,
    #[serde(default)]
    pub child_id: String,
    pub child_path: String,
}

impl Dependency {
    pub fn new(parent_id: impl Into<String>, child_path: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            parent_path: String::new(),
            child_id: String::new(),
            child_path: child_path.into(),
        }
    }

    pub fn with_parent_path(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = parent_path.into();
        self
    }

    pub fn key(&self) -> DependencyKey {
        DependencyKey {
            parent_id: self.parent_id.clone(),
            child_path: self.child_path.clone(),
        }
    }
}

/// Shape used to look up equivalent bundles
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyKey {
    pub parent_id: String,
    pub child_path: String,
}

/// Full description of a bundle as fetched from (or sent to) the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDescription {
    /// Absent on create payloads and dry-run placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub bundle_type: BundleType,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub data_hash: Option<String>,
    #[serde(default)]
    pub state: BundleState,
    /// When the bundle was frozen, if it is
    #[serde(default)]
    pub frozen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Filled in by the service on fetch; never stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_details: Option<String>,
}

/// Refusal to mutate or freeze a bundle
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BundleGuardError {
    #[error("Cannot mutate frozen bundle {id}({name}).")]
    Frozen { id: String, name: String },
    #[error("Cannot freeze bundle {id}({name}), bundle is not in a final state.")]
    NotFinal { id: String, name: String },
}

impl BundleDescription {
    pub fn new(bundle_type: BundleType, name: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("name".into(), serde_json::Value::String(name.into()));
        Self {
            id: None,
            bundle_type,
            owner_id: None,
            command: None,
            data_hash: None,
            state: BundleState::Created,
            frozen: None,
            is_anonymous: false,
            metadata,
            dependencies: Vec::new(),
            state_details: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_state(mut self, state: BundleState) -> Self {
        self.state = state;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Bundle name, or an empty string when the metadata has none
    pub fn name(&self) -> &str {
        metadata_str(&self.metadata, "name").unwrap_or_default()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    fn guard_label(&self) -> (String, String) {
        (
            self.id.clone().unwrap_or_default(),
            self.name().to_string(),
        )
    }

    pub fn ensure_not_frozen(&self) -> Result<(), BundleGuardError> {
        if self.is_frozen() {
            let (id, name) = self.guard_label();
            return Err(BundleGuardError::Frozen { id, name });
        }
        Ok(())
    }

    pub fn ensure_freezable(&self) -> Result<(), BundleGuardError> {
        if !self.state.is_final() {
            let (id, name) = self.guard_label();
            return Err(BundleGuardError::NotFinal { id, name });
        }
        Ok(())
    }

    /// Human readable explanation of the current state.
    ///
    /// Bundles that are preparing or running report their worker-provided
    /// `run_status` instead.
    pub fn describe_state(&self) -> String {
        if matches!(self.state, BundleState::Preparing | BundleState::Running) {
            return metadata_str(&self.metadata, "run_status")
                .unwrap_or_default()
                .to_string();
        }
        state_details(self.bundle_type, self.state)
            .unwrap_or_default()
            .to_string()
    }
}

fn state_details(bundle_type: BundleType, state: BundleState) -> Option<&'static str> {
    use BundleState::*;

    let text = match (bundle_type, state) {
        (BundleType::Dataset, Created) => {
            "Bundle has been created but its contents have not been uploaded yet."
        }
        (BundleType::Dataset, Uploading) => "Bundle contents are being uploaded.",
        (BundleType::Dataset, Ready) => {
            "Bundle has finished uploading successfully, and is ready to be used for further runs."
        }
        (BundleType::Dataset, Failed) => "Bundle uploading failed.",
        (BundleType::Make, Created) => {
            "Bundle has been created but its contents have not yet been populated."
        }
        (BundleType::Make, Making) => {
            "Bundle contents are being populated by copying its dependencies."
        }
        (BundleType::Make, Ready) => {
            "Bundle contents have been successfully populated and is ready for further runs."
        }
        (BundleType::Make, Failed) => "Populating bundle contents failed.",
        (BundleType::Run, Created) => {
            "Bundle has been created but its contents have not been populated yet."
        }
        (BundleType::Run, Staged) => {
            "Bundle's dependencies are all ready. Waiting for the bundle to be assigned to a worker to be run."
        }
        (BundleType::Run, Starting) => {
            "Bundle has been assigned to a worker. Waiting for worker to start the bundle."
        }
        (BundleType::Run, Finalizing) => {
            "Bundle command has finished executing, cleaning up on the worker."
        }
        (BundleType::Run, Ready) => {
            "Bundle command has finished executing successfully, and results have been uploaded to the server."
        }
        (BundleType::Run, Failed) => "Bundle has failed.",
        (BundleType::Run, Killed) => {
            "Bundle was killed by the user. Bundle contents populated based on when the bundle was killed."
        }
        (BundleType::Run, WorkerOffline) => {
            "The worker where the bundle is running on is offline, and the worker might or might not come back online."
        }
        _ => return None,
    };
    Some(text)
}
