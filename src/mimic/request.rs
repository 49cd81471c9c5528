use serde_json::Value;

use super::MimicError;
use crate::config::MimicDefaults;
use crate::model::Metadata;

/// Parameters of a replay
#[derive(Debug, Clone)]
pub struct MimicRequest {
    /// Bundles to substitute, paired by position with `new_inputs`
    pub old_inputs: Vec<String>,
    /// Bundle whose provenance is replayed; when absent, everything
    /// downstream of `old_inputs` is
    pub old_output: Option<String>,
    pub new_inputs: Vec<String>,
    /// Name for the bundle replacing `old_output`
    pub new_output_name: Option<String>,
    /// Worksheet receiving the new bundles
    pub worksheet_id: String,
    /// How many levels of ancestors to discover
    pub depth: u32,
    /// Let the store insert each new bundle after the bundle it replaces
    pub shadow: bool,
    /// Plan only; never touch the store
    pub dry_run: bool,
    /// Values replacing computed metadata on every new bundle
    pub metadata_override: Metadata,
    /// Do not replicate markup and directives preceding replaced bundles
    pub skip_prelude: bool,
    /// Reuse existing bundles with the same command and dependencies
    pub memoize: bool,
}

impl MimicRequest {
    pub fn new(worksheet_id: impl Into<String>) -> Self {
        Self::from_defaults(worksheet_id, &MimicDefaults::default())
    }

    pub fn from_defaults(worksheet_id: impl Into<String>, defaults: &MimicDefaults) -> Self {
        Self {
            old_inputs: Vec::new(),
            old_output: None,
            new_inputs: Vec::new(),
            new_output_name: None,
            worksheet_id: worksheet_id.into(),
            depth: defaults.depth,
            shadow: defaults.shadow,
            dry_run: false,
            metadata_override: Metadata::new(),
            skip_prelude: defaults.skip_prelude,
            memoize: defaults.memoize,
        }
    }

    /// Add one substitution pair
    pub fn with_input(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.old_inputs.push(old.into());
        self.new_inputs.push(new.into());
        self
    }

    pub fn with_output(mut self, old_output: impl Into<String>) -> Self {
        self.old_output = Some(old_output.into());
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.new_output_name = Some(name.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_shadow(mut self, shadow: bool) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_metadata_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata_override.insert(key.into(), value.into());
        self
    }

    pub fn with_skip_prelude(mut self, skip_prelude: bool) -> Self {
        self.skip_prelude = skip_prelude;
        self
    }

    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    /// Output name override, ignoring an empty one
    pub fn output_name(&self) -> Option<&str> {
        self.new_output_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Bundle whose worksheet position guides placement
    pub fn anchor(&self) -> Option<&str> {
        self.old_output
            .as_deref()
            .or_else(|| self.old_inputs.first().map(String::as_str))
    }

    pub fn is_output(&self, bundle_id: &str) -> bool {
        self.old_output.as_deref() == Some(bundle_id)
    }

    pub fn validate(&self) -> Result<(), MimicError> {
        if self.old_inputs.len() != self.new_inputs.len() {
            return Err(MimicError::Usage(format!(
                "Got {} old inputs but {} new inputs",
                self.old_inputs.len(),
                self.new_inputs.len()
            )));
        }
        if self.old_output.is_none() && self.old_inputs.is_empty() {
            return Err(MimicError::Usage(
                "Nothing to mimic: give an old output or at least one old input".to_string(),
            ));
        }
        if self.worksheet_id.is_empty() {
            return Err(MimicError::Usage("No target worksheet given".to_string()));
        }
        Ok(())
    }
}
