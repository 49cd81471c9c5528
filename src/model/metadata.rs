//! Per-type metadata schemas.
//!
//! The service computes `generated` keys itself and rejects them on create, so
//! anything replayed from an existing bundle must drop them first.

use serde_json::{Map, Value};

/// Free-form bundle metadata as returned by the service.
pub type Metadata = Map<String, Value>;

/// A single declared metadata key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataSpec {
    pub key: &'static str,
    /// Computed by the service; never part of a create payload
    pub generated: bool,
}

const fn field(key: &'static str) -> MetadataSpec {
    MetadataSpec {
        key,
        generated: false,
    }
}

const fn generated(key: &'static str) -> MetadataSpec {
    MetadataSpec {
        key,
        generated: true,
    }
}

pub(crate) const DATASET_SPECS: &[MetadataSpec] = &[
    field("name"),
    field("description"),
    field("tags"),
    field("license"),
    field("source_url"),
    field("link_url"),
    field("link_format"),
    generated("created"),
    generated("data_size"),
    generated("failure_message"),
];

pub(crate) const MAKE_SPECS: &[MetadataSpec] = &[
    field("name"),
    field("description"),
    field("tags"),
    field("allow_failed_dependencies"),
    generated("created"),
    generated("data_size"),
    generated("failure_message"),
    generated("error_traceback"),
];

pub(crate) const RUN_SPECS: &[MetadataSpec] = &[
    field("name"),
    field("description"),
    field("tags"),
    field("allow_failed_dependencies"),
    field("request_docker_image"),
    field("request_time"),
    field("request_memory"),
    field("request_disk"),
    field("request_cpus"),
    field("request_gpus"),
    field("request_queue"),
    field("request_priority"),
    field("request_network"),
    field("exclude_patterns"),
    field("store"),
    generated("created"),
    generated("data_size"),
    generated("failure_message"),
    generated("error_traceback"),
    generated("actions"),
    generated("time"),
    generated("time_user"),
    generated("time_system"),
    generated("memory"),
    generated("memory_max"),
    generated("started"),
    generated("last_updated"),
    generated("run_status"),
    generated("staged_status"),
    generated("time_preparing"),
    generated("time_running"),
    generated("time_cleaning_up"),
    generated("time_uploading_results"),
    generated("docker_image"),
    generated("exitcode"),
    generated("job_handle"),
    generated("remote"),
    generated("remote_history"),
    generated("on_preemptible_worker"),
];

/// Read a string-valued metadata key, treating non-strings as absent
pub fn metadata_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str)
}
