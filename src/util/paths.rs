//! Where mimic keeps its config and logs.
//!
//! Everything lives under one data directory, `~/.mimic` unless `--data-dir`
//! picks another one at startup.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const DATA_DIR_NAME: &str = ".mimic";
const LOG_FILE_NAME: &str = "mimic.log";
const CONFIG_FILE_NAME: &str = "config.toml";

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Fix the data directory for the rest of the process.
///
/// Only the first call counts; later ones are logged and ignored.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path.unwrap_or_else(default_data_dir);
    if let Err(rejected) = DATA_DIR.set(path) {
        tracing::debug!(
            rejected = %rejected.display(),
            current = %data_dir().display(),
            "Data directory already fixed"
        );
    }
}

fn default_data_dir() -> PathBuf {
    under_home(dirs::home_dir().as_deref())
}

/// `<home>/.mimic`, or `.mimic` relative to the working directory when
/// there is no home
fn under_home(home: Option<&Path>) -> PathBuf {
    match home {
        Some(home) => home.join(DATA_DIR_NAME),
        None => PathBuf::from(DATA_DIR_NAME),
    }
}

pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn log_file_path() -> PathBuf {
    logs_dir().join(LOG_FILE_NAME)
}

pub fn config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE_NAME)
}
