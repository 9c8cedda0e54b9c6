use crate::core::{RestoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default cap on a single dump line (64 MiB). Extended inserts in logical
/// dumps routinely reach several megabytes, so the cap only guards against
/// unbounded input.
pub const DEFAULT_MAX_DUMP_LINE_BYTES: usize = 64 * 1024 * 1024;

/// Default cap on a single mirrored binlog event record (64 MiB).
pub const DEFAULT_MAX_BINLOG_EVENT_BYTES: usize = 64 * 1024 * 1024;

/// Process profile consumed by the executors.
///
/// Similar to a server profile: where data lives and which release is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    /// Root data directory; relative backup paths and the binlog mirror live under it.
    pub data_dir: PathBuf,

    /// Release version recorded in migration history entries.
    pub release_version: String,

    /// Longest dump line accepted while streaming a dump into a driver.
    pub max_dump_line_bytes: usize,

    /// Longest binlog event record accepted while replaying the mirror.
    pub max_binlog_event_bytes: usize,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            release_version: env!("CARGO_PKG_VERSION").to_string(),
            max_dump_line_bytes: DEFAULT_MAX_DUMP_LINE_BYTES,
            max_binlog_event_bytes: DEFAULT_MAX_BINLOG_EVENT_BYTES,
        }
    }
}

impl Profile {
    /// Create a profile rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Set the release version
    pub fn release_version(mut self, version: &str) -> Self {
        self.release_version = version.to_string();
        self
    }

    /// Set the dump line cap
    pub fn max_dump_line_bytes(mut self, max: usize) -> Self {
        self.max_dump_line_bytes = max;
        self
    }

    /// Set the binlog event record cap
    pub fn max_binlog_event_bytes(mut self, max: usize) -> Self {
        self.max_binlog_event_bytes = max;
        self
    }

    /// Load a profile from a JSON file; missing keys fall back to defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|err| {
            RestoreError::Io(format!("failed to read profile {}: {}", path.display(), err))
        })?;
        let profile: Profile = serde_json::from_slice(&bytes).map_err(|err| {
            RestoreError::Invalid(format!("failed to parse profile {}: {}", path.display(), err))
        })?;
        if profile.max_dump_line_bytes == 0 {
            return Err(RestoreError::Invalid(
                "maxDumpLineBytes must be greater than zero".to_string(),
            ));
        }
        if profile.max_binlog_event_bytes == 0 {
            return Err(RestoreError::Invalid(
                "maxBinlogEventBytes must be greater than zero".to_string(),
            ));
        }
        Ok(profile)
    }

    /// Absolute backup paths are used as-is, relative ones join the data directory.
    pub fn resolve_backup_path(&self, backup_path: &str) -> PathBuf {
        let path = Path::new(backup_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    /// `{data_dir}/binlog/{instance_id}`
    pub fn binlog_dir(&self, instance_id: i64) -> PathBuf {
        self.data_dir.join("binlog").join(instance_id.to_string())
    }
}
