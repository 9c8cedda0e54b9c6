//! Backup metadata and the write-ahead coordinate captured alongside a dump.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a backup. Only [`BackupStatus::Done`] is restorable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatus {
    PendingCreate,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupType {
    Automatic,
    /// Taken at the PITR cutover stage.
    Pitr,
    Manual,
}

/// Where the dump content lives. Only `Local` is implemented; the object
/// store backends are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStorageBackend {
    #[default]
    Local,
    S3,
    Gcs,
    Oss,
}

/// Exact position in a source engine's binlog: segment name plus byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BinlogInfo {
    pub file_name: String,
    pub position: u64,
}

impl BinlogInfo {
    pub fn new(file_name: impl Into<String>, position: u64) -> Self {
        Self {
            file_name: file_name.into(),
            position,
        }
    }

    /// Empty means "no PITR coordinate available".
    pub fn is_empty(&self) -> bool {
        self.file_name.is_empty() && self.position == 0
    }
}

impl fmt::Display for BinlogInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_name, self.position)
    }
}

/// Engine-specific recovery metadata stored with a backup.
///
/// The binlog coordinate is recorded in the same transaction as the dump so
/// the two are mutually consistent. Engines without binlog support carry no
/// coordinate at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "engine")]
pub enum BackupPayload {
    #[default]
    None,
    Mysql {
        #[serde(rename = "binlogInfo", default)]
        binlog_info: BinlogInfo,
    },
    Postgres {},
}

impl BackupPayload {
    pub fn mysql(binlog_info: BinlogInfo) -> Self {
        BackupPayload::Mysql { binlog_info }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub id: i64,
    pub database_id: i64,
    pub name: String,
    pub status: BackupStatus,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    #[serde(default)]
    pub storage_backend: BackupStorageBackend,
    /// Capture time, unix seconds.
    pub created_ts: i64,
    /// Migration history version of the source database when the dump was taken.
    #[serde(default)]
    pub migration_history_version: String,
    /// Dump location; relative paths are resolved against the data directory.
    pub path: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub payload: BackupPayload,
}

impl Backup {
    /// The PITR coordinate, present only for binlog-capable engines that
    /// recorded a non-empty one.
    pub fn binlog_info(&self) -> Option<&BinlogInfo> {
        match &self.payload {
            BackupPayload::Mysql { binlog_info } if !binlog_info.is_empty() => Some(binlog_info),
            _ => None,
        }
    }

    pub fn is_restorable(&self) -> bool {
        self.status == BackupStatus::Done
    }

    pub fn summary(&self) -> BackupSummary<'_> {
        BackupSummary(std::slice::from_ref(self))
    }
}

/// Compact log rendering of a backup list: `[{name, id, coordinate}, ...]`.
pub struct BackupSummary<'a>(pub &'a [Backup]);

impl fmt::Display for BackupSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, backup) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match backup.binlog_info() {
                Some(info) => write!(f, "{{name:{}, id:{}, binlog:{}}}", backup.name, backup.id, info)?,
                None => write!(f, "{{name:{}, id:{}}}", backup.name, backup.id)?,
            }
        }
        f.write_str("]")
    }
}

/// Filter for [`crate::store::Store::find_backups`].
#[derive(Debug, Clone, Default)]
pub struct BackupFind {
    pub id: Option<i64>,
    pub database_id: Option<i64>,
    pub name: Option<String>,
    pub status: Option<BackupStatus>,
}

impl BackupFind {
    pub fn matches(&self, backup: &Backup) -> bool {
        self.id.is_none_or(|id| backup.id == id)
            && self.database_id.is_none_or(|id| backup.database_id == id)
            && self.name.as_deref().is_none_or(|name| backup.name == name)
            && self.status.is_none_or(|status| backup.status == status)
    }
}
