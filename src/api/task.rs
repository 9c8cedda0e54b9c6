use super::database::{Database, Instance, Principal};
use crate::core::{RestoreError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "bb.task.database.restore")]
    DatabaseRestore,
    #[serde(rename = "bb.task.database.restore.pitr.restore")]
    PitrRestore,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DatabaseRestore => "bb.task.database.restore",
            TaskType::PitrRestore => "bb.task.database.restore.pitr.restore",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted unit of work, consumed by one executor attempt at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub pipeline_id: i64,
    pub instance: Instance,
    #[serde(default)]
    pub database: Option<Database>,
    pub creator: Principal,
    /// Type-dependent JSON payload.
    pub payload: String,
}

impl Task {
    pub fn instance_id(&self) -> i64 {
        self.instance.id
    }

    /// Decodes the payload, mapping malformed JSON to `Invalid`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.payload).map_err(|err| {
            RestoreError::Invalid(format!(
                "invalid {} payload {:?}: {}",
                self.task_type, self.payload, err
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseRestorePayload {
    pub backup_id: i64,
    pub database_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitrRestorePayload {
    /// Inclusive cut line, unix seconds.
    pub point_in_time_ts: i64,
}

/// Output of a terminal attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskRunResultPayload {
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
}

impl Progress {
    /// Progress of a single-shot attempt: nothing until done, then all of it.
    pub fn binary(completed: bool) -> Self {
        if completed {
            Self { done: 1, total: 1 }
        } else {
            Self::default()
        }
    }
}
