//! Data model shared by the store, the drivers and the executors.

pub mod backup;
pub mod database;
pub mod task;

pub use backup::{
    Backup, BackupFind, BackupPayload, BackupStatus, BackupStorageBackend, BackupSummary,
    BackupType, BinlogInfo,
};
pub use database::{
    Database, DatabaseFind, DatabasePatch, Engine, Instance, Issue, Principal, Project,
    SYSTEM_BOT_ID, WorkflowType,
};
pub use task::{
    DatabaseRestorePayload, PitrRestorePayload, Progress, Task, TaskRunResultPayload, TaskType,
};
