// ============================================================================
// restorekit: database restore and point-in-time recovery executors
// ============================================================================

pub mod api;
pub mod binlog;
pub mod config;
pub mod core;
pub mod driver;
pub mod executor;
pub mod store;

// Re-export main types for convenience
pub use api::{
    Backup, BackupFind, BackupPayload, BackupStatus, BackupStorageBackend, BackupType, BinlogInfo,
    Database, DatabaseFind, DatabasePatch, Engine, Instance, Issue, Principal, Progress, Project,
    Task, TaskRunResultPayload, TaskType, WorkflowType,
};
pub use binlog::{BinlogCoordinator, BinlogEvent, BinlogReplay, FetchReport};
pub use config::Profile;
pub use crate::core::{ErrorKind, RestoreError, Result};
pub use driver::{BinlogDriver, Driver, DriverProvider, DumpStream, MigrationInfo};
pub use executor::{
    DatabaseRestoreTaskExecutor, ExecutionContext, ExecutorRegistry, PitrRestoreTaskExecutor,
    TaskExecutor, TaskRunOutcome,
};
pub use store::{MemoryStore, Store};
