//! Task executors for restore and point-in-time recovery.

mod branch;
pub mod context;
pub mod executor;
pub mod pitr;
pub mod registry;
pub mod restore;

pub use context::ExecutionContext;
pub use executor::{CompletionFlag, CompletionGuard, TaskExecutor, TaskRunOutcome};
pub use pitr::{
    MAX_DATABASE_NAME_LEN, PitrRestoreTaskExecutor, format_unix_ts, pitr_database_name,
    select_backup,
};
pub use registry::{ExecutorFactory, ExecutorRegistry};
pub use restore::DatabaseRestoreTaskExecutor;
