//! Lookup/patch capability over the control-plane metadata store.

pub mod memory;

pub use memory::MemoryStore;

use crate::api::{Backup, BackupFind, Database, DatabaseFind, DatabasePatch, Issue, Task};
use crate::core::Result;
use async_trait::async_trait;

/// Already-consistent lookups. `Ok(None)` means the row does not exist;
/// errors are reserved for the store itself failing.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_backup_by_id(&self, id: i64) -> Result<Option<Backup>>;

    async fn find_backups(&self, find: &BackupFind) -> Result<Vec<Backup>>;

    async fn get_database(&self, find: &DatabaseFind) -> Result<Option<Database>>;

    async fn patch_database(&self, patch: &DatabasePatch) -> Result<Database>;

    async fn get_issue_by_pipeline_id(&self, pipeline_id: i64) -> Result<Option<Issue>>;

    async fn get_task_by_id(&self, id: i64) -> Result<Option<Task>>;

    /// Refreshes the cached schema metadata of `database`.
    async fn sync_database_schema(&self, database: &Database) -> Result<()>;
}
