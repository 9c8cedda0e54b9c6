use super::Store;
use crate::api::{Backup, BackupFind, Database, DatabaseFind, DatabasePatch, Issue, Task};
use crate::core::{RestoreError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory [`Store`], one lock per table.
///
/// Backs the operator tooling and the test suites.
#[derive(Default)]
pub struct MemoryStore {
    backups: RwLock<BTreeMap<i64, Backup>>,
    databases: RwLock<BTreeMap<i64, Database>>,
    issues: RwLock<BTreeMap<i64, Issue>>,
    tasks: RwLock<BTreeMap<i64, Task>>,
    fail_schema_sync: AtomicBool,
    schema_syncs: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_backup(&self, backup: Backup) {
        self.backups.write().await.insert(backup.id, backup);
    }

    pub async fn insert_database(&self, database: Database) {
        self.databases.write().await.insert(database.id, database);
    }

    pub async fn insert_issue(&self, issue: Issue) {
        self.issues.write().await.insert(issue.id, issue);
    }

    pub async fn insert_task(&self, task: Task) {
        self.tasks.write().await.insert(task.id, task);
    }

    /// Makes every subsequent schema sync fail.
    pub fn fail_schema_sync(&self, fail: bool) {
        self.fail_schema_sync.store(fail, Ordering::SeqCst);
    }

    /// Number of schema sync calls, failed ones included.
    pub fn schema_sync_count(&self) -> u64 {
        self.schema_syncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_backup_by_id(&self, id: i64) -> Result<Option<Backup>> {
        Ok(self.backups.read().await.get(&id).cloned())
    }

    async fn find_backups(&self, find: &BackupFind) -> Result<Vec<Backup>> {
        Ok(self
            .backups
            .read()
            .await
            .values()
            .filter(|backup| find.matches(backup))
            .cloned()
            .collect())
    }

    async fn get_database(&self, find: &DatabaseFind) -> Result<Option<Database>> {
        let databases = self.databases.read().await;
        let mut matched = databases.values().filter(|db| find.matches(db));
        let first = matched.next().cloned();
        if matched.next().is_some() {
            return Err(RestoreError::Internal(format!(
                "found multiple databases matching {}",
                find
            )));
        }
        Ok(first)
    }

    async fn patch_database(&self, patch: &DatabasePatch) -> Result<Database> {
        let mut databases = self.databases.write().await;
        let database = databases.get_mut(&patch.id).ok_or_else(|| {
            RestoreError::NotFound(format!("database ID not found: {}", patch.id))
        })?;
        if let Some(backup_id) = patch.source_backup_id {
            database.source_backup_id = Some(backup_id);
        }
        Ok(database.clone())
    }

    async fn get_issue_by_pipeline_id(&self, pipeline_id: i64) -> Result<Option<Issue>> {
        Ok(self
            .issues
            .read()
            .await
            .values()
            .find(|issue| issue.pipeline_id == pipeline_id)
            .cloned())
    }

    async fn get_task_by_id(&self, id: i64) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn sync_database_schema(&self, database: &Database) -> Result<()> {
        self.schema_syncs.fetch_add(1, Ordering::SeqCst);
        if self.fail_schema_sync.load(Ordering::SeqCst) {
            return Err(RestoreError::Io(format!(
                "failed to sync schema of database {:?}",
                database.name
            )));
        }
        Ok(())
    }
}
