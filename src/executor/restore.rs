use super::branch::{BranchEntry, close_driver, create_branch_migration_history};
use super::executor::{CompletionFlag, TaskExecutor, TaskRunOutcome};
use super::ExecutionContext;
use crate::api::{
    Backup, BackupStorageBackend, Database, DatabaseFind, DatabasePatch, DatabaseRestorePayload,
    Progress, SYSTEM_BOT_ID, Task, TaskRunResultPayload,
};
use crate::core::{RestoreError, Result};
use crate::driver::DumpStream;
use async_trait::async_trait;
use tracing::{Instrument, Level, event, info_span};

/// Restores a full snapshot backup into an existing database.
///
/// Each attempt redoes the whole restore and adds a new branch history entry;
/// it is not idempotent.
#[derive(Debug, Default)]
pub struct DatabaseRestoreTaskExecutor {
    completed: CompletionFlag,
}

impl DatabaseRestoreTaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, ctx: &ExecutionContext<'_>, task: &Task) -> Result<TaskRunResultPayload> {
        let payload: DatabaseRestorePayload = task.decode_payload()?;

        let backup = ctx
            .store
            .get_backup_by_id(payload.backup_id)
            .await
            .map_err(|err| err.context(format!("failed to find backup with ID {}", payload.backup_id)))?
            .ok_or_else(|| {
                RestoreError::NotFound(format!("backup with ID {} not found", payload.backup_id))
            })?;
        if !backup.is_restorable() {
            return Err(RestoreError::Invalid(format!(
                "backup {:?} has status {:?}, only DONE backups can be restored",
                backup.name, backup.status
            )));
        }
        if backup.storage_backend != BackupStorageBackend::Local {
            return Err(RestoreError::Invalid(format!(
                "backup {:?} is stored in {:?}, only LOCAL backups can be restored",
                backup.name, backup.storage_backend
            )));
        }

        let source_database = ctx
            .store
            .get_database(&DatabaseFind::by_id(backup.database_id))
            .await
            .map_err(|err| err.context("failed to find database for the backup"))?
            .ok_or_else(|| {
                RestoreError::NotFound(format!("source database ID not found {}", backup.database_id))
            })?;

        let target_database = ctx
            .store
            .get_database(&DatabaseFind::by_name(task.instance_id(), &payload.database_name))
            .await
            .map_err(|err| {
                err.context(format!(
                    "failed to find target database {:?} in instance {:?}",
                    payload.database_name, task.instance.name
                ))
            })?
            .ok_or_else(|| {
                RestoreError::NotFound(format!(
                    "target database {:?} not found in instance {:?}",
                    payload.database_name, task.instance.name
                ))
            })?;

        event!(
            Level::DEBUG,
            source_instance = %source_database.instance.name,
            source_database = %source_database.name,
            target_instance = %target_database.instance.name,
            target_database = %target_database.name,
            backup = %backup.name,
            "start database restore from backup"
        );

        self.restore_database(ctx, &target_database, &backup).await?;

        // The data restore touched the customer instance while the steps below
        // touch our own metadata; there is no transaction spanning both, so a
        // crash here leaves restored data without lineage.
        let issue = ctx
            .store
            .get_issue_by_pipeline_id(task.pipeline_id)
            .await
            .map_err(|err| {
                err.context(format!(
                    "failed to fetch containing issue when creating the migration history: {}",
                    task.name
                ))
            })?;
        let (migration_id, version) = create_branch_migration_history(
            ctx,
            BranchEntry {
                instance: &target_database.instance,
                project: &target_database.project,
                database_name: &target_database.name,
                description: branch_description(&backup, &source_database, &target_database),
                creator: &task.creator.name,
                issue: issue.as_ref(),
            },
        )
        .await?;

        ctx.store
            .patch_database(&DatabasePatch {
                id: target_database.id,
                updater_id: SYSTEM_BOT_ID,
                source_backup_id: Some(backup.id),
            })
            .await
            .map_err(|err| {
                err.context(format!(
                    "failed to patch database source with ID {} and backup ID {} after restore",
                    target_database.id, backup.id
                ))
            })?;

        if let Err(err) = ctx.store.sync_database_schema(&target_database).await {
            event!(
                Level::ERROR,
                instance = %target_database.instance.name,
                database = %target_database.name,
                error = %err,
                "failed to sync database schema"
            );
        }

        Ok(TaskRunResultPayload {
            detail: format!(
                "Restored database {:?} from backup {:?}",
                target_database.name, backup.name
            ),
            migration_id: Some(migration_id),
            version: Some(version),
        })
    }

    /// Streams the backup dump into the target database through a fresh admin driver.
    async fn restore_database(
        &self,
        ctx: &ExecutionContext<'_>,
        target: &Database,
        backup: &Backup,
    ) -> Result<()> {
        let mut driver = ctx.drivers.admin_driver(&target.instance, &target.name).await?;

        let result = async {
            let backup_path = ctx.profile.resolve_backup_path(&backup.path);
            let mut dump = DumpStream::open(&backup_path, ctx.profile.max_dump_line_bytes).await?;
            driver
                .restore(&mut dump)
                .await
                .map_err(|err| err.context("failed to restore backup"))?;
            event!(
                Level::INFO,
                path = %backup_path.display(),
                lines = dump.lines_read(),
                bytes = dump.bytes_read(),
                "backup dump restored"
            );
            Ok::<(), RestoreError>(())
        }
        .await;

        close_driver(driver, &target.instance).await;
        result
    }
}

fn branch_description(backup: &Backup, source: &Database, target: &Database) -> String {
    if source.instance_id() != target.instance_id() {
        format!(
            "Restored from backup {:?} of database {:?} in instance {:?}.",
            backup.name, source.name, source.instance.name
        )
    } else {
        format!(
            "Restored from backup {:?} of database {:?}.",
            backup.name, source.name
        )
    }
}

#[async_trait]
impl TaskExecutor for DatabaseRestoreTaskExecutor {
    fn name(&self) -> &'static str {
        "DatabaseRestoreTaskExecutor"
    }

    async fn run_once(&self, ctx: &ExecutionContext<'_>, task: &Task) -> TaskRunOutcome {
        let _done = self.completed.guard();
        let span = info_span!("task.database.restore", task_id = task.id, task = %task.name);

        let result = self.run(ctx, task).instrument(span.clone()).await;
        if let Err(err) = &result {
            span.in_scope(|| {
                event!(Level::ERROR, kind = %err.kind(), error = %err, "database restore failed")
            });
        }
        TaskRunOutcome::terminated(result)
    }

    fn is_completed(&self) -> bool {
        self.completed.is_set()
    }

    fn progress(&self) -> Progress {
        Progress::binary(self.is_completed())
    }
}
