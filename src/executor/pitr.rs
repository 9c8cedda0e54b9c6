use super::branch::{BranchEntry, close_driver, create_branch_migration_history};
use super::executor::{CompletionFlag, TaskExecutor, TaskRunOutcome};
use super::ExecutionContext;
use crate::api::{
    Backup, BackupFind, BackupStatus, Database, Issue, PitrRestorePayload, Progress, Task,
    TaskRunResultPayload,
};
use crate::binlog::BinlogCoordinator;
use crate::core::{RestoreError, Result};
use crate::driver::{Driver, DumpStream};
use async_trait::async_trait;
use chrono::DateTime;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// Longest database identifier the supported engines accept.
pub const MAX_DATABASE_NAME_LEN: usize = 64;

/// Recovers a database to a point in time into a new ephemeral database.
///
/// The newest qualifying backup is restored into a uniquely named database and
/// the mirrored binlog is replayed on top of it up to the target time. A failed
/// attempt leaves that database in place; a retry creates another one.
#[derive(Debug, Default)]
pub struct PitrRestoreTaskExecutor {
    completed: CompletionFlag,
}

/// What a successful recovery produced, before lineage is recorded.
struct Recovered {
    database_name: String,
    backup_name: String,
    events_applied: u64,
}

impl PitrRestoreTaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, ctx: &ExecutionContext<'_>, task: &Task) -> Result<TaskRunResultPayload> {
        let payload: PitrRestorePayload = task.decode_payload()?;
        let target_ts = payload.point_in_time_ts;

        let issue = ctx
            .store
            .get_issue_by_pipeline_id(task.pipeline_id)
            .await
            .map_err(|err| {
                err.context(format!("failed to fetch containing issue for task {:?}", task.name))
            })?
            .ok_or_else(|| {
                RestoreError::NotFound(format!(
                    "issue not found for pipeline {} of task {:?}",
                    task.pipeline_id, task.name
                ))
            })?;
        let database = task.database.as_ref().ok_or_else(|| {
            RestoreError::Invalid(format!("PITR task {:?} has no database", task.name))
        })?;

        let backups = ctx
            .store
            .find_backups(&BackupFind {
                database_id: Some(database.id),
                status: Some(BackupStatus::Done),
                ..Default::default()
            })
            .await
            .map_err(|err| {
                err.context(format!("failed to find backups for database {:?}", database.name))
            })?;
        event!(
            Level::DEBUG,
            database = %database.name,
            backups = %crate::api::BackupSummary(&backups),
            "candidate backups for PITR"
        );

        let coordinator = BinlogCoordinator::open(ctx.profile.binlog_dir(database.instance_id()))
            .await?
            .with_max_event_bytes(ctx.profile.max_binlog_event_bytes);

        let mut driver = ctx.drivers.admin_driver(&database.instance, "").await?;
        let recovered = self
            .recover(ctx, driver.as_mut(), &coordinator, database, &issue, &backups, target_ts)
            .await;
        close_driver(driver, &database.instance).await;
        let recovered = recovered?;

        let (migration_id, version) = create_branch_migration_history(
            ctx,
            BranchEntry {
                instance: &database.instance,
                project: &database.project,
                database_name: &recovered.database_name,
                description: format!(
                    "Created PITR database {:?} for database {:?} at {} from backup {:?} (issue #{} created at {}).",
                    recovered.database_name,
                    database.name,
                    format_unix_ts(target_ts),
                    recovered.backup_name,
                    issue.id,
                    format_unix_ts(issue.created_ts)
                ),
                creator: &task.creator.name,
                issue: Some(&issue),
            },
        )
        .await?;

        event!(
            Level::INFO,
            database = %database.name,
            pitr_database = %recovered.database_name,
            backup = %recovered.backup_name,
            events = recovered.events_applied,
            target = %format_unix_ts(target_ts),
            "PITR database created"
        );

        Ok(TaskRunResultPayload {
            detail: format!(
                "Created PITR database {:?} for target database {:?}",
                recovered.database_name, database.name
            ),
            migration_id: Some(migration_id),
            version: Some(version),
        })
    }

    /// Mirror refresh, backup selection, dump restore and binlog replay, all
    /// through one admin connection that the caller closes.
    #[allow(clippy::too_many_arguments)]
    async fn recover(
        &self,
        ctx: &ExecutionContext<'_>,
        driver: &mut dyn Driver,
        coordinator: &BinlogCoordinator,
        database: &Database,
        issue: &Issue,
        backups: &[Backup],
        target_ts: i64,
    ) -> Result<Recovered> {
        let engine = driver.engine();
        let binlog = driver.binlog_driver().ok_or_else(|| {
            RestoreError::Internal(format!("{} driver does not provide binlog access", engine))
        })?;

        coordinator
            .fetch_all(binlog, true)
            .await
            .map_err(|err| err.context("failed to fetch binlog files"))?;

        let backup = select_backup(coordinator, backups, target_ts).await?;
        let start = backup.binlog_info().cloned().ok_or_else(|| {
            RestoreError::Internal(format!("selected backup {:?} has no binlog coordinate", backup.name))
        })?;
        event!(
            Level::DEBUG,
            backup = %backup.summary(),
            target = %format_unix_ts(target_ts),
            "backup selected for PITR"
        );

        let pitr_database = pitr_database_name(&database.name, issue.created_ts);
        let backup_path = ctx.profile.resolve_backup_path(&backup.path);
        let mut dump = DumpStream::open(&backup_path, ctx.profile.max_dump_line_bytes).await?;

        let applied = async {
            binlog
                .restore_into(&pitr_database, &mut dump)
                .await
                .map_err(|err| err.context(format!("failed to restore backup {:?}", backup.name)))?;

            let mut replay = coordinator.replay_from(&start, target_ts).await?;
            while let Some(binlog_event) = replay.next_event().await? {
                binlog
                    .apply_binlog_event(&pitr_database, &binlog_event)
                    .await
                    .map_err(|err| {
                        err.context(format!("failed to apply binlog event at {}", binlog_event.coordinate))
                    })?;
            }
            Ok::<u64, RestoreError>(replay.events_read())
        }
        .await;

        match applied {
            Ok(events_applied) => Ok(Recovered {
                database_name: pitr_database,
                backup_name: backup.name.clone(),
                events_applied,
            }),
            Err(err) => {
                event!(
                    Level::WARN,
                    pitr_database = %pitr_database,
                    error = %err,
                    "PITR failed, partially restored database left in place"
                );
                Err(err)
            }
        }
    }
}

/// Latest backup usable as the base for recovering to `target_ts`.
///
/// A candidate must be `DONE`, captured at or before `target_ts` and carry a
/// binlog coordinate that the local mirror contains. Equal capture times are
/// broken by the higher id.
pub async fn select_backup<'a>(
    coordinator: &BinlogCoordinator,
    backups: &'a [Backup],
    target_ts: i64,
) -> Result<&'a Backup> {
    let mut selected: Option<&Backup> = None;
    for backup in backups {
        if backup.status != BackupStatus::Done || backup.created_ts > target_ts {
            continue;
        }
        let Some(info) = backup.binlog_info() else {
            continue;
        };
        if selected.is_some_and(|best| (best.created_ts, best.id) >= (backup.created_ts, backup.id)) {
            continue;
        }
        if !coordinator.contains(info).await? {
            event!(
                Level::DEBUG,
                backup = %backup.name,
                coordinate = %info,
                "backup coordinate not in binlog mirror"
            );
            continue;
        }
        selected = Some(backup);
    }

    selected.ok_or_else(|| {
        RestoreError::DomainPolicy(format!(
            "failed to find a backup with a binlog coordinate before or equal to {}",
            format_unix_ts(target_ts)
        ))
    })
}

/// `<db>_pitr_<issueCreatedTs>_<8 hex>`, with `<db>` shortened so the name
/// fits [`MAX_DATABASE_NAME_LEN`].
pub fn pitr_database_name(database: &str, issue_created_ts: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    pitr_database_name_with_suffix(database, issue_created_ts, &suffix[..8])
}

fn pitr_database_name_with_suffix(database: &str, issue_created_ts: i64, suffix: &str) -> String {
    let tail = format!("_pitr_{}_{}", issue_created_ts, suffix);
    let mut end = MAX_DATABASE_NAME_LEN.saturating_sub(tail.len()).min(database.len());
    while !database.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &database[..end], tail)
}

/// Unix seconds rendered as `%Y-%m-%d %H:%M:%S UTC`.
pub fn format_unix_ts(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("unix time {}", ts),
    }
}

#[async_trait]
impl TaskExecutor for PitrRestoreTaskExecutor {
    fn name(&self) -> &'static str {
        "PitrRestoreTaskExecutor"
    }

    async fn run_once(&self, ctx: &ExecutionContext<'_>, task: &Task) -> TaskRunOutcome {
        let _done = self.completed.guard();
        let span = info_span!("task.database.pitr", task_id = task.id, task = %task.name);

        let result = self.run(ctx, task).instrument(span.clone()).await;
        if let Err(err) = &result {
            span.in_scope(|| event!(Level::ERROR, kind = %err.kind(), error = %err, "PITR failed"));
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
