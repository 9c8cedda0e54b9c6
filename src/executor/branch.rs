use super::ExecutionContext;
use crate::api::{Instance, Issue, Project};
use crate::core::Result;
use crate::driver::{Driver, MigrationInfo, MigrationType, default_migration_version};
use tracing::{Level, event};

/// Where a branch entry is recorded and what it says.
pub(crate) struct BranchEntry<'a> {
    pub instance: &'a Instance,
    pub project: &'a Project,
    pub database_name: &'a str,
    pub description: String,
    pub creator: &'a str,
    pub issue: Option<&'a Issue>,
}

/// Adds one BRANCH migration history record to the target database.
///
/// Prior history of the source is not copied: restores are used to spin up
/// many short-lived databases and copying would make each one expensive.
/// Returns the history id and version.
pub(crate) async fn create_branch_migration_history(
    ctx: &ExecutionContext<'_>,
    entry: BranchEntry<'_>,
) -> Result<(i64, String)> {
    let info = MigrationInfo {
        release_version: ctx.profile.release_version.clone(),
        version: default_migration_version(),
        namespace: entry.database_name.to_string(),
        database: entry.database_name.to_string(),
        environment: entry.instance.environment.clone(),
        source: entry.project.workflow_type.into(),
        migration_type: MigrationType::Branch,
        description: entry.description,
        creator: entry.creator.to_string(),
        issue_id: entry.issue.map(|issue| issue.id.to_string()).unwrap_or_default(),
    };

    let mut driver = ctx
        .drivers
        .admin_driver(entry.instance, entry.database_name)
        .await?;
    let result = driver
        .execute_migration(&info, "")
        .await
        .map_err(|err| err.context("failed to create migration history"));
    close_driver(driver, entry.instance).await;

    let (migration_id, _) = result?;
    event!(
        Level::DEBUG,
        database = %entry.database_name,
        migration_id,
        version = %info.version,
        "branch migration history created"
    );
    Ok((migration_id, info.version))
}

/// Releases a driver; a failing close is logged, never propagated.
pub(crate) async fn close_driver(mut driver: Box<dyn Driver>, instance: &Instance) {
    if let Err(err) = driver.close().await {
        event!(Level::WARN, instance = %instance.name, error = %err, "failed to close driver");
    }
}
