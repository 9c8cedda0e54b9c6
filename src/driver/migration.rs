use crate::api::WorkflowType;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationType {
    Baseline,
    Migrate,
    /// The database forked from a backup instead of continuing a prior timeline.
    Branch,
    Data,
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationType::Baseline => "BASELINE",
            MigrationType::Migrate => "MIGRATE",
            MigrationType::Branch => "BRANCH",
            MigrationType::Data => "DATA",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationSource {
    Ui,
    Vcs,
    Libraries,
}

impl From<WorkflowType> for MigrationSource {
    fn from(workflow: WorkflowType) -> Self {
        match workflow {
            WorkflowType::Ui => MigrationSource::Ui,
            WorkflowType::Vcs => MigrationSource::Vcs,
        }
    }
}

/// One migration history record, handed to [`super::Driver::execute_migration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationInfo {
    pub release_version: String,
    pub version: String,
    pub namespace: String,
    pub database: String,
    pub environment: String,
    pub source: MigrationSource,
    #[serde(rename = "type")]
    pub migration_type: MigrationType,
    pub description: String,
    pub creator: String,
    /// Originating issue id, empty when the work has no issue.
    pub issue_id: String,
}

/// Version token used when a migration carries no explicit version:
/// the current UTC time as `YYYYMMDDHHMMSS`.
pub fn default_migration_version() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}
