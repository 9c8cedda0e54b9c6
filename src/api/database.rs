use serde::{Deserialize, Serialize};
use std::fmt;

/// Principal id used for control-plane writes not attributable to a user.
pub const SYSTEM_BOT_ID: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Engine {
    Mysql,
    Tidb,
    Postgres,
    Clickhouse,
    Snowflake,
    Sqlite,
}

impl Engine {
    /// Engines whose drivers can serve binlog segments for point-in-time recovery.
    pub fn supports_binlog(self) -> bool {
        matches!(self, Engine::Mysql)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Engine::Mysql => "MYSQL",
            Engine::Tidb => "TIDB",
            Engine::Postgres => "POSTGRES",
            Engine::Clickhouse => "CLICKHOUSE",
            Engine::Snowflake => "SNOWFLAKE",
            Engine::Sqlite => "SQLITE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: i64,
    pub name: String,
    pub engine: Engine,
    /// Environment name, e.g. "Prod".
    pub environment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowType {
    #[default]
    Ui,
    Vcs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub workflow_type: WorkflowType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub id: i64,
    pub name: String,
    pub instance: Instance,
    pub project: Project,
    /// Provenance edge to the backup this database was restored from.
    #[serde(default)]
    pub source_backup_id: Option<i64>,
}

impl Database {
    pub fn instance_id(&self) -> i64 {
        self.instance.id
    }
}

/// Filter for [`crate::store::Store::get_database`].
#[derive(Debug, Clone, Default)]
pub struct DatabaseFind {
    pub id: Option<i64>,
    pub instance_id: Option<i64>,
    pub name: Option<String>,
}

impl DatabaseFind {
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_name(instance_id: i64, name: impl Into<String>) -> Self {
        Self {
            instance_id: Some(instance_id),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, database: &Database) -> bool {
        self.id.is_none_or(|id| database.id == id)
            && self.instance_id.is_none_or(|id| database.instance.id == id)
            && self.name.as_deref().is_none_or(|name| database.name == name)
    }
}

impl fmt::Display for DatabaseFind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{id:{:?}, instanceId:{:?}, name:{:?}}}",
            self.id, self.instance_id, self.name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePatch {
    pub id: i64,
    pub updater_id: i64,
    pub source_backup_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: i64,
    pub name: String,
    pub pipeline_id: i64,
    /// Unix seconds.
    pub created_ts: i64,
}
