//! Capability interface of the per-engine database drivers.
//!
//! The executors never talk to an engine directly. They ask a
//! [`DriverProvider`] for a fresh administrative [`Driver`] scoped to one
//! instance/database, use it, and close it on every exit path.

pub mod dump;
pub mod migration;

pub use dump::DumpStream;
pub use migration::{MigrationInfo, MigrationSource, MigrationType, default_migration_version};

use crate::api::{Engine, Instance};
use crate::binlog::{BinlogEvent, RemoteSegment};
use crate::core::Result;
use async_trait::async_trait;

/// Privileged operations scoped to one instance (and optionally one database).
#[async_trait]
pub trait Driver: Send {
    fn engine(&self) -> Engine;

    async fn close(&mut self) -> Result<()>;

    /// Replays a logical dump into the scoped database.
    async fn restore(&mut self, dump: &mut DumpStream) -> Result<()>;

    /// Records `info` in the migration history and runs `statement` (may be
    /// empty). Returns the new history id and the recorded version.
    async fn execute_migration(
        &mut self,
        info: &MigrationInfo,
        statement: &str,
    ) -> Result<(i64, String)>;

    /// Binlog extension, available only on engines that have one.
    fn binlog_driver(&mut self) -> Option<&mut dyn BinlogDriver> {
        None
    }
}

/// Binlog access for MySQL-family engines.
///
/// Segments are served in the mirror segment format of [`crate::binlog::segment`].
#[async_trait]
pub trait BinlogDriver: Send {
    async fn list_binlog_segments(&mut self) -> Result<Vec<RemoteSegment>>;

    /// Bytes of segment `name` starting at byte `from`. The tail segment may
    /// have grown since it was listed; everything available is returned.
    async fn read_binlog_segment(&mut self, name: &str, from: u64) -> Result<Vec<u8>>;

    /// Replays a dump into `database`, creating it.
    async fn restore_into(&mut self, database: &str, dump: &mut DumpStream) -> Result<()>;

    async fn apply_binlog_event(&mut self, database: &str, event: &BinlogEvent) -> Result<()>;
}

/// Opens administrative drivers. Connections are never pooled across attempts.
#[async_trait]
pub trait DriverProvider: Send + Sync {
    /// `database_name` may be empty for an instance-level connection.
    async fn admin_driver(
        &self,
        instance: &Instance,
        database_name: &str,
    ) -> Result<Box<dyn Driver>>;
}
