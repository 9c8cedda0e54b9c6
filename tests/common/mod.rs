#![allow(dead_code)]

use async_trait::async_trait;
use restorekit::binlog::{BinlogEventRecord, RemoteSegment, encode_segment};
use restorekit::{
    Backup, BackupPayload, BackupStatus, BackupStorageBackend, BackupType, BinlogDriver,
    BinlogEvent, BinlogInfo, Database, Driver, DriverProvider, DumpStream, Engine,
    ExecutionContext, Instance, Issue, MemoryStore, MigrationInfo, Principal, Profile, Project,
    RestoreError, Result, Task, TaskType, WorkflowType,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const ISSUE_CREATED_TS: i64 = 1_700_000_000;

/// Everything the fake drivers did, shared by every driver a provider hands out.
#[derive(Default)]
pub struct FakeState {
    pub opened: u64,
    pub closed: u64,
    /// (database, raw dump lines) per restore call.
    pub restores: Vec<(String, Vec<Vec<u8>>)>,
    /// (database, event) per applied binlog event.
    pub applied: Vec<(String, BinlogEvent)>,
    /// (driver scope, info) per migration history entry.
    pub migrations: Vec<(String, MigrationInfo)>,
    /// Source binlog segments served by the binlog extension.
    pub segments: BTreeMap<String, Vec<u8>>,
    pub fail_restore: bool,
    pub fail_apply: bool,
    pub fail_migration: bool,
}

#[derive(Clone)]
pub struct FakeProvider {
    pub state: Arc<Mutex<FakeState>>,
    pub engine: Engine,
    hold: Arc<AtomicBool>,
    gate: Arc<Notify>,
}

impl FakeProvider {
    pub fn new(engine: Engine) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            engine,
            hold: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(Notify::new()),
        }
    }

    /// Makes the next `admin_driver` call wait for [`FakeProvider::release`].
    pub fn hold_next_open(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// A driver used directly as a binlog source, outside any executor.
    pub fn binlog_source(&self) -> FakeDriver {
        FakeDriver {
            state: self.state.clone(),
            engine: self.engine,
            scope: String::new(),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn put_segment(&self, name: &str, records: &[BinlogEventRecord]) {
        let bytes = encode_segment(records).unwrap();
        self.state().segments.insert(name.to_string(), bytes);
    }

    pub fn append_to_segment(&self, name: &str, records: &[BinlogEventRecord]) {
        let mut state = self.state();
        let segment = state.segments.get_mut(name).unwrap();
        for record in records {
            segment.extend(record.encode().unwrap());
        }
    }
}

/// Binlog source frozen at the moment it was taken.
///
/// With a gate, each segment read first announces itself on `reading` and then
/// waits for the gate, which models a refresher that listed the source before
/// a newer refresher ran.
pub struct SnapshotSource {
    segments: BTreeMap<String, Vec<u8>>,
    gate: Option<(tokio::sync::watch::Sender<bool>, Arc<Notify>)>,
}

impl SnapshotSource {
    pub fn of(provider: &FakeProvider) -> Self {
        Self {
            segments: provider.state().segments.clone(),
            gate: None,
        }
    }

    pub fn gated(provider: &FakeProvider, reading: tokio::sync::watch::Sender<bool>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some((reading, gate)),
            ..Self::of(provider)
        }
    }
}

#[async_trait]
impl BinlogDriver for SnapshotSource {
    async fn list_binlog_segments(&mut self) -> Result<Vec<RemoteSegment>> {
        Ok(self
            .segments
            .iter()
            .map(|(name, bytes)| RemoteSegment::new(name.clone(), bytes.len() as u64))
            .collect())
    }

    async fn read_binlog_segment(&mut self, name: &str, from: u64) -> Result<Vec<u8>> {
        let bytes = self
            .segments
            .get(name)
            .ok_or_else(|| RestoreError::NotFound(format!("segment {}", name)))?
            .get(from as usize..)
            .unwrap_or_default()
            .to_vec();
        if let Some((reading, gate)) = &self.gate {
            let _ = reading.send(true);
            gate.notified().await;
        }
        Ok(bytes)
    }

    async fn restore_into(&mut self, database: &str, _dump: &mut DumpStream) -> Result<()> {
        Err(RestoreError::Invalid(format!("snapshot source cannot restore {}", database)))
    }

    async fn apply_binlog_event(&mut self, database: &str, _event: &BinlogEvent) -> Result<()> {
        Err(RestoreError::Invalid(format!("snapshot source cannot apply events to {}", database)))
    }
}

#[async_trait]
impl DriverProvider for FakeProvider {
    async fn admin_driver(&self, _instance: &Instance, database_name: &str) -> Result<Box<dyn Driver>> {
        if self.hold.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.state().opened += 1;
        Ok(Box::new(FakeDriver {
            state: self.state.clone(),
            engine: self.engine,
            scope: database_name.to_string(),
        }))
    }
}

pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
    engine: Engine,
    scope: String,
}

impl FakeDriver {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

async fn drain(dump: &mut DumpStream) -> Result<Vec<Vec<u8>>> {
    let mut lines = Vec::new();
    while let Some(line) = dump.next_line().await? {
        lines.push(line);
    }
    Ok(lines)
}

#[async_trait]
impl Driver for FakeDriver {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn close(&mut self) -> Result<()> {
        self.state().closed += 1;
        Ok(())
    }

    async fn restore(&mut self, dump: &mut DumpStream) -> Result<()> {
        let lines = drain(dump).await?;
        let mut state = self.state();
        if state.fail_restore {
            return Err(RestoreError::Io("connection reset by peer".to_string()));
        }
        state.restores.push((self.scope.clone(), lines));
        Ok(())
    }

    async fn execute_migration(&mut self, info: &MigrationInfo, _statement: &str) -> Result<(i64, String)> {
        let mut state = self.state();
        if state.fail_migration {
            return Err(RestoreError::Io("migration history table is locked".to_string()));
        }
        state.migrations.push((self.scope.clone(), info.clone()));
        Ok((state.migrations.len() as i64, info.version.clone()))
    }

    fn binlog_driver(&mut self) -> Option<&mut dyn BinlogDriver> {
        if self.engine.supports_binlog() {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl BinlogDriver for FakeDriver {
    async fn list_binlog_segments(&mut self) -> Result<Vec<RemoteSegment>> {
        Ok(self
            .state()
            .segments
            .iter()
            .map(|(name, bytes)| RemoteSegment::new(name.clone(), bytes.len() as u64))
            .collect())
    }

    async fn read_binlog_segment(&mut self, name: &str, from: u64) -> Result<Vec<u8>> {
        let state = self.state();
        let bytes = state
            .segments
            .get(name)
            .ok_or_else(|| RestoreError::NotFound(format!("segment {}", name)))?;
        Ok(bytes.get(from as usize..).unwrap_or_default().to_vec())
    }

    async fn restore_into(&mut self, database: &str, dump: &mut DumpStream) -> Result<()> {
        let lines = drain(dump).await?;
        let mut state = self.state();
        if state.fail_restore {
            return Err(RestoreError::Io("connection reset by peer".to_string()));
        }
        state.restores.push((database.to_string(), lines));
        Ok(())
    }

    async fn apply_binlog_event(&mut self, database: &str, event: &BinlogEvent) -> Result<()> {
        let mut state = self.state();
        if state.fail_apply {
            return Err(RestoreError::Io(format!("failed to apply event at {}", event.coordinate)));
        }
        state.applied.push((database.to_string(), event.clone()));
        Ok(())
    }
}

/// Store, drivers and a temp data directory wired together.
pub struct Harness {
    pub dir: TempDir,
    pub store: MemoryStore,
    pub drivers: FakeProvider,
    pub profile: Profile,
}

impl Harness {
    pub fn new(engine: Engine) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(dir.path()).release_version("2.5.0");
        Self {
            dir,
            store: MemoryStore::new(),
            drivers: FakeProvider::new(engine),
            profile,
        }
    }

    pub fn ctx(&self) -> ExecutionContext<'_> {
        ExecutionContext::new(&self.store, &self.drivers, &self.profile)
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Writes a dump file under the data directory; returns its relative path.
    pub fn write_dump(&self, relative: &str, lines: &[&str]) -> String {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();
        relative.to_string()
    }
}

pub fn instance(id: i64, name: &str, engine: Engine) -> Instance {
    Instance {
        id,
        name: name.to_string(),
        engine,
        environment: "Prod".to_string(),
    }
}

pub fn project() -> Project {
    Project {
        id: 3001,
        name: "Employee".to_string(),
        workflow_type: WorkflowType::Ui,
    }
}

pub fn database(id: i64, instance: &Instance, name: &str) -> Database {
    Database {
        id,
        name: name.to_string(),
        instance: instance.clone(),
        project: project(),
        source_backup_id: None,
    }
}

pub fn backup(id: i64, database_id: i64, created_ts: i64, path: &str, coordinate: Option<BinlogInfo>) -> Backup {
    Backup {
        id,
        database_id,
        name: format!("backup-{}", id),
        status: BackupStatus::Done,
        backup_type: BackupType::Automatic,
        storage_backend: BackupStorageBackend::Local,
        created_ts,
        migration_history_version: "20240101000000".to_string(),
        path: path.to_string(),
        comment: String::new(),
        payload: coordinate.map(BackupPayload::mysql).unwrap_or_default(),
    }
}

pub fn issue(pipeline_id: i64) -> Issue {
    Issue {
        id: 501,
        name: "Restore employee".to_string(),
        pipeline_id,
        created_ts: ISSUE_CREATED_TS,
    }
}

pub fn task(
    id: i64,
    task_type: TaskType,
    instance: &Instance,
    database: Option<&Database>,
    payload: serde_json::Value,
) -> Task {
    Task {
        id,
        name: format!("task-{}", id),
        task_type,
        pipeline_id: 10,
        instance: instance.clone(),
        database: database.cloned(),
        creator: Principal {
            id: 101,
            name: "dba@example.com".to_string(),
        },
        payload: payload.to_string(),
    }
}

pub fn record(ts: i64, statement: &str) -> BinlogEventRecord {
    BinlogEventRecord::new(ts, statement)
}

/// Encoded length of `record`, for computing coordinates.
pub fn record_len(record: &BinlogEventRecord) -> u64 {
    record.encode().unwrap().len() as u64
}
