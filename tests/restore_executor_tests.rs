mod common;

use common::*;
use restorekit::driver::{MigrationSource, MigrationType};
use restorekit::{
    BackupStatus, BackupStorageBackend, BinlogInfo, DatabaseFind, DatabaseRestoreTaskExecutor,
    Engine, ErrorKind, Progress, Store, TaskExecutor, TaskType,
};
use serde_json::json;

struct Fixture {
    harness: Harness,
    task: restorekit::Task,
}

/// Source database `db1` (id 1) with backup 7, target `db1_copy` (id 2), same instance.
async fn fixture() -> Fixture {
    let harness = Harness::new(Engine::Mysql);
    let prod = instance(1, "prod", Engine::Mysql);
    let source = database(1, &prod, "db1");
    let target = database(2, &prod, "db1_copy");

    let path = harness.write_dump(
        "db1.sql",
        &["CREATE TABLE t (id INT);", "INSERT INTO t VALUES (1),(2);"],
    );
    harness.store.insert_database(source).await;
    harness.store.insert_database(target).await;
    harness
        .store
        .insert_backup(backup(7, 1, 100, &path, Some(BinlogInfo::new("bin.000001", 4))))
        .await;
    harness.store.insert_issue(issue(10)).await;

    let task = task(
        42,
        TaskType::DatabaseRestore,
        &prod,
        None,
        json!({"backupId": 7, "databaseName": "db1_copy"}),
    );
    Fixture { harness, task }
}

#[tokio::test]
async fn restore_streams_dump_and_sets_lineage() {
    let Fixture { harness, task } = fixture().await;
    let executor = DatabaseRestoreTaskExecutor::new();

    let outcome = executor.run_once(&harness.ctx(), &task).await;
    assert!(outcome.terminated);
    let payload = outcome.result.unwrap();
    assert_eq!(payload.detail, "Restored database \"db1_copy\" from backup \"backup-7\"");
    assert_eq!(payload.migration_id, Some(1));

    let target = harness
        .store
        .get_database(&DatabaseFind::by_id(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(target.source_backup_id, Some(7));

    let state = harness.drivers.state();
    assert_eq!(
        state.restores,
        vec![(
            "db1_copy".to_string(),
            vec![
                b"CREATE TABLE t (id INT);".to_vec(),
                b"INSERT INTO t VALUES (1),(2);".to_vec()
            ]
        )]
    );
    assert_eq!(state.opened, state.closed);
    assert_eq!(state.migrations.len(), 1);

    let (scope, info) = &state.migrations[0];
    assert_eq!(scope, "db1_copy");
    assert_eq!(info.migration_type, MigrationType::Branch);
    assert_eq!(info.database, "db1_copy");
    assert_eq!(info.source, MigrationSource::Ui);
    assert_eq!(info.release_version, "2.5.0");
    assert_eq!(info.issue_id, "501");
    assert_eq!(info.creator, "dba@example.com");
    assert_eq!(info.description, "Restored from backup \"backup-7\" of database \"db1\".");
    assert_eq!(Some(info.version.clone()), payload.version);
}

#[tokio::test]
async fn restore_is_not_idempotent() {
    let Fixture { harness, task } = fixture().await;

    for _ in 0..2 {
        let executor = DatabaseRestoreTaskExecutor::new();
        let outcome = executor.run_once(&harness.ctx(), &task).await;
        assert!(outcome.result.is_ok());
    }

    let state = harness.drivers.state();
    assert_eq!(state.restores.len(), 2);
    let branches = state
        .migrations
        .iter()
        .filter(|(_, info)| info.migration_type == MigrationType::Branch)
        .count();
    assert_eq!(branches, 2);
}

#[tokio::test]
async fn restore_across_instances_names_source_instance() {
    let Fixture { harness, .. } = fixture().await;
    let staging = instance(2, "staging", Engine::Mysql);
    harness.store.insert_database(database(3, &staging, "db1")).await;
    let task = task(
        43,
        TaskType::DatabaseRestore,
        &staging,
        None,
        json!({"backupId": 7, "databaseName": "db1"}),
    );

    let outcome = DatabaseRestoreTaskExecutor::new().run_once(&harness.ctx(), &task).await;
    assert!(outcome.result.is_ok());

    let state = harness.drivers.state();
    assert_eq!(
        state.migrations[0].1.description,
        "Restored from backup \"backup-7\" of database \"db1\" in instance \"prod\"."
    );
    let restored = harness.store.get_database(&DatabaseFind::by_id(3)).await.unwrap().unwrap();
    assert_eq!(restored.source_backup_id, Some(7));
}

#[tokio::test]
async fn restore_accepts_absolute_dump_path_and_missing_issue() {
    let harness = Harness::new(Engine::Postgres);
    let dumps = tempfile::tempdir().unwrap();
    let dump_path = dumps.path().join("absolute.sql");
    std::fs::write(&dump_path, "SELECT 1;\r\n").unwrap();

    let pg = instance(1, "pg", Engine::Postgres);
    harness.store.insert_database(database(1, &pg, "app")).await;
    harness
        .store
        .insert_backup(backup(9, 1, 100, dump_path.to_str().unwrap(), None))
        .await;
    let task = task(1, TaskType::DatabaseRestore, &pg, None, json!({"backupId": 9, "databaseName": "app"}));

    let outcome = DatabaseRestoreTaskExecutor::new().run_once(&harness.ctx(), &task).await;
    assert!(outcome.result.is_ok());

    let state = harness.drivers.state();
    assert_eq!(state.restores[0].1, vec![b"SELECT 1;".to_vec()]);
    assert_eq!(state.migrations[0].1.issue_id, "");
}

#[tokio::test]
async fn restore_passes_latin1_dump_bytes_through() {
    let harness = Harness::new(Engine::Mysql);
    let dumps = tempfile::tempdir().unwrap();
    let dump_path = dumps.path().join("latin1.sql");
    std::fs::write(&dump_path, b"INSERT INTO t VALUES ('caf\xe9');\nINSERT INTO b VALUES (_binary '\xff\x00');\n").unwrap();

    let prod = instance(1, "prod", Engine::Mysql);
    harness.store.insert_database(database(1, &prod, "shop")).await;
    harness
        .store
        .insert_backup(backup(11, 1, 100, dump_path.to_str().unwrap(), None))
        .await;
    let task = task(1, TaskType::DatabaseRestore, &prod, None, json!({"backupId": 11, "databaseName": "shop"}));

    let outcome = DatabaseRestoreTaskExecutor::new().run_once(&harness.ctx(), &task).await;
    assert!(outcome.result.is_ok());

    let state = harness.drivers.state();
    assert_eq!(
        state.restores[0].1,
        vec![
            b"INSERT INTO t VALUES ('caf\xe9');".to_vec(),
            b"INSERT INTO b VALUES (_binary '\xff\x00');".to_vec()
        ]
    );
}

#[tokio::test]
async fn restore_missing_rows_are_not_found() {
    let Fixture { harness, task } = fixture().await;
    let prod = task.instance.clone();

    let cases = vec![
        json!({"backupId": 99, "databaseName": "db1_copy"}),
        json!({"backupId": 7, "databaseName": "missing"}),
    ];
    for payload in cases {
        let task = common::task(44, TaskType::DatabaseRestore, &prod, None, payload);
        let executor = DatabaseRestoreTaskExecutor::new();
        let outcome = executor.run_once(&harness.ctx(), &task).await;
        assert!(outcome.terminated);
        assert_eq!(outcome.result.unwrap_err().kind(), ErrorKind::NotFound);
        assert!(executor.is_completed());
    }

    harness
        .store
        .insert_backup(backup(8, 77, 100, "orphan.sql", None))
        .await;
    let task = common::task(
        45,
        TaskType::DatabaseRestore,
        &prod,
        None,
        json!({"backupId": 8, "databaseName": "db1_copy"}),
    );
    let err = DatabaseRestoreTaskExecutor::new()
        .run_once(&harness.ctx(), &task)
        .await
        .result
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("77"));

    assert_eq!(harness.drivers.state().opened, 0);
}

#[tokio::test]
async fn restore_rejects_malformed_payload_and_unrestorable_backups() {
    let Fixture { harness, task } = fixture().await;
    let prod = task.instance.clone();

    let malformed = common::task(46, TaskType::DatabaseRestore, &prod, None, json!({"backup": "seven"}));
    let err = DatabaseRestoreTaskExecutor::new()
        .run_once(&harness.ctx(), &malformed)
        .await
        .result
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let mut failed = backup(20, 1, 100, "db1.sql", None);
    failed.status = BackupStatus::Failed;
    harness.store.insert_backup(failed).await;
    let mut remote = backup(21, 1, 100, "db1.sql", None);
    remote.storage_backend = BackupStorageBackend::S3;
    harness.store.insert_backup(remote).await;

    for backup_id in [20, 21] {
        let task = common::task(
            47,
            TaskType::DatabaseRestore,
            &prod,
            None,
            json!({"backupId": backup_id, "databaseName": "db1_copy"}),
        );
        let err = DatabaseRestoreTaskExecutor::new()
            .run_once(&harness.ctx(), &task)
            .await
            .result
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}

#[tokio::test]
async fn restore_failure_closes_driver_and_skips_lineage() {
    let Fixture { harness, task } = fixture().await;
    harness.drivers.state().fail_restore = true;

    let executor = DatabaseRestoreTaskExecutor::new();
    let outcome = executor.run_once(&harness.ctx(), &task).await;
    assert!(outcome.terminated);
    let err = outcome.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.is_retryable());
    assert!(executor.is_completed());

    {
        let state = harness.drivers.state();
        assert_eq!(state.opened, 1);
        assert_eq!(state.closed, 1);
        assert!(state.migrations.is_empty());
    }
    let target = harness.store.get_database(&DatabaseFind::by_id(2)).await.unwrap().unwrap();
    assert_eq!(target.source_backup_id, None);
}

#[tokio::test]
async fn restore_missing_dump_file_is_io() {
    let Fixture { harness, task } = fixture().await;
    std::fs::remove_file(harness.data_dir().join("db1.sql")).unwrap();

    let err = DatabaseRestoreTaskExecutor::new()
        .run_once(&harness.ctx(), &task)
        .await
        .result
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    let state = harness.drivers.state();
    assert_eq!(state.opened, state.closed);
}

#[tokio::test]
async fn restore_migration_failure_is_fatal() {
    let Fixture { harness, task } = fixture().await;
    harness.drivers.state().fail_migration = true;

    let err = DatabaseRestoreTaskExecutor::new()
        .run_once(&harness.ctx(), &task)
        .await
        .result
        .unwrap_err();
    assert!(err.to_string().contains("failed to create migration history"));

    let state = harness.drivers.state();
    assert_eq!(state.restores.len(), 1);
    assert_eq!(state.opened, 2);
    assert_eq!(state.closed, 2);
}

#[tokio::test]
async fn restore_swallows_schema_sync_failure() {
    let Fixture { harness, task } = fixture().await;
    harness.store.fail_schema_sync(true);

    let outcome = DatabaseRestoreTaskExecutor::new().run_once(&harness.ctx(), &task).await;
    assert!(outcome.result.is_ok());
    assert_eq!(harness.store.schema_sync_count(), 1);
}

#[tokio::test]
async fn completion_flag_flips_after_first_attempt() {
    let Fixture { harness, task } = fixture().await;
    let executor = DatabaseRestoreTaskExecutor::new();
    assert!(!executor.is_completed());
    assert_eq!(executor.progress(), Progress::default());

    harness.drivers.hold_next_open();
    let ctx = harness.ctx();
    let (outcome, observed_while_running) = tokio::join!(executor.run_once(&ctx, &task), async {
        tokio::task::yield_now().await;
        let observed = executor.is_completed();
        harness.drivers.release();
        observed
    });

    assert!(!observed_while_running);
    assert!(outcome.result.is_ok());
    assert!(executor.is_completed());
    assert_eq!(executor.progress(), Progress { done: 1, total: 1 });
}
