use std::sync::Arc;

use chrono::{Duration, Utc};
use hawthorn_core::models::ExecutionStub;
use hawthorn_core::{
    DatabaseConfig, DatabasesConfig, DbInstanceConfig, ExecutionStatus, LeaseOutcome,
    LeaseRepository, LeaseWindow,
};
use hawthorn_infrastructure::{ensure_schema, DatabasePool, DbLeaseRepository, DbManager};
use sqlx::SqlitePool;
use tempfile::TempDir;

struct TestDb {
    _dir: TempDir,
    pool: SqlitePool,
    repo: DbLeaseRepository,
}

async fn setup() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let dsn = format!("sqlite://{}/hawthorn.db?mode=rwc", dir.path().display());

    let mut databases = DatabasesConfig::default();
    databases.lists.insert(
        "main".to_string(),
        DatabaseConfig {
            primary: DbInstanceConfig {
                dsn: Some(dsn),
                max_open_conns: Some(4),
                ..Default::default()
            },
            ..Default::default()
        },
    );

    let manager = Arc::new(
        DbManager::initialize(&databases, std::time::Duration::from_secs(1))
            .await
            .unwrap(),
    );
    let server_db = manager.server_db().await.unwrap();
    ensure_schema(&server_db).await.unwrap();

    let DatabasePool::SQLite(pool) = server_db else {
        panic!("expected sqlite pool");
    };
    let repo = DbLeaseRepository::new(manager.server_instance().unwrap(), 1000);

    TestDb {
        _dir: dir,
        pool,
        repo,
    }
}

async fn insert_task(pool: &SqlitePool, name: &str, enabled: bool) -> i64 {
    sqlx::query(
        "INSERT INTO hawthorn_task (name, cron_expr, enabled, timeout, retry_count) VALUES (?1, ?2, ?3, 10, 0)",
    )
    .bind(name)
    .bind("*/5 * * * * *")
    .bind(enabled)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

#[tokio::test]
async fn test_list_enabled_tasks_skips_disabled() {
    let db = setup().await;
    let enabled = insert_task(&db.pool, "sync", true).await;
    insert_task(&db.pool, "archive", false).await;

    let tasks = db.repo.list_enabled_tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, enabled);
    assert_eq!(tasks[0].name, "sync");
    assert_eq!(tasks[0].timeout, 10);
    assert!(tasks[0].locked_at.is_none());
}

#[tokio::test]
async fn test_concurrent_acquire_only_one_wins() {
    let db = setup().await;
    let task_id = insert_task(&db.pool, "sync", true).await;

    let now = Utc::now();
    let first = LeaseWindow::starting_at(now, 10);
    let second = LeaseWindow::starting_at(now + Duration::milliseconds(3), 10);

    let (a, b) = tokio::join!(
        db.repo.acquire_lease(task_id, "node-a", &first),
        db.repo.acquire_lease(task_id, "node-b", &second),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let acquired = outcomes
        .iter()
        .filter(|outcome| **outcome == LeaseOutcome::Acquired)
        .count();
    assert_eq!(acquired, 1);
    assert!(outcomes.contains(&LeaseOutcome::Busy));
}

#[tokio::test]
async fn test_release_restores_lease_fields() {
    let db = setup().await;
    let task_id = insert_task(&db.pool, "sync", true).await;
    let window = LeaseWindow::starting_at(Utc::now(), 10);

    let outcome = db
        .repo
        .acquire_lease(task_id, "node-a", &window)
        .await
        .unwrap();
    assert_eq!(outcome, LeaseOutcome::Acquired);

    let task = db.repo.list_enabled_tasks().await.unwrap().remove(0);
    assert_eq!(task.locked_by.as_deref(), Some("node-a"));
    assert_eq!(task.locked_at, Some(window.locked_at));
    assert_eq!(task.expired_at, Some(window.expired_at));

    db.repo.release_lease(task_id, &window).await.unwrap();

    let task = db.repo.list_enabled_tasks().await.unwrap().remove(0);
    assert!(task.locked_by.is_none());
    assert!(task.locked_at.is_none());
    assert!(task.expired_at.is_none());

    let again = LeaseWindow::starting_at(Utc::now(), 10);
    assert_eq!(
        db.repo.acquire_lease(task_id, "node-b", &again).await.unwrap(),
        LeaseOutcome::Acquired
    );
}

#[tokio::test]
async fn test_release_with_foreign_window_is_noop() {
    let db = setup().await;
    let task_id = insert_task(&db.pool, "sync", true).await;
    let window = LeaseWindow::starting_at(Utc::now(), 10);
    db.repo
        .acquire_lease(task_id, "node-a", &window)
        .await
        .unwrap();

    let foreign = LeaseWindow::starting_at(window.locked_at + Duration::seconds(1), 10);
    db.repo.release_lease(task_id, &foreign).await.unwrap();

    let task = db.repo.list_enabled_tasks().await.unwrap().remove(0);
    assert_eq!(task.locked_at, Some(window.locked_at));
    assert_eq!(task.locked_by.as_deref(), Some("node-a"));
}

#[tokio::test]
async fn test_held_lease_busy_until_expired() {
    let db = setup().await;
    let task_id = insert_task(&db.pool, "sync", true).await;
    let now = Utc::now();

    // 已过期的租约
    let stale = LeaseWindow::starting_at(now - Duration::seconds(20), 10);
    db.repo
        .acquire_lease(task_id, "node-a", &stale)
        .await
        .unwrap();

    let fresh = LeaseWindow::starting_at(now, 10);
    assert_eq!(
        db.repo.acquire_lease(task_id, "node-b", &fresh).await.unwrap(),
        LeaseOutcome::Acquired
    );

    let later = LeaseWindow::starting_at(now + Duration::seconds(1), 10);
    assert_eq!(
        db.repo.acquire_lease(task_id, "node-a", &later).await.unwrap(),
        LeaseOutcome::Busy
    );
}

#[tokio::test]
async fn test_disabled_task_is_busy() {
    let db = setup().await;
    let task_id = insert_task(&db.pool, "archive", false).await;
    let window = LeaseWindow::starting_at(Utc::now(), 10);

    assert_eq!(
        db.repo.acquire_lease(task_id, "node-a", &window).await.unwrap(),
        LeaseOutcome::Busy
    );
}

#[tokio::test]
async fn test_create_and_list_executions() {
    let db = setup().await;
    let task_id = insert_task(&db.pool, "sync", true).await;
    let start = Utc::now();

    let first = ExecutionStub::new(task_id, "node-a", "1001", start).finish(
        ExecutionStatus::Failed,
        "boom",
        start + Duration::seconds(1),
    );
    let second = ExecutionStub::new(task_id, "node-a", "1002", start + Duration::seconds(5))
        .finish(ExecutionStatus::Success, "", start + Duration::seconds(6));

    let first_id = db.repo.create_execution(&first).await.unwrap();
    let second_id = db.repo.create_execution(&second).await.unwrap();
    assert!(second_id > first_id);

    let executions = db.repo.list_executions(task_id).await.unwrap();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].id, Some(second_id));
    assert_eq!(executions[0].status, ExecutionStatus::Success);
    assert_eq!(executions[1].trace_id, "1001");
    assert_eq!(executions[1].error, "boom");
    assert_eq!(executions[1].start_time, first.start_time);
    assert_eq!(executions[1].created_date, first.created_date);
}
