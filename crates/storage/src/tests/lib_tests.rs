use std::time::Duration;

use super::*;

async fn memory_store() -> TodoStore {
    TodoStore::new("sqlite::memory:").await.expect("db")
}

async fn next_snapshot(live: &mut LiveQuery) -> Arc<TodoSnapshot> {
    tokio::time::timeout(Duration::from_secs(5), live.changed())
        .await
        .expect("snapshot within timeout")
        .expect("store still open")
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let store = memory_store().await;
    store.health_check().await.expect("health check");
}

#[tokio::test]
async fn reports_schema_version_one() {
    let store = memory_store().await;
    assert_eq!(store.schema_version().await.expect("version"), SCHEMA_VERSION);
}

#[tokio::test]
async fn create_assigns_fresh_id_and_open_state() {
    let store = memory_store().await;
    let first = store.create("buy milk").await.expect("create").expect("id");
    let second = store.create("walk dog").await.expect("create").expect("id");
    assert!(second > first);

    let record = store.get(first).await.expect("get").expect("record");
    assert_eq!(record.title, "buy milk");
    assert!(!record.done);
}

#[tokio::test]
async fn empty_title_is_declined_without_publishing() {
    let store = memory_store().await;
    let live = store.live_query().await.expect("live");

    assert_eq!(store.create("").await.expect("create"), None);
    assert!(store.list_all().await.expect("list").is_empty());
    assert_eq!(store.revision().await, 0);
    assert_eq!(live.revision(), 0);
}

#[tokio::test]
async fn whitespace_title_is_kept_verbatim() {
    let store = memory_store().await;
    let id = store.create("  ").await.expect("create").expect("id");
    let record = store.get(id).await.expect("get").expect("record");
    assert_eq!(record.title, "  ");
}

#[tokio::test]
async fn update_done_flips_flag_and_keeps_title() {
    let store = memory_store().await;
    let id = store.create("buy milk").await.expect("create").expect("id");

    assert!(store.update_done(id, true).await.expect("update"));
    let record = store.get(id).await.expect("get").expect("record");
    assert!(record.done);
    assert_eq!(record.title, "buy milk");
}

#[tokio::test]
async fn update_title_keeps_id_and_done() {
    let store = memory_store().await;
    let id = store.create("X").await.expect("create").expect("id");
    store.update_done(id, true).await.expect("done");

    assert!(store.update_title(id, "Y").await.expect("rename"));
    let record = store.get(id).await.expect("get").expect("record");
    assert_eq!(
        record,
        TodoRecord {
            id,
            title: "Y".into(),
            done: true,
        }
    );
}

#[tokio::test]
async fn missing_ids_are_benign_no_ops() {
    let store = memory_store().await;
    store.create("keep me").await.expect("create");
    let before = store.snapshot().await.expect("snapshot");

    let ghost = TodoId(999);
    assert!(!store.update_done(ghost, true).await.expect("update_done"));
    assert!(!store.update_title(ghost, "nope").await.expect("update_title"));
    assert!(!store.delete(ghost).await.expect("delete"));

    let after = store.snapshot().await.expect("snapshot");
    assert_eq!(before, after);
}

#[tokio::test]
async fn delete_removes_exactly_one_record() {
    let store = memory_store().await;
    let a = store.create("A").await.expect("a").expect("id");
    let b = store.create("B").await.expect("b").expect("id");

    assert!(store.delete(a).await.expect("delete"));
    assert!(!store.delete(a).await.expect("second delete"));

    let ids: Vec<_> = store
        .list_all()
        .await
        .expect("list")
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec![b]);
}

#[tokio::test]
async fn ids_are_not_reused_after_deleting_newest() {
    let store = memory_store().await;
    let first = store.create("first").await.expect("create").expect("id");
    store.delete(first).await.expect("delete");
    let second = store.create("second").await.expect("create").expect("id");
    assert!(second > first);
}

#[tokio::test]
async fn list_all_is_in_insertion_order() {
    let store = memory_store().await;
    for title in ["c", "a", "b"] {
        store.create(title).await.expect("create");
    }
    let titles: Vec<_> = store
        .list_all()
        .await
        .expect("list")
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn live_query_starts_from_current_state() {
    let store = memory_store().await;
    store.create("existing").await.expect("create");

    let live = store.live_query().await.expect("live");
    let current = live.current();
    assert_eq!(current.revision, 1);
    assert_eq!(current.todos.len(), 1);
    assert_eq!(current.todos[0].title, "existing");
}

#[tokio::test]
async fn live_query_pushes_snapshot_after_each_mutation() {
    let store = memory_store().await;
    let mut live = store.live_query().await.expect("live");

    let id = store.create("buy milk").await.expect("create").expect("id");
    let snapshot = next_snapshot(&mut live).await;
    assert_eq!(snapshot.revision, 1);
    assert_eq!(snapshot.todos.len(), 1);
    assert!(!snapshot.todos[0].done);

    store.update_done(id, true).await.expect("toggle");
    let snapshot = next_snapshot(&mut live).await;
    assert!(snapshot.todos[0].done);

    store.delete(id).await.expect("delete");
    let snapshot = next_snapshot(&mut live).await;
    assert!(snapshot.todos.is_empty());
    assert_eq!(live.revision(), 3);
}

#[tokio::test]
async fn every_subscriber_receives_the_same_snapshot() {
    let store = memory_store().await;
    let mut left = store.live_query().await.expect("left");
    let mut right = store.live_query().await.expect("right");

    store.create("shared").await.expect("create");

    let a = next_snapshot(&mut left).await;
    let b = next_snapshot(&mut right).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn lagging_subscriber_skips_to_latest_snapshot() {
    let store = memory_store().await;
    let mut live = store.live_query().await.expect("live");

    let total = SNAPSHOT_CHANNEL_CAPACITY + 10;
    for n in 0..total {
        store.create(&format!("todo {n}")).await.expect("create");
    }

    let latest = next_snapshot(&mut live).await;
    assert_eq!(latest.revision, total as u64);
    assert_eq!(latest.todos.len(), total);
    assert_eq!(live.revision(), total as u64);
}

#[tokio::test]
async fn changed_returns_newest_queued_snapshot() {
    let store = memory_store().await;
    let mut live = store.live_query().await.expect("live");

    let id = store.create("a").await.expect("create").expect("id");
    store.update_done(id, true).await.expect("update");
    store.update_title(id, "b").await.expect("update");

    let latest = next_snapshot(&mut live).await;
    assert_eq!(latest.revision, 3);
    assert_eq!(latest.todos[0].title, "b");
    assert!(latest.todos[0].done);
}

#[tokio::test]
async fn failed_reread_rolls_back_create_and_publishes_nothing() {
    let store = memory_store().await;
    let live = store.live_query().await.expect("live");
    sqlx::query(
        "CREATE TRIGGER corrupt_new_title AFTER INSERT ON todos WHEN NEW.title = 'corrupt' \
         BEGIN UPDATE todos SET title = X'FF' WHERE id = NEW.id; END",
    )
    .execute(store.pool())
    .await
    .expect("trigger");

    assert!(store.create("corrupt").await.is_err());

    assert!(store.list_all().await.expect("list").is_empty());
    assert_eq!(store.revision().await, 0);
    assert_eq!(live.revision(), 0);

    let id = store.create("fine").await.expect("create").expect("id");
    assert_eq!(store.revision().await, 1);
    assert_eq!(store.get(id).await.expect("get").expect("record").title, "fine");
}

#[tokio::test]
async fn failed_reread_rolls_back_update() {
    let store = memory_store().await;
    let id = store.create("keep").await.expect("create").expect("id");
    let mut live = store.live_query().await.expect("live");
    sqlx::query(
        "CREATE TRIGGER corrupt_renamed_title AFTER UPDATE OF title ON todos \
         WHEN NEW.title = 'corrupt' \
         BEGIN UPDATE todos SET title = X'FF' WHERE id = NEW.id; END",
    )
    .execute(store.pool())
    .await
    .expect("trigger");

    assert!(store.update_title(id, "corrupt").await.is_err());

    let record = store.get(id).await.expect("get").expect("record");
    assert_eq!(record.title, "keep");
    assert_eq!(store.revision().await, 1);

    store.update_done(id, true).await.expect("update");
    let next = next_snapshot(&mut live).await;
    assert_eq!(next.revision, 2);
    assert_eq!(next.todos[0].title, "keep");
}

#[tokio::test]
async fn concurrent_writes_publish_in_revision_order() {
    let store = memory_store().await;
    let mut live = store.live_query().await.expect("live");

    let mut handles = Vec::new();
    for n in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.create(&format!("todo {n}")).await.expect("create");
        }));
    }
    for handle in handles {
        handle.await.expect("join");
    }

    let mut seen = 0;
    while seen < 20 {
        let snapshot = next_snapshot(&mut live).await;
        assert!(snapshot.revision > seen);
        assert_eq!(snapshot.todos.len() as u64, snapshot.revision);
        seen = snapshot.revision;
    }
}

#[tokio::test]
async fn closed_store_reports_unavailable() {
    let store = memory_store().await;
    store.close().await;
    let err = store.create("late").await.expect_err("closed pool");
    assert!(matches!(err, StorageError::Unavailable(_)), "{err}");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("todos.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let store = TodoStore::new(&database_url).await.expect("db");
    store.close().await;

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[test]
fn sqlite_path_ignores_memory_urls() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(sqlite_path("postgres://localhost/db"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/todos.db?mode=rwc"),
        Some(PathBuf::from("./data/todos.db"))
    );
}
