use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use shared::domain::{TodoId, TodoRecord};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Pool, Row, Sqlite,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

mod live;

pub use live::LiveQuery;

/// Version of the `todos` schema installed by the embedded migrations.
pub const SCHEMA_VERSION: i64 = 1;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid database url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to create parent directory '{path}' for database url '{url}': {source}")]
    CreateDir {
        path: PathBuf,
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite operation failed: {0}")]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                Self::Unavailable(value.to_string())
            }
            other => Self::Sqlx(other),
        }
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Full contents of the table as of one committed revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoSnapshot {
    pub revision: u64,
    pub todos: Vec<TodoRecord>,
}

/// Durable todo table backed by a SQLite database.
///
/// Cloning is cheap and every clone shares the pool, the revision counter and
/// the subscriber list, so a single store can be handed to any number of
/// tasks.
#[derive(Clone)]
pub struct TodoStore {
    pool: Pool<Sqlite>,
    // Held across "write, re-read, publish" so snapshots go out in revision order.
    revision: Arc<Mutex<u64>>,
    snapshots: broadcast::Sender<Arc<TodoSnapshot>>,
}

impl TodoStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(|source| StorageError::InvalidUrl {
                url: database_url.to_string(),
                source,
            })?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        info!(database_url, "todo store opened");
        Ok(Self {
            pool,
            revision: Arc::new(Mutex::new(0)),
            snapshots,
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn schema_version(&self) -> Result<i64> {
        let version: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(version)
    }

    /// Closes the pool. Later operations on any clone fail with
    /// [`StorageError::Unavailable`].
    pub async fn close(&self) {
        self.pool.close().await;
        info!("todo store closed");
    }

    /// Inserts a new open todo. An empty title is declined: nothing is written
    /// and `None` is returned.
    pub async fn create(&self, title: &str) -> Result<Option<TodoId>> {
        if title.is_empty() {
            debug!("declined todo with empty title");
            return Ok(None);
        }

        let mut revision = self.revision.lock().await;
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("INSERT INTO todos (title, done) VALUES (?, 0) RETURNING id")
            .bind(title)
            .fetch_one(&mut *tx)
            .await?;
        let id = TodoId(row.try_get::<i64, _>(0)?);
        let todos = fetch_todos(&mut *tx).await?;
        tx.commit().await?;
        self.publish(&mut revision, todos);

        info!(todo_id = id.0, "todo created");
        Ok(Some(id))
    }

    /// Returns `false` when no todo has this id.
    pub async fn update_done(&self, id: TodoId, done: bool) -> Result<bool> {
        let mut revision = self.revision.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE todos SET done = ? WHERE id = ?")
            .bind(done)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            debug!(todo_id = id.0, "update_done skipped: no such todo");
            return Ok(false);
        }
        let todos = fetch_todos(&mut *tx).await?;
        tx.commit().await?;
        self.publish(&mut revision, todos);

        debug!(todo_id = id.0, done, "todo done flag updated");
        Ok(true)
    }

    /// Returns `false` when no todo has this id.
    pub async fn update_title(&self, id: TodoId, title: &str) -> Result<bool> {
        let mut revision = self.revision.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE todos SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            debug!(todo_id = id.0, "update_title skipped: no such todo");
            return Ok(false);
        }
        let todos = fetch_todos(&mut *tx).await?;
        tx.commit().await?;
        self.publish(&mut revision, todos);

        debug!(todo_id = id.0, "todo title updated");
        Ok(true)
    }

    /// Returns `false` when the todo was already gone.
    pub async fn delete(&self, id: TodoId) -> Result<bool> {
        let mut revision = self.revision.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            debug!(todo_id = id.0, "delete skipped: no such todo");
            return Ok(false);
        }
        let todos = fetch_todos(&mut *tx).await?;
        tx.commit().await?;
        self.publish(&mut revision, todos);

        info!(todo_id = id.0, "todo deleted");
        Ok(true)
    }

    pub async fn get(&self, id: TodoId) -> Result<Option<TodoRecord>> {
        let row = sqlx::query("SELECT id, title, done FROM todos WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| todo_from_row(&r)).transpose()
    }

    /// All todos in insertion order.
    pub async fn list_all(&self) -> Result<Vec<TodoRecord>> {
        self.fetch_all().await
    }

    pub async fn snapshot(&self) -> Result<TodoSnapshot> {
        let revision = self.revision.lock().await;
        let todos = self.fetch_all().await?;
        Ok(TodoSnapshot {
            revision: *revision,
            todos,
        })
    }

    /// Revision of the most recently published snapshot.
    pub async fn revision(&self) -> u64 {
        *self.revision.lock().await
    }

    /// Subscribes to the full collection. The returned query starts at the
    /// current committed state and yields a fresh snapshot after every
    /// mutation that changed a row.
    pub async fn live_query(&self) -> Result<LiveQuery> {
        let revision = self.revision.lock().await;
        let receiver = self.snapshots.subscribe();
        let todos = self.fetch_all().await?;
        let current = Arc::new(TodoSnapshot {
            revision: *revision,
            todos,
        });
        Ok(LiveQuery::new(current, receiver))
    }

    async fn fetch_all(&self) -> Result<Vec<TodoRecord>> {
        fetch_todos(&self.pool).await
    }

    // Only called once the write and its re-read have committed together.
    fn publish(&self, revision: &mut u64, todos: Vec<TodoRecord>) {
        *revision += 1;
        let snapshot = Arc::new(TodoSnapshot {
            revision: *revision,
            todos,
        });
        // Err only means nobody is subscribed right now.
        let _ = self.snapshots.send(snapshot);
    }
}

async fn fetch_todos<'e, E>(executor: E) -> Result<Vec<TodoRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT id, title, done FROM todos ORDER BY id")
        .fetch_all(executor)
        .await?;
    rows.iter().map(todo_from_row).collect()
}

fn todo_from_row(row: &SqliteRow) -> Result<TodoRecord> {
    Ok(TodoRecord {
        id: TodoId(row.try_get::<i64, _>("id")?),
        title: row.try_get::<String, _>("title")?,
        done: row.try_get::<bool, _>("done")?,
    })
}

/// The operations a controller needs from a todo table.
#[async_trait]
pub trait TodoRepository: Send + Sync + 'static {
    async fn create(&self, title: &str) -> Result<Option<TodoId>>;
    async fn update_done(&self, id: TodoId, done: bool) -> Result<bool>;
    async fn update_title(&self, id: TodoId, title: &str) -> Result<bool>;
    async fn delete(&self, id: TodoId) -> Result<bool>;
    async fn revision(&self) -> u64;
    async fn live_query(&self) -> Result<LiveQuery>;
}

#[async_trait]
impl TodoRepository for TodoStore {
    async fn create(&self, title: &str) -> Result<Option<TodoId>> {
        TodoStore::create(self, title).await
    }

    async fn update_done(&self, id: TodoId, done: bool) -> Result<bool> {
        TodoStore::update_done(self, id, done).await
    }

    async fn update_title(&self, id: TodoId, title: &str) -> Result<bool> {
        TodoStore::update_title(self, id, title).await
    }

    async fn delete(&self, id: TodoId) -> Result<bool> {
        TodoStore::delete(self, id).await
    }

    async fn revision(&self) -> u64 {
        TodoStore::revision(self).await
    }

    async fn live_query(&self) -> Result<LiveQuery> {
        TodoStore::live_query(self).await
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
        path: parent.to_path_buf(),
        url: database_url.to_string(),
        source,
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
