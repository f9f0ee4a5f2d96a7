//! SQLite pool shared by the local store and the mutation queue
//!
//! Opening the pool and setting up the schema are separate steps. Every
//! store operation calls [`DatabasePool::initialize`]; the first call runs
//! the schema script, concurrent calls wait on it, later calls return at
//! once. A failed setup is not remembered, so the next call tries again.
//!
//! File databases run in WAL mode with a busy timeout so the daemon and
//! the CLI can share one cache file.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::OnceCell;

use crate::CacheError;

/// Schema version written by the initial script (`PRAGMA user_version`)
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = include_str!("migrations/0001_initial.sql");

/// Connections for a cache file; SQLite serializes writers anyway
const FILE_CONNECTIONS: u32 = 5;

/// Wait this long on a locked database before failing a statement
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable handle to the cache database
///
/// Clones share the pool and the schema state.
#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
    schema: Arc<OnceCell<()>>,
}

impl DatabasePool {
    /// Opens the cache file at `db_path`, creating it and its directory
    ///
    /// # Errors
    ///
    /// `CacheError::Unavailable` if the directory cannot be created or
    /// SQLite refuses the file.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(dir) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                CacheError::Unavailable(format!(
                    "cannot create cache directory {}: {e}",
                    dir.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = Self::connect(options, FILE_CONNECTIONS)
            .await
            .map_err(|e| {
                CacheError::Unavailable(format!("cannot open {}: {e}", db_path.display()))
            })?;

        tracing::info!(path = %db_path.display(), "Cache database opened");
        Ok(Self::wrap(pool))
    }

    /// Private in-memory database, used by tests
    ///
    /// Held on one connection: every SQLite connection to `:memory:` gets
    /// its own empty database.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::Unavailable(format!("invalid in-memory options: {e}")))?
            .foreign_keys(true);

        let pool = Self::connect(options, 1).await.map_err(|e| {
            CacheError::Unavailable(format!("cannot open in-memory cache: {e}"))
        })?;

        tracing::debug!("In-memory cache database opened");
        Ok(Self::wrap(pool))
    }

    async fn connect(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<SqlitePool, sqlx::Error> {
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
    }

    fn wrap(pool: SqlitePool) -> Self {
        Self {
            pool,
            schema: Arc::new(OnceCell::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates collection tables, indexes, the queue and metadata tables
    ///
    /// # Errors
    ///
    /// `CacheError::Schema` when the script fails; durable storage
    /// is unusable in that case.
    pub async fn initialize(&self) -> Result<(), CacheError> {
        self.schema
            .get_or_try_init(|| Self::apply_schema(&self.pool))
            .await
            .map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.schema.initialized()
    }

    /// Reads `PRAGMA user_version`
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    async fn apply_schema(pool: &SqlitePool) -> Result<(), CacheError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(pool)
            .await
            .map_err(|e| CacheError::Schema(e.to_string()))?;

        tracing::debug!(version = SCHEMA_VERSION, "Cache schema ready");
        Ok(())
    }
}
