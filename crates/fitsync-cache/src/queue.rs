//! SQLite implementation of IMutationQueue
//!
//! Entries live in the `mutation_queue` table. Stored order is the
//! autoincrement `seq` column, which is also the drain order.
//!
//! ## Type Mapping
//!
//! | Field         | SQL Type | Strategy                                  |
//! |---------------|----------|-------------------------------------------|
//! | id            | TEXT     | Derived entry id, unique                  |
//! | collection    | TEXT     | `Collection::as_str()` / `FromStr`        |
//! | operation     | TEXT     | `INSERT` / `UPDATE` / `DELETE`            |
//! | entity_id     | TEXT     | Copy of `payload.id`, for id rewriting    |
//! | payload       | TEXT     | serde_json object                         |
//! | enqueued_at   | TEXT     | RFC 3339                                  |
//! | retry_count   | INTEGER  | `u32` widened to `i64`                    |
//! | confirmed_id  | TEXT     | Server id of an unreconciled INSERT       |
//!
//! The drain lease lives in the single-row `drain_lease` table. Claiming is
//! one conditional upsert, which SQLite applies atomically across
//! connections and processes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use fitsync_core::domain::{Collection, EntityRecord, MutationEntry, Operation, RecordId};
use fitsync_core::ports::IMutationQueue;

use crate::{CacheError, DatabasePool};

const SELECT_COLUMNS: &str =
    "id, collection, operation, payload, enqueued_at, retry_count, last_error, confirmed_id";

/// SQLite-based implementation of the mutation queue port
pub struct SqliteMutationQueue {
    db: DatabasePool,
}

impl SqliteMutationQueue {
    /// Creates a new queue over the given database
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// Returns a single entry by id
    pub async fn get(&self, entry_id: &str) -> Result<Option<MutationEntry>, CacheError> {
        self.db.initialize().await?;
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM mutation_queue WHERE id = ?"
        ))
        .bind(entry_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|r| row_to_entry(&r)).transpose()
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_entry(row: &SqliteRow) -> Result<MutationEntry, CacheError> {
    let id: String = row.try_get("id")?;
    let collection: String = row.try_get("collection")?;
    let operation: String = row.try_get("operation")?;
    let payload: String = row.try_get("payload")?;
    let enqueued_at: String = row.try_get("enqueued_at")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let last_error: Option<String> = row.try_get("last_error")?;
    let confirmed_id: Option<String> = row.try_get("confirmed_id")?;

    let collection: Collection = collection
        .parse()
        .map_err(|e| CacheError::CorruptRow(format!("{e}")))?;
    let operation: Operation = operation
        .parse()
        .map_err(|e| CacheError::CorruptRow(format!("{e}")))?;
    let payload: EntityRecord = serde_json::from_str(&payload)?;
    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
        .map_err(|e| CacheError::CorruptRow(format!("Invalid enqueued_at: {e}")))?
        .with_timezone(&Utc);
    let confirmed_id = confirmed_id
        .map(RecordId::new)
        .transpose()
        .map_err(|e| CacheError::CorruptRow(format!("Invalid confirmed_id: {e}")))?;

    Ok(MutationEntry {
        id,
        collection,
        operation,
        payload,
        enqueued_at,
        retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
        last_error,
        confirmed_id,
    })
}

/// Appends an entry using an existing connection or transaction
pub(crate) async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &MutationEntry,
) -> Result<(), CacheError> {
    let payload = serde_json::to_string(&entry.payload)?;
    let entity_id = entry.entity_id().map(String::from);

    sqlx::query(
        "INSERT INTO mutation_queue \
         (id, collection, operation, entity_id, payload, enqueued_at, retry_count, last_error, \
          confirmed_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(entry.collection.as_str())
    .bind(entry.operation.as_str())
    .bind(entity_id)
    .bind(payload)
    .bind(entry.enqueued_at.to_rfc3339())
    .bind(i64::from(entry.retry_count))
    .bind(&entry.last_error)
    .bind(entry.confirmed_id.as_ref().map(|id| id.as_str().to_string()))
    .execute(conn)
    .await?;

    Ok(())
}

/// Points every queued entry of one entity at `new_id`
pub(crate) async fn rewrite_entries(
    conn: &mut SqliteConnection,
    collection: Collection,
    old_id: &RecordId,
    new_id: &RecordId,
) -> Result<u64, CacheError> {
    let rows = sqlx::query(
        "SELECT id, payload FROM mutation_queue WHERE collection = ? AND entity_id = ?",
    )
    .bind(collection.as_str())
    .bind(old_id.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut rewritten = 0u64;
    for row in &rows {
        let entry_id: String = row.try_get("id")?;
        let payload: String = row.try_get("payload")?;
        let mut payload: EntityRecord = serde_json::from_str(&payload)?;
        payload.set_id(new_id);

        sqlx::query("UPDATE mutation_queue SET entity_id = ?, payload = ? WHERE id = ?")
            .bind(new_id.as_str())
            .bind(serde_json::to_string(&payload)?)
            .bind(&entry_id)
            .execute(&mut *conn)
            .await?;
        rewritten += 1;
    }
    Ok(rewritten)
}

pub(crate) async fn delete_entry(
    conn: &mut SqliteConnection,
    entry_id: &str,
) -> Result<(), CacheError> {
    sqlx::query("DELETE FROM mutation_queue WHERE id = ?")
        .bind(entry_id)
        .execute(conn)
        .await?;
    Ok(())
}

// ============================================================================
// IMutationQueue implementation
// ============================================================================

#[async_trait::async_trait]
impl IMutationQueue for SqliteMutationQueue {
    async fn enqueue(&self, entry: &MutationEntry) -> anyhow::Result<()> {
        self.db.initialize().await?;
        let mut conn = self.db.pool().acquire().await?;
        insert_entry(&mut conn, entry).await?;

        tracing::trace!(
            entry_id = %entry.id,
            collection = %entry.collection,
            operation = %entry.operation,
            "Mutation enqueued"
        );
        Ok(())
    }

    async fn drain_all(&self) -> anyhow::Result<Vec<MutationEntry>> {
        self.db.initialize().await?;
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM mutation_queue ORDER BY seq ASC"
        ))
        .fetch_all(self.db.pool())
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_entry(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let id: String = row.try_get("id").unwrap_or_default();
                    tracing::warn!(entry_id = %id, error = %e, "Skipping unreadable queue entry");
                }
            }
        }
        Ok(entries)
    }

    async fn remove(&self, entry_id: &str) -> anyhow::Result<()> {
        self.db.initialize().await?;
        let mut conn = self.db.pool().acquire().await?;
        delete_entry(&mut conn, entry_id).await?;

        tracing::trace!(entry_id, "Mutation removed");
        Ok(())
    }

    async fn increment_retry(&self, entry_id: &str, error: Option<&str>) -> anyhow::Result<()> {
        self.db.initialize().await?;
        let result = sqlx::query(
            "UPDATE mutation_queue \
             SET retry_count = retry_count + 1, last_error = COALESCE(?, last_error) \
             WHERE id = ?",
        )
        .bind(error)
        .bind(entry_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(entry_id, "Retry increment for missing queue entry");
        }
        Ok(())
    }

    async fn rewrite_entity_id(
        &self,
        collection: Collection,
        old_id: &RecordId,
        new_id: &RecordId,
    ) -> anyhow::Result<u64> {
        self.db.initialize().await?;
        let mut tx = self.db.pool().begin().await?;

        let rewritten = rewrite_entries(&mut tx, collection, old_id, new_id).await?;
        tx.commit().await?;

        if rewritten > 0 {
            tracing::debug!(
                collection = %collection,
                old_id = %old_id,
                new_id = %new_id,
                rewritten,
                "Rewrote queued entity id"
            );
        }
        Ok(rewritten)
    }

    async fn len(&self) -> anyhow::Result<usize> {
        self.db.initialize().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mutation_queue")
            .fetch_one(self.db.pool())
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn mark_confirmed(&self, entry_id: &str, permanent: &RecordId) -> anyhow::Result<()> {
        self.db.initialize().await?;
        sqlx::query("UPDATE mutation_queue SET confirmed_id = ? WHERE id = ?")
            .bind(permanent.as_str())
            .bind(entry_id)
            .execute(self.db.pool())
            .await?;

        tracing::debug!(entry_id, entity_id = %permanent, "INSERT marked as confirmed");
        Ok(())
    }

    async fn try_claim_drain(&self, owner: &str, ttl: Duration) -> anyhow::Result<bool> {
        self.db.initialize().await?;
        let now = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let result = sqlx::query(
            "INSERT INTO drain_lease (id, owner, expires_at) VALUES (1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at \
             WHERE drain_lease.owner = excluded.owner OR drain_lease.expires_at <= ?",
        )
        .bind(owner)
        .bind(now.saturating_add(ttl_ms))
        .bind(now)
        .execute(self.db.pool())
        .await?;

        let claimed = result.rows_affected() > 0;
        tracing::trace!(owner, claimed, "Drain lease claim");
        Ok(claimed)
    }

    async fn release_drain(&self, owner: &str) -> anyhow::Result<()> {
        self.db.initialize().await?;
        sqlx::query("DELETE FROM drain_lease WHERE id = 1 AND owner = ?")
            .bind(owner)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}
