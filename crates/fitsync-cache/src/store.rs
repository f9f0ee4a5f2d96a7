//! SQLite implementation of ILocalStore
//!
//! Each collection is its own table (`id`, `trainer_id`, `created_at`,
//! `data`). The record is stored whole as JSON in `data`; the other columns
//! are copies used for the primary key and the tenant index.
//!
//! ## Design Notes
//!
//! - Table names come from the closed `Collection` enum, never from input,
//!   so they are formatted directly into the SQL.
//! - Tenant reads use `idx_<collection>_trainer_id`. If that index is
//!   missing the read degrades to a full scan filtered in memory.
//! - `put` and `delete` each run in their own transaction.
//!   `commit_with_mutation` also writes the queue entry in that transaction.
//! - `confirm_insert` moves the record, rewrites queued ids and removes the
//!   INSERT entry in one transaction, so a failure leaves the temporary
//!   record and its entries exactly as they were.

use sqlx::{Row, SqliteConnection};

use fitsync_core::domain::{
    Collection, EntityRecord, MutationEntry, Operation, RecordId, TenantId,
};
use fitsync_core::ports::{CommittedWrite, ILocalStore};

use crate::queue::{delete_entry, insert_entry, rewrite_entries};
use crate::{CacheError, DatabasePool};

/// `store_meta` key holding the last authenticated tenant
const CACHED_TENANT_KEY: &str = "cached_tenant";

/// SQLite-based implementation of the local store port
pub struct SqliteLocalStore {
    db: DatabasePool,
}

impl SqliteLocalStore {
    /// Creates a new store over the given database
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// Returns the underlying database pool
    pub fn database(&self) -> &DatabasePool {
        &self.db
    }

    async fn tenant_index_exists(&self, collection: Collection) -> Result<bool, CacheError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?",
        )
        .bind(tenant_index_name(collection))
        .fetch_one(self.db.pool())
        .await?;
        Ok(count > 0)
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn tenant_index_name(collection: Collection) -> String {
    format!("idx_{}_trainer_id", collection.as_str())
}

fn decode_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<EntityRecord>, CacheError> {
    rows.iter()
        .map(|row| {
            let data: String = row.try_get("data")?;
            Ok(serde_json::from_str(&data)?)
        })
        .collect()
}

/// Fills in `id`, `created_at` and `trainer_id` when absent
fn prepare_record(
    collection: Collection,
    mut record: EntityRecord,
    cached_tenant: Option<&TenantId>,
) -> EntityRecord {
    if record.id().is_none() {
        record.set_id(&RecordId::temporary());
    }
    record.ensure_created_at();
    if record.trainer_id().is_none() {
        match cached_tenant {
            Some(tenant) => record.set_trainer_id(tenant),
            None => tracing::warn!(
                collection = %collection,
                "Storing record without trainer_id; it is only visible to unfiltered reads"
            ),
        }
    }
    record
}

async fn read_cached_tenant(conn: &mut SqliteConnection) -> Result<Option<TenantId>, CacheError> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
        .bind(CACHED_TENANT_KEY)
        .fetch_optional(conn)
        .await?;
    Ok(value.and_then(|v| TenantId::new(v).ok()))
}

async fn upsert_record(
    conn: &mut SqliteConnection,
    collection: Collection,
    record: &EntityRecord,
) -> Result<(), CacheError> {
    let id = record.id().ok_or(CacheError::MissingId)?;
    let data = serde_json::to_string(record)?;

    sqlx::query(&format!(
        "INSERT OR REPLACE INTO {} (id, trainer_id, created_at, data) VALUES (?, ?, ?, ?)",
        collection.as_str()
    ))
    .bind(id.as_str())
    .bind(record.trainer_id().map(String::from))
    .bind(record.created_at())
    .bind(data)
    .execute(conn)
    .await?;

    Ok(())
}

async fn read_record(
    conn: &mut SqliteConnection,
    collection: Collection,
    id: &RecordId,
) -> Result<Option<EntityRecord>, CacheError> {
    let data: Option<String> = sqlx::query_scalar(&format!(
        "SELECT data FROM {} WHERE id = ?",
        collection.as_str()
    ))
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

async fn delete_record(
    conn: &mut SqliteConnection,
    collection: Collection,
    id: &RecordId,
) -> Result<(), CacheError> {
    sqlx::query(&format!("DELETE FROM {} WHERE id = ?", collection.as_str()))
        .bind(id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

// ============================================================================
// ILocalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalStore for SqliteLocalStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.db.initialize().await?;
        Ok(())
    }

    async fn get_all(
        &self,
        collection: Collection,
        tenant: Option<&TenantId>,
    ) -> anyhow::Result<Vec<EntityRecord>> {
        self.db.initialize().await?;

        let Some(tenant) = tenant else {
            let rows = sqlx::query(&format!(
                "SELECT data FROM {} ORDER BY created_at ASC, id ASC",
                collection.as_str()
            ))
            .fetch_all(self.db.pool())
            .await?;
            return Ok(decode_rows(&rows)?);
        };

        if self.tenant_index_exists(collection).await? {
            let rows = sqlx::query(&format!(
                "SELECT data FROM {} WHERE trainer_id = ? ORDER BY created_at ASC, id ASC",
                collection.as_str()
            ))
            .bind(tenant.as_str())
            .fetch_all(self.db.pool())
            .await?;
            let records = decode_rows(&rows)?;
            // Column and JSON copies of trainer_id must agree
            return Ok(records
                .into_iter()
                .filter(|r| r.trainer_id().as_ref() == Some(tenant))
                .collect());
        }

        tracing::warn!(
            collection = %collection,
            index = %tenant_index_name(collection),
            "Tenant index missing, falling back to full scan"
        );
        let rows = sqlx::query(&format!(
            "SELECT data FROM {} ORDER BY created_at ASC, id ASC",
            collection.as_str()
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(decode_rows(&rows)?
            .into_iter()
            .filter(|r| r.trainer_id().as_ref() == Some(tenant))
            .collect())
    }

    async fn get_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> anyhow::Result<Option<EntityRecord>> {
        self.db.initialize().await?;
        let mut conn = self.db.pool().acquire().await?;
        Ok(read_record(&mut conn, collection, id).await?)
    }

    async fn put(
        &self,
        collection: Collection,
        record: EntityRecord,
    ) -> anyhow::Result<EntityRecord> {
        self.db.initialize().await?;
        let mut tx = self.db.pool().begin().await?;

        let cached = read_cached_tenant(&mut tx).await?;
        let record = prepare_record(collection, record, cached.as_ref());
        upsert_record(&mut tx, collection, &record).await?;

        tx.commit().await?;

        tracing::trace!(
            collection = %collection,
            entity_id = ?record.id(),
            "Record stored"
        );
        Ok(record)
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> anyhow::Result<()> {
        self.db.initialize().await?;
        let mut conn = self.db.pool().acquire().await?;
        delete_record(&mut conn, collection, id).await?;

        tracing::trace!(collection = %collection, entity_id = %id, "Record deleted");
        Ok(())
    }

    async fn commit_with_mutation(
        &self,
        collection: Collection,
        operation: Operation,
        record: EntityRecord,
    ) -> anyhow::Result<CommittedWrite> {
        self.db.initialize().await?;
        let mut tx = self.db.pool().begin().await?;

        let record = match operation {
            Operation::Insert | Operation::Update => {
                let cached = read_cached_tenant(&mut tx).await?;
                let record = prepare_record(collection, record, cached.as_ref());
                upsert_record(&mut tx, collection, &record).await?;
                record
            }
            Operation::Delete => {
                let id = record.id().ok_or(CacheError::MissingId)?;
                delete_record(&mut tx, collection, &id).await?;
                record
            }
        };

        let entry = MutationEntry::new(collection, operation, record.clone());
        insert_entry(&mut tx, &entry).await?;

        tx.commit().await?;

        tracing::trace!(
            collection = %collection,
            operation = %operation,
            entry_id = %entry.id,
            "Record and mutation committed together"
        );
        Ok(CommittedWrite { record, entry })
    }

    async fn confirm_insert(
        &self,
        collection: Collection,
        entry_id: &str,
        temp_id: &RecordId,
        server: &EntityRecord,
    ) -> anyhow::Result<u64> {
        let permanent = server.id().ok_or(CacheError::MissingId)?;
        self.db.initialize().await?;
        let mut tx = self.db.pool().begin().await?;

        // A record deleted locally meanwhile is not recreated; its queued
        // DELETE is rewritten below and removes it remotely
        if let Some(local) = read_record(&mut tx, collection, temp_id).await? {
            let mut record = server.clone();
            record.merge(&local);
            record.set_id(&permanent);
            delete_record(&mut tx, collection, temp_id).await?;
            upsert_record(&mut tx, collection, &record).await?;
        }

        delete_entry(&mut tx, entry_id).await?;
        let rewritten = rewrite_entries(&mut tx, collection, temp_id, &permanent).await?;

        tx.commit().await?;

        tracing::debug!(
            collection = %collection,
            temp_id = %temp_id,
            entity_id = %permanent,
            rewritten,
            "Temporary id replaced"
        );
        Ok(rewritten)
    }

    async fn set_cached_tenant(&self, tenant: &TenantId) -> anyhow::Result<()> {
        self.db.initialize().await?;
        sqlx::query("INSERT OR REPLACE INTO store_meta (key, value) VALUES (?, ?)")
            .bind(CACHED_TENANT_KEY)
            .bind(tenant.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn cached_tenant(&self) -> anyhow::Result<Option<TenantId>> {
        self.db.initialize().await?;
        let mut conn = self.db.pool().acquire().await?;
        Ok(read_cached_tenant(&mut conn).await?)
    }
}
