//! SQLite implementation of the shared memory store.
//!
//! One relational table holds every versioned entry; the change feed is
//! a broadcast channel with subscriber-side filtering. Expired entries
//! stay in the table, invisible to reads, until `cleanup_expired`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ChangeEvent, ChangeKind, MemoryEntry, MemoryMetadata, MemoryOrderBy, MemoryQuery, OrderDir,
    SubscriptionFilter,
};
use crate::domain::ports::{SharedMemoryStore, Subscription};

/// Change feed capacity; slow subscribers lag rather than block writers.
const FEED_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct SqliteMemoryStore {
    pool: SqlitePool,
    feed: broadcast::Sender<ChangeEvent>,
}

impl SqliteMemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self { pool, feed }
    }

    fn publish(&self, kind: ChangeKind, entry: MemoryEntry) {
        // No subscribers is not an error.
        let _ = self.feed.send(ChangeEvent { kind, entry });
    }

    async fn fetch_by_id(&self, id: Uuid) -> DomainResult<Option<MemoryEntry>> {
        let row: Option<MemoryRow> = sqlx::query_as("SELECT * FROM memory_entries WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(MemoryEntry::try_from).transpose()
    }
}

#[async_trait]
impl SharedMemoryStore for SqliteMemoryStore {
    async fn store(
        &self,
        key: &str,
        value: Value,
        metadata: MemoryMetadata,
        agent_id: Option<Uuid>,
        expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<MemoryEntry> {
        if key.is_empty() {
            return Err(DomainError::InvalidInput(
                "memory key cannot be empty".to_string(),
            ));
        }

        let mut entry = MemoryEntry::new(key, value).with_metadata(metadata);
        entry.agent_id = agent_id;
        entry.expires_at = expires_at;

        sqlx::query(
            "INSERT INTO memory_entries
                 (id, key, value, metadata, agent_id, created_at, updated_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(&entry.key)
        .bind(serde_json::to_string(&entry.value)?)
        .bind(serde_json::to_string(&entry.metadata)?)
        .bind(entry.agent_id.map(|id| id.to_string()))
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.updated_at.to_rfc3339())
        .bind(entry.expires_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        self.publish(ChangeKind::Insert, entry.clone());
        Ok(entry)
    }

    async fn get(&self, key: &str) -> DomainResult<Option<MemoryEntry>> {
        let row: Option<MemoryRow> = sqlx::query_as(
            "SELECT * FROM memory_entries
             WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
        )
        .bind(key)
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;
        row.map(MemoryEntry::try_from).transpose()
    }

    async fn get_all(&self, key: &str) -> DomainResult<Vec<MemoryEntry>> {
        let rows: Vec<MemoryRow> = sqlx::query_as(
            "SELECT * FROM memory_entries
             WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)
             ORDER BY created_at DESC, rowid DESC",
        )
        .bind(key)
        .bind(Utc::now().to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MemoryEntry::try_from).collect()
    }

    async fn update(
        &self,
        id: Uuid,
        value: Value,
        metadata: Option<MemoryMetadata>,
    ) -> DomainResult<MemoryEntry> {
        let mut entry = self
            .fetch_by_id(id)
            .await?
            .ok_or(DomainError::MemoryNotFound(id))?;

        entry.value = value;
        if let Some(metadata) = metadata {
            entry.metadata = metadata;
        }
        entry.updated_at = Utc::now().max(entry.created_at);

        let result = sqlx::query(
            "UPDATE memory_entries SET value = ?, metadata = ?, updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(&entry.value)?)
        .bind(serde_json::to_string(&entry.metadata)?)
        .bind(entry.updated_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MemoryNotFound(id));
        }

        self.publish(ChangeKind::Update, entry.clone());
        Ok(entry)
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let entry = self
            .fetch_by_id(id)
            .await?
            .ok_or(DomainError::MemoryNotFound(id))?;

        let result = sqlx::query("DELETE FROM memory_entries WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::MemoryNotFound(id));
        }

        self.publish(ChangeKind::Delete, entry);
        Ok(())
    }

    async fn delete_by_key(&self, key: &str) -> DomainResult<u64> {
        let rows: Vec<MemoryRow> = sqlx::query_as("SELECT * FROM memory_entries WHERE key = ?")
            .bind(key)
            .fetch_all(&self.pool)
            .await?;

        sqlx::query("DELETE FROM memory_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        let mut count = 0;
        for row in rows {
            self.publish(ChangeKind::Delete, MemoryEntry::try_from(row)?);
            count += 1;
        }
        Ok(count)
    }

    async fn query(&self, query: MemoryQuery) -> DomainResult<Vec<MemoryEntry>> {
        let mut sql = String::from(
            "SELECT * FROM memory_entries
             WHERE (expires_at IS NULL OR expires_at > ?)",
        );
        let mut bindings: Vec<String> = vec![Utc::now().to_rfc3339()];

        if let Some(context) = &query.context {
            sql.push_str(" AND json_extract(metadata, '$.context') = ?");
            bindings.push(context.clone());
        }
        for tag in &query.tags {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM json_each(memory_entries.metadata, '$.tags')
                              WHERE json_each.value = ?)",
            );
            bindings.push(tag.clone());
        }
        if let Some(agent_id) = query.agent_id {
            sql.push_str(" AND agent_id = ?");
            bindings.push(agent_id.to_string());
        }

        let column = match query.order_by {
            MemoryOrderBy::CreatedAt => "created_at",
            MemoryOrderBy::UpdatedAt => "updated_at",
        };
        let dir = match query.order_dir {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {column} {dir}, rowid {dir}"));

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, MemoryRow>(&sql);
        for binding in &bindings {
            q = q.bind(binding);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(MemoryEntry::try_from).collect()
    }

    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        Subscription::new(self.feed.subscribe(), filter)
    }

    async fn cleanup_expired(&self) -> DomainResult<u64> {
        let now = Utc::now().to_rfc3339();
        let rows: Vec<MemoryRow> = sqlx::query_as(
            "SELECT * FROM memory_entries WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(&now)
        .fetch_all(&self.pool)
        .await?;

        sqlx::query("DELETE FROM memory_entries WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;

        let mut count = 0;
        for row in rows {
            self.publish(ChangeKind::Delete, MemoryEntry::try_from(row)?);
            count += 1;
        }
        Ok(count)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemoryRow {
    id: String,
    key: String,
    value: String,
    metadata: String,
    agent_id: Option<String>,
    created_at: String,
    updated_at: String,
    expires_at: Option<String>,
}

impl TryFrom<MemoryRow> for MemoryEntry {
    type Error = DomainError;

    fn try_from(row: MemoryRow) -> DomainResult<Self> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::Serialization(e.to_string()))?,
            key: row.key,
            value: serde_json::from_str(&row.value)?,
            metadata: serde_json::from_str(&row.metadata)?,
            agent_id: row
                .agent_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| DomainError::Serialization(e.to_string()))?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            expires_at: row.expires_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_timestamp(raw: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DomainError::Serialization(format!("bad timestamp {raw}: {e}")))
}
