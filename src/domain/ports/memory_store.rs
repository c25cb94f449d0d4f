//! Shared memory store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ChangeEvent, MemoryEntry, MemoryMetadata, MemoryQuery, SubscriptionFilter,
};

/// Store interface for the shared memory substrate — the only
/// inter-agent communication channel.
#[async_trait]
pub trait SharedMemoryStore: Send + Sync {
    /// Append a new entry under the key. Never overwrites prior
    /// versions.
    async fn store(
        &self,
        key: &str,
        value: Value,
        metadata: MemoryMetadata,
        agent_id: Option<Uuid>,
        expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<MemoryEntry>;

    /// Latest non-expired entry for the key, by created_at, ties broken
    /// by id.
    async fn get(&self, key: &str) -> DomainResult<Option<MemoryEntry>>;

    /// All non-expired entries for the key, newest first.
    async fn get_all(&self, key: &str) -> DomainResult<Vec<MemoryEntry>>;

    /// In-place mutation of one entry's value and optionally metadata;
    /// bumps `updated_at`. Errors when the id is absent.
    async fn update(
        &self,
        id: Uuid,
        value: Value,
        metadata: Option<MemoryMetadata>,
    ) -> DomainResult<MemoryEntry>;

    /// Hard removal of one entry. Errors when the id is absent.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// Hard removal of every entry under a key; returns the count.
    async fn delete_by_key(&self, key: &str) -> DomainResult<u64>;

    /// Entries matching all provided filters; a tag filter requires
    /// every listed tag.
    async fn query(&self, query: MemoryQuery) -> DomainResult<Vec<MemoryEntry>>;

    /// Subscribe to the change feed under a filter. Delivery is
    /// at-least-once per subscriber.
    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription;

    /// Delete entries whose expiry has passed; returns the count.
    async fn cleanup_expired(&self) -> DomainResult<u64>;
}

/// Live handle on the change feed. Dropping it, or calling
/// [`Subscription::unsubscribe`], detaches the subscriber; unsubscribe
/// is idempotent.
pub struct Subscription {
    receiver: Option<broadcast::Receiver<ChangeEvent>>,
    filter: SubscriptionFilter,
}

impl Subscription {
    pub fn new(receiver: broadcast::Receiver<ChangeEvent>, filter: SubscriptionFilter) -> Self {
        Self {
            receiver: Some(receiver),
            filter,
        }
    }

    /// Next change matching the filter, or None once unsubscribed or the
    /// feed has closed. Lagged windows are skipped, not fatal: delivery
    /// stays at-least-once for events the subscriber keeps up with.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Detach from the feed. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        self.receiver = None;
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }
}
