//! Shared memory domain model.
//!
//! The shared memory substrate is the only inter-agent communication
//! channel: a durable keyed store where a key accumulates versioned
//! entries. Values are opaque JSON; consumers own their decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Relative priority attached to a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPriority {
    Low,
    Normal,
    High,
}

impl Default for MemoryPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl MemoryPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Schema-free metadata bag carried alongside each value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Tags for categorisation; query tag filters require all listed tags.
    pub tags: Vec<String>,
    /// Context label, e.g. a conversation or swarm namespace.
    pub context: Option<String>,
    /// Relative priority.
    #[serde(default)]
    pub priority: MemoryPriority,
}

impl MemoryMetadata {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_priority(mut self, priority: MemoryPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// One versioned entry under a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier; storing never overwrites prior entries.
    pub id: Uuid,
    /// Lookup key; a key may hold many entries.
    pub key: String,
    /// Opaque JSON value.
    pub value: Value,
    /// Metadata bag.
    pub metadata: MemoryMetadata,
    /// Writing agent, if any.
    pub agent_id: Option<Uuid>,
    /// Creation time; orders versions under a key.
    pub created_at: DateTime<Utc>,
    /// Last in-place update time; never precedes `created_at`.
    pub updated_at: DateTime<Utc>,
    /// Expiry; expired entries are invisible to reads until cleanup.
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            value,
            metadata: MemoryMetadata::default(),
            agent_id: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MemoryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the entry has passed its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp <= now)
    }
}

/// Sort column for memory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryOrderBy {
    CreatedAt,
    UpdatedAt,
}

impl Default for MemoryOrderBy {
    fn default() -> Self {
        Self::CreatedAt
    }
}

/// Sort direction for memory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDir {
    Asc,
    Desc,
}

impl Default for OrderDir {
    fn default() -> Self {
        Self::Desc
    }
}

/// Filter set for memory queries; all provided filters must match.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    /// Context label match.
    pub context: Option<String>,
    /// Entry must carry every listed tag.
    pub tags: Vec<String>,
    /// Writing agent match.
    pub agent_id: Option<Uuid>,
    /// Maximum results.
    pub limit: Option<usize>,
    /// Sort column; created_at when unset.
    pub order_by: MemoryOrderBy,
    /// Sort direction; descending when unset.
    pub order_dir: OrderDir,
}

impl MemoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by(mut self, order_by: MemoryOrderBy, dir: OrderDir) -> Self {
        self.order_by = order_by;
        self.order_dir = dir;
        self
    }
}

/// Kind of change observed on the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One event on the change feed. Delivery is at-least-once per
/// subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub entry: MemoryEntry,
}

/// Subscriber-side filter for the change feed.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub key: Option<String>,
    pub agent_id: Option<Uuid>,
}

impl SubscriptionFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(key) = &self.key {
            if &event.entry.key != key {
                return false;
            }
        }
        if let Some(agent_id) = self.agent_id {
            if event.entry.agent_id != Some(agent_id) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_starts_unexpired() {
        let entry = MemoryEntry::new("swarm:1", json!({"ok": true}));
        assert!(!entry.is_expired(Utc::now()));
        assert_eq!(entry.created_at, entry.updated_at);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let entry = MemoryEntry::new("k", json!(1)).with_expiry(now);
        assert!(entry.is_expired(now));
        assert!(!entry.is_expired(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn subscription_filter_matches() {
        let agent = Uuid::new_v4();
        let entry = MemoryEntry::new("topic", json!("v")).with_agent(agent);
        let event = ChangeEvent {
            kind: ChangeKind::Insert,
            entry,
        };

        assert!(SubscriptionFilter::default().matches(&event));
        assert!(SubscriptionFilter {
            key: Some("topic".into()),
            agent_id: Some(agent),
        }
        .matches(&event));
        assert!(!SubscriptionFilter {
            key: Some("other".into()),
            agent_id: None,
        }
        .matches(&event));
        assert!(!SubscriptionFilter {
            key: None,
            agent_id: Some(Uuid::new_v4()),
        }
        .matches(&event));
    }

    #[test]
    fn query_builder_accumulates_filters() {
        let query = MemoryQuery::new()
            .context("swarm:42")
            .with_tag("result")
            .with_tag("final")
            .limit(10);
        assert_eq!(query.context.as_deref(), Some("swarm:42"));
        assert_eq!(query.tags.len(), 2);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.order_by, MemoryOrderBy::CreatedAt);
        assert_eq!(query.order_dir, OrderDir::Desc);
    }
}
