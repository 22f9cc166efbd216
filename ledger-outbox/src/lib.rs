#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Transactional outbox: domain events staged alongside a business write and
//! drained later by a publisher. This crate specifies the table shape and an
//! in-process publisher trait; it does not implement network delivery (the
//! publisher process is an external collaborator).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type OutboxResult<T> = Result<T, OutboxError>;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

pub mod event_types {
    pub const JOURNAL_ENTRY_CREATED: &str = "journal.entry.created";
    pub const JOURNAL_ENTRY_REVERSED: &str = "journal.entry.reversed";
    pub const INVENTORY_RECALC_REQUESTED: &str = "inventory.recalc.requested";
}

/// A not-yet-persisted event, as produced by a business command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub company_id: String,
    pub event_type: String,
    pub schema_version: u32,
    pub source: String,
    pub partition_key: String,
    pub correlation_id: String,
    pub causation_id: Option<String>,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub event_id: String,
    pub company_id: String,
    pub event_type: String,
    pub schema_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub source: String,
    pub partition_key: String,
    pub correlation_id: String,
    pub causation_id: Option<String>,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub last_publish_error: Option<String>,
}

impl EventRecord {
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends the event inside whatever transaction the caller is
    /// already holding. The in-memory implementation has no separate
    /// transaction to join; callers are expected to call this in the same
    /// async task as the business write it accompanies.
    async fn append(&self, event: NewEvent) -> OutboxResult<EventRecord>;

    /// Unpublished rows ordered by `(created_at, id)`.
    async fn list_unpublished(&self, limit: usize) -> OutboxResult<Vec<EventRecord>>;

    async fn mark_published(&self, id: &str) -> OutboxResult<()>;

    async fn mark_publish_error(&self, id: &str, error: &str) -> OutboxResult<()>;

    async fn list_for_company(&self, company_id: &str) -> OutboxResult<Vec<EventRecord>>;
}

#[derive(Default)]
pub struct InMemoryOutboxStore {
    events: RwLock<Vec<EventRecord>>,
}

impl InMemoryOutboxStore {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn validate(event: &NewEvent) -> OutboxResult<()> {
        if event.company_id.trim().is_empty() {
            return Err(OutboxError::Validation("company_id is required".into()));
        }
        if event.event_type.trim().is_empty() {
            return Err(OutboxError::Validation("event_type is required".into()));
        }
        if event.correlation_id.trim().is_empty() {
            return Err(OutboxError::Validation("correlation_id is required".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(&self, event: NewEvent) -> OutboxResult<EventRecord> {
        Self::validate(&event)?;
        let now = Utc::now();
        let record = EventRecord {
            id: Uuid::new_v4().to_string(),
            event_id: Uuid::new_v4().to_string(),
            company_id: event.company_id,
            event_type: event.event_type,
            schema_version: event.schema_version,
            occurred_at: now,
            source: event.source,
            partition_key: event.partition_key,
            correlation_id: event.correlation_id,
            causation_id: event.causation_id,
            aggregate_type: event.aggregate_type,
            aggregate_id: event.aggregate_id,
            payload: event.payload,
            created_at: now,
            published_at: None,
            last_publish_error: None,
        };
        self.events.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_unpublished(&self, limit: usize) -> OutboxResult<Vec<EventRecord>> {
        let guard = self.events.read().await;
        let mut pending: Vec<EventRecord> = guard
            .iter()
            .filter(|event| !event.is_published())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_published(&self, id: &str) -> OutboxResult<()> {
        let mut guard = self.events.write().await;
        let event = guard
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or_else(|| OutboxError::Storage(format!("no event with id {id}")))?;
        event.published_at = Some(Utc::now());
        event.last_publish_error = None;
        Ok(())
    }

    async fn mark_publish_error(&self, id: &str, error: &str) -> OutboxResult<()> {
        let mut guard = self.events.write().await;
        let event = guard
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or_else(|| OutboxError::Storage(format!("no event with id {id}")))?;
        event.last_publish_error = Some(error.to_string());
        Ok(())
    }

    async fn list_for_company(&self, company_id: &str) -> OutboxResult<Vec<EventRecord>> {
        let guard = self.events.read().await;
        let mut events: Vec<EventRecord> = guard
            .iter()
            .filter(|event| event.company_id == company_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }
}

/// Downstream delivery target for a drained event. Stands in for the
/// external publisher process described in the spec's outbox section.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    async fn handle(&self, event: &EventRecord) -> Result<(), String>;
}

/// Tracks which `(event_id, company_id)` pairs a downstream consumer has
/// already applied, so at-least-once delivery can be made idempotent.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Returns `true` if this is the first time the pair has been seen.
    async fn mark_processed(&self, event_id: &str, company_id: &str) -> OutboxResult<bool>;
}

#[derive(Default)]
pub struct InMemoryProcessedEventStore {
    seen: RwLock<std::collections::HashSet<(String, String)>>,
}

impl InMemoryProcessedEventStore {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn mark_processed(&self, event_id: &str, company_id: &str) -> OutboxResult<bool> {
        let mut guard = self.seen.write().await;
        Ok(guard.insert((event_id.to_string(), company_id.to_string())))
    }
}

/// Drains pending outbox rows to a consumer, in `(created_at, id)` order,
/// marking each row published on success or recording the error otherwise.
pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    consumer: Arc<dyn EventConsumer>,
}

impl OutboxPublisher {
    #[must_use]
    pub fn new(store: Arc<dyn OutboxStore>, consumer: Arc<dyn EventConsumer>) -> Self {
        Self { store, consumer }
    }

    /// Attempts delivery of up to `batch_size` pending events. Returns the
    /// number successfully published. A consumer failure does not stop the
    /// batch: later events are still attempted, matching an at-least-once,
    /// per-event retry model.
    pub async fn publish_pending(&self, batch_size: usize) -> OutboxResult<usize> {
        let pending = self.store.list_unpublished(batch_size).await?;
        let mut published = 0;
        for event in pending {
            match self.consumer.handle(&event).await {
                Ok(()) => {
                    self.store.mark_published(&event.id).await?;
                    published += 1;
                }
                Err(error) => {
                    self.store.mark_publish_error(&event.id, &error).await?;
                }
            }
        }
        Ok(published)
    }
}
