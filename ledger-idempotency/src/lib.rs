#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Exactly-once command effects keyed by tenant + idempotency key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::sleep;

pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("idempotency key reused with a different request")]
    KeyConflict,
    #[error("concurrent duplicate did not resolve within timeout")]
    Conflict,
    #[error("storage failure: {0}")]
    Storage(String),
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub company_id: String,
    pub key: String,
    pub request_fingerprint: String,
    pub status: IdempotencyStatus,
    pub response_body: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub enum BeginOutcome {
    Started,
    Duplicate(IdempotencyRecord),
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn try_begin(
        &self,
        company_id: &str,
        key: &str,
        fingerprint: &str,
    ) -> IdempotencyResult<BeginOutcome>;

    async fn get(&self, company_id: &str, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>>;

    async fn complete(
        &self,
        company_id: &str,
        key: &str,
        response_body: serde_json::Value,
    ) -> IdempotencyResult<()>;

    async fn fail(&self, company_id: &str, key: &str, error_message: &str) -> IdempotencyResult<()>;
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    records: RwLock<HashMap<(String, String), IdempotencyRecord>>,
}

impl InMemoryIdempotencyStore {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_begin(
        &self,
        company_id: &str,
        key: &str,
        fingerprint: &str,
    ) -> IdempotencyResult<BeginOutcome> {
        let mut guard = self.records.write().await;
        let map_key = (company_id.to_string(), key.to_string());
        if let Some(existing) = guard.get(&map_key) {
            return Ok(BeginOutcome::Duplicate(existing.clone()));
        }
        guard.insert(
            map_key,
            IdempotencyRecord {
                company_id: company_id.to_string(),
                key: key.to_string(),
                request_fingerprint: fingerprint.to_string(),
                status: IdempotencyStatus::InProgress,
                response_body: None,
                error_message: None,
                created_at: Utc::now(),
                completed_at: None,
            },
        );
        Ok(BeginOutcome::Started)
    }

    async fn get(&self, company_id: &str, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let guard = self.records.read().await;
        Ok(guard
            .get(&(company_id.to_string(), key.to_string()))
            .cloned())
    }

    async fn complete(
        &self,
        company_id: &str,
        key: &str,
        response_body: serde_json::Value,
    ) -> IdempotencyResult<()> {
        let mut guard = self.records.write().await;
        let record = guard
            .get_mut(&(company_id.to_string(), key.to_string()))
            .ok_or_else(|| IdempotencyError::Storage("idempotency record vanished".into()))?;
        record.status = IdempotencyStatus::Completed;
        record.response_body = Some(response_body);
        record.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, company_id: &str, key: &str, error_message: &str) -> IdempotencyResult<()> {
        let mut guard = self.records.write().await;
        let record = guard
            .get_mut(&(company_id.to_string(), key.to_string()))
            .ok_or_else(|| IdempotencyError::Storage("idempotency record vanished".into()))?;
        record.status = IdempotencyStatus::Failed;
        record.error_message = Some(error_message.to_string());
        record.completed_at = Some(Utc::now());
        Ok(())
    }
}

pub struct IdempotentOutcome<R> {
    pub replay: bool,
    pub response: R,
}

/// Polling parameters for resolving a concurrent duplicate. Defaults match
/// the 30s command-mutation lock TTL the rest of the engine uses, so a
/// duplicate caller waits roughly as long as the original could plausibly
/// hold its locks.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(25),
        }
    }
}

/// `runIdempotent(companyId, key, requestFingerprint, fn)` from the spec.
pub struct IdempotencyRunner {
    store: Arc<dyn IdempotencyStore>,
    poll: PollConfig,
}

impl IdempotencyRunner {
    #[must_use]
    pub fn new(store: Arc<dyn IdempotencyStore>, poll: PollConfig) -> Self {
        Self { store, poll }
    }

    pub async fn run_idempotent<F, Fut, R>(
        &self,
        company_id: &str,
        key: &str,
        request_fingerprint: &str,
        f: F,
    ) -> IdempotencyResult<IdempotentOutcome<R>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
        R: Serialize + DeserializeOwned,
    {
        match self.store.try_begin(company_id, key, request_fingerprint).await? {
            BeginOutcome::Started => match f().await {
                Ok(response) => {
                    let body = serde_json::to_value(&response)
                        .map_err(|err| IdempotencyError::Storage(err.to_string()))?;
                    self.store.complete(company_id, key, body).await?;
                    Ok(IdempotentOutcome {
                        replay: false,
                        response,
                    })
                }
                Err(err) => {
                    self.store.fail(company_id, key, &err.to_string()).await?;
                    Err(IdempotencyError::Handler(err))
                }
            },
            BeginOutcome::Duplicate(record) => {
                if record.request_fingerprint != request_fingerprint {
                    return Err(IdempotencyError::KeyConflict);
                }
                self.await_resolution(company_id, key, record).await
            }
        }
    }

    async fn await_resolution<R>(
        &self,
        company_id: &str,
        key: &str,
        mut record: IdempotencyRecord,
    ) -> IdempotencyResult<IdempotentOutcome<R>>
    where
        R: DeserializeOwned,
    {
        let deadline = tokio::time::Instant::now() + self.poll.timeout;
        loop {
            match record.status {
                IdempotencyStatus::Completed => {
                    let body = record
                        .response_body
                        .ok_or_else(|| IdempotencyError::Storage("missing response body".into()))?;
                    let response = serde_json::from_value(body)
                        .map_err(|err| IdempotencyError::Storage(err.to_string()))?;
                    tracing::debug!(company_id, key, "idempotency replay hit");
                    return Ok(IdempotentOutcome {
                        replay: true,
                        response,
                    });
                }
                IdempotencyStatus::Failed => {
                    return Err(IdempotencyError::Handler(anyhow::anyhow!(
                        record.error_message.unwrap_or_default()
                    )));
                }
                IdempotencyStatus::InProgress => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(IdempotencyError::Conflict);
                    }
                    sleep(self.poll.interval).await;
                    record = self
                        .store
                        .get(company_id, key)
                        .await?
                        .ok_or_else(|| IdempotencyError::Storage("idempotency record vanished".into()))?;
                }
            }
        }
    }
}
