#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Structured, hash-chained audit log.
//!
//! Each appended record carries the hash of the previous record in the same
//! tenant's chain, so tampering with any stored record is detectable on the
//! next read via [`AuditLog::records`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type AuditLogResult<T> = Result<T, AuditLogError>;

#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("corrupted chain: {0}")]
    Corrupted(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub company_id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub company_id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub previous_hash: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub company_id: Option<String>,
    pub entity_id: Option<String>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, request: AppendRequest) -> AuditLogResult<AuditRecord>;

    async fn records(&self, filter: AuditLogFilter) -> AuditLogResult<Vec<AuditRecord>>;
}

/// In-memory audit log. One hash chain per tenant, enforced at write time
/// by keying the "previous hash" lookup on `company_id`.
#[derive(Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_hash(
        previous: &str,
        company_id: &str,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
        created_at: DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(previous.as_bytes());
        hasher.update(company_id.as_bytes());
        hasher.update(action.as_bytes());
        hasher.update(entity_type.as_bytes());
        hasher.update(entity_id.unwrap_or_default().as_bytes());
        let nanos = created_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| created_at.timestamp_micros() * 1_000);
        hasher.update(nanos.to_be_bytes());
        hasher.update(metadata.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn validate_request(request: &AppendRequest) -> AuditLogResult<()> {
        if request.company_id.trim().is_empty() {
            return Err(AuditLogError::Validation(
                "company_id must be provided".into(),
            ));
        }
        if request.action.trim().is_empty() {
            return Err(AuditLogError::Validation("action must be provided".into()));
        }
        if request.entity_type.trim().is_empty() {
            return Err(AuditLogError::Validation(
                "entity_type must be provided".into(),
            ));
        }
        Ok(())
    }

    async fn verify_chain(company_id: &str, records: &[AuditRecord]) -> AuditLogResult<()> {
        let mut previous = String::from("genesis");
        for record in records.iter().filter(|r| r.company_id == company_id) {
            if record.previous_hash != previous {
                return Err(AuditLogError::Corrupted(format!(
                    "unexpected previous hash for {}",
                    record.id
                )));
            }
            let expected = Self::compute_hash(
                &record.previous_hash,
                &record.company_id,
                &record.action,
                &record.entity_type,
                record.entity_id.as_deref(),
                record.created_at,
                &record.metadata,
            );
            if expected != record.hash {
                return Err(AuditLogError::Corrupted(format!(
                    "hash mismatch for {}",
                    record.id
                )));
            }
            previous = record.hash.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, request: AppendRequest) -> AuditLogResult<AuditRecord> {
        Self::validate_request(&request)?;

        let mut guard = self.records.write().await;
        let previous_hash = guard
            .iter()
            .rev()
            .find(|record| record.company_id == request.company_id)
            .map(|record| record.hash.clone())
            .unwrap_or_else(|| "genesis".into());

        let created_at = Utc::now();
        let hash = Self::compute_hash(
            &previous_hash,
            &request.company_id,
            &request.action,
            &request.entity_type,
            request.entity_id.as_deref(),
            created_at,
            &request.metadata,
        );

        let record = AuditRecord {
            id: Uuid::new_v4().to_string(),
            company_id: request.company_id,
            user_id: request.user_id,
            action: request.action,
            entity_type: request.entity_type,
            entity_id: request.entity_id,
            idempotency_key: request.idempotency_key,
            correlation_id: request.correlation_id,
            metadata: request.metadata,
            created_at,
            previous_hash,
            hash,
        };

        guard.push(record.clone());
        Ok(record)
    }

    async fn records(&self, filter: AuditLogFilter) -> AuditLogResult<Vec<AuditRecord>> {
        let guard = self.records.read().await;
        if let Some(company_id) = &filter.company_id {
            Self::verify_chain(company_id, &guard).await?;
        }
        let mut filtered: Vec<AuditRecord> = guard.clone();

        if let Some(company_id) = &filter.company_id {
            filtered.retain(|record| &record.company_id == company_id);
        }
        if let Some(entity_id) = &filter.entity_id {
            filtered.retain(|record| record.entity_id.as_deref() == Some(entity_id.as_str()));
        }
        if let Some(limit) = filter.limit
            && filtered.len() > limit
        {
            filtered.truncate(limit);
        }

        Ok(filtered)
    }
}
