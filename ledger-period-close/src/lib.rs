#![deny(clippy::print_stdout, clippy::print_stderr)]

//! `assertOpenPeriod(companyId, transactionDate, action)` from the spec.
//!
//! The policy itself is a pure function over a `closed_through` date:
//! callers (ledger-core, ledger-inventory) compute that date from their own
//! `PeriodClose` records and pass it in, so this crate never depends back on
//! either of them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::RwLock;

pub type CompanyId = String;
pub type PeriodCloseResult<T> = Result<T, PeriodClosePolicyError>;

/// Which kind of mutation is being checked against the closed-through date.
/// Carried only for error reporting; the policy itself applies uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodCloseAction {
    PostJournalEntry,
    ReverseJournalEntry,
    VoidJournalEntry,
    AdjustJournalEntry,
    InventoryOpeningBalance,
    InventoryAdjustment,
    PeriodClose,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeriodClosePolicyError {
    #[error(
        "transaction date {transaction_date} falls on or before the closed-through date {closed_through} for action {action:?}"
    )]
    PeriodClosed {
        closed_through: NaiveDate,
        transaction_date: NaiveDate,
        action: PeriodCloseAction,
    },
    #[error("period close range {from}..={to} overlaps an already-closed range {existing_from}..={existing_to}")]
    RangeOverlap {
        from: NaiveDate,
        to: NaiveDate,
        existing_from: NaiveDate,
        existing_to: NaiveDate,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Day-precision, inclusive: `transaction_date <= closed_through` is
/// rejected, every later date is open. Applied uniformly to every mutating
/// command that carries a transaction date, including a reversal's own
/// date and inventory opening balances.
pub fn assert_open_period(
    closed_through: Option<NaiveDate>,
    transaction_date: NaiveDate,
    action: PeriodCloseAction,
) -> PeriodCloseResult<()> {
    if let Some(closed_through) = closed_through
        && transaction_date <= closed_through
    {
        return Err(PeriodClosePolicyError::PeriodClosed {
            closed_through,
            transaction_date,
            action,
        });
    }
    Ok(())
}

/// A previously-closed, non-overlapping `[from, to]` range. Mirrors the
/// shape of `ledger-core`'s `PeriodClose` row without depending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Checks a proposed `[from, to]` range against already-closed ranges for
/// the tenant, used by the period-close command itself before it opens a
/// new range (a distinct check from the closed-through date check above).
pub fn assert_range_does_not_overlap(
    existing: &[ClosedRange],
    from: NaiveDate,
    to: NaiveDate,
) -> PeriodCloseResult<()> {
    for range in existing {
        if from <= range.to && range.from <= to {
            return Err(PeriodClosePolicyError::RangeOverlap {
                from,
                to,
                existing_from: range.from,
                existing_to: range.to,
            });
        }
    }
    Ok(())
}

#[must_use]
pub fn closed_through(existing: &[ClosedRange]) -> Option<NaiveDate> {
    existing.iter().map(|range| range.to).max()
}

/// Tracks each tenant's closed ranges so callers who don't already keep
/// their own `PeriodClose` rows in memory (e.g. a standalone reporting
/// path) can still ask "is this date open".
#[async_trait]
pub trait ClosedThroughStore: Send + Sync {
    async fn record_close(&self, company_id: &CompanyId, range: ClosedRange) -> PeriodCloseResult<()>;
    async fn ranges(&self, company_id: &CompanyId) -> PeriodCloseResult<Vec<ClosedRange>>;
}

#[derive(Default)]
pub struct InMemoryClosedThroughStore {
    ranges: RwLock<HashMap<CompanyId, Vec<ClosedRange>>>,
}

impl InMemoryClosedThroughStore {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ClosedThroughStore for InMemoryClosedThroughStore {
    async fn record_close(&self, company_id: &CompanyId, range: ClosedRange) -> PeriodCloseResult<()> {
        let mut guard = self.ranges.write().await;
        guard.entry(company_id.clone()).or_default().push(range);
        Ok(())
    }

    async fn ranges(&self, company_id: &CompanyId) -> PeriodCloseResult<Vec<ClosedRange>> {
        let guard = self.ranges.read().await;
        Ok(guard.get(company_id).cloned().unwrap_or_default())
    }
}

#[cfg(feature = "postgres-store")]
#[derive(Clone)]
pub struct PostgresClosedThroughStore {
    connection_string: String,
}

#[cfg(feature = "postgres-store")]
impl PostgresClosedThroughStore {
    /// # Schema Draft
    /// ```sql
    /// CREATE TABLE period_closes (
    ///     company_id TEXT NOT NULL,
    ///     from_date DATE NOT NULL,
    ///     to_date DATE NOT NULL,
    ///     journal_entry_id TEXT NOT NULL,
    ///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    ///     PRIMARY KEY (company_id, from_date, to_date)
    /// );
    /// ```
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[cfg(feature = "postgres-store")]
#[async_trait]
impl ClosedThroughStore for PostgresClosedThroughStore {
    async fn record_close(&self, company_id: &CompanyId, range: ClosedRange) -> PeriodCloseResult<()> {
        let _ = (&self.connection_string, company_id, range);
        Err(PeriodClosePolicyError::Storage(
            "postgres store persistence not yet implemented".into(),
        ))
    }

    async fn ranges(&self, company_id: &CompanyId) -> PeriodCloseResult<Vec<ClosedRange>> {
        let _ = (&self.connection_string, company_id);
        Err(PeriodClosePolicyError::Storage(
            "postgres store persistence not yet implemented".into(),
        ))
    }
}
