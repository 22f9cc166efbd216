#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Account/JournalEntry/JournalLine/DocumentSequence/PeriodClose data model,
//! the immutable-posting engine ([`poster::LedgerPoster`]) and the command
//! envelope ([`commands::LedgerCommands`]) built on top of it.

pub mod commands;
pub mod memory;
pub mod poster;

use async_trait::async_trait;
use chrono::NaiveDate;
use ledger_money::Money;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub type CompanyId = String;
pub type AccountId = String;
pub type JournalEntryId = String;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("journal entry is unbalanced: debit {debit} != credit {credit}")]
    Unbalanced { debit: Money, credit: Money },
    #[error("{0}")]
    InvalidState(String),
    #[error("already reversed: {0}")]
    AlreadyReversed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    PeriodClosed(#[from] ledger_period_close::PeriodClosePolicyError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl AccountType {
    /// The side on which a balance in this account type normally sits, used
    /// as the default when an account doesn't specify one explicitly.
    #[must_use]
    pub fn default_normal_balance(self) -> NormalBalance {
        match self {
            AccountType::Asset | AccountType::Expense => NormalBalance::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Income => NormalBalance::Credit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportGroup {
    CashAndCashEquivalents,
    AccountsReceivable,
    Inventory,
    OtherCurrentAsset,
    FixedAsset,
    AccountsPayable,
    OtherCurrentLiability,
    LongTermLiability,
    Equity,
    Cogs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashflowActivity {
    Operating,
    Investing,
    Financing,
}

impl ReportGroup {
    /// The cashflow activity implied by a report group when the account
    /// doesn't set `cashflow_activity` explicitly (spec §4.10).
    #[must_use]
    pub fn default_cashflow_activity(self) -> CashflowActivity {
        match self {
            ReportGroup::FixedAsset => CashflowActivity::Investing,
            ReportGroup::LongTermLiability | ReportGroup::Equity => CashflowActivity::Financing,
            _ => CashflowActivity::Operating,
        }
    }
}

/// Chart-of-accounts node. Never deleted once created: ledger references
/// are permanent, so corrections deactivate rather than remove.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub company_id: CompanyId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub normal_balance: NormalBalance,
    pub report_group: Option<ReportGroup>,
    pub cashflow_activity: Option<CashflowActivity>,
    pub is_active: bool,
}

impl Account {
    #[must_use]
    pub fn allows_posting(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn resolved_cashflow_activity(&self) -> CashflowActivity {
        self.cashflow_activity.unwrap_or_else(|| {
            self.report_group
                .map(ReportGroup::default_cashflow_activity)
                .unwrap_or(CashflowActivity::Operating)
        })
    }
}

/// One posted line of a journal entry. Exactly one of `debit`/`credit` is
/// non-zero (both may be zero only in a synthetic closing line whose entry
/// still balances overall).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: String,
    pub company_id: CompanyId,
    pub journal_entry_id: JournalEntryId,
    pub account_id: AccountId,
    pub debit: Money,
    pub credit: Money,
}

/// An input line before an `id`/`journal_entry_id` have been assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLine {
    pub account_id: AccountId,
    pub debit: Money,
    pub credit: Money,
}

/// Atomic, immutable posting. No line may be updated or deleted after
/// insert; corrections are additional entries that reference this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub company_id: CompanyId,
    pub entry_number: String,
    pub date: NaiveDate,
    pub description: String,
    pub location_id: Option<String>,
    pub created_by_user_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub reversal_of_journal_entry_id: Option<JournalEntryId>,
    pub reversal_reason: Option<String>,
    pub voided_at: Option<chrono::DateTime<chrono::Utc>>,
    pub void_reason: Option<String>,
    pub voided_by_user_id: Option<String>,
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    pub fn total_debit(&self) -> LedgerResult<Money> {
        Money::sum(self.lines.iter().map(|line| line.debit)).map_err(|err| LedgerError::Internal(err.to_string()))
    }

    pub fn total_credit(&self) -> LedgerResult<Money> {
        Money::sum(self.lines.iter().map(|line| line.credit)).map_err(|err| LedgerError::Internal(err.to_string()))
    }

    pub fn is_balanced(&self) -> LedgerResult<bool> {
        Ok(self.total_debit()? == self.total_credit()?)
    }

    #[must_use]
    pub fn is_reversal(&self) -> bool {
        self.reversal_of_journal_entry_id.is_some()
    }

    #[must_use]
    pub fn is_voided(&self) -> bool {
        self.voided_at.is_some()
    }
}

/// Gapless per-tenant-year numbering source for `entryNumber`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSequence {
    pub company_id: CompanyId,
    pub key: String,
    pub next_number: u32,
}

/// A closed, non-overlapping `[from_date, to_date]` range together with the
/// closing journal entry that zeroed income/expense for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodClose {
    pub company_id: CompanyId,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub journal_entry_id: JournalEntryId,
    pub created_by_user_id: Option<String>,
}

/// Persistence seam for the ledger's core tables. The in-memory
/// implementation guards all of them behind a single mutex, standing in
/// for row-level locking (spec §5).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_account_by_code(&self, company_id: &str, code: &str) -> LedgerResult<Option<Account>>;
    async fn get_account(&self, company_id: &str, account_id: &str) -> LedgerResult<Option<Account>>;
    async fn list_accounts(&self, company_id: &str) -> LedgerResult<Vec<Account>>;
    async fn upsert_account(&self, account: Account) -> LedgerResult<Account>;

    /// Allocates the next `entryNumber` for `key` (`JOURNAL_ENTRY:<year>`)
    /// and inserts `entry`, atomically with respect to other callers.
    async fn insert_entry(
        &self,
        company_id: &str,
        year: i32,
        build: Box<dyn FnOnce(String) -> JournalEntry + Send>,
    ) -> LedgerResult<JournalEntry>;

    async fn get_entry(&self, company_id: &str, entry_id: &str) -> LedgerResult<Option<JournalEntry>>;

    /// The existing reversal of `entry_id`, if one has already been posted.
    async fn find_reversal_of(&self, company_id: &str, entry_id: &str) -> LedgerResult<Option<JournalEntry>>;

    async fn mark_voided(
        &self,
        company_id: &str,
        entry_id: &str,
        voided_at: chrono::DateTime<chrono::Utc>,
        reason: String,
        voided_by_user_id: Option<String>,
    ) -> LedgerResult<JournalEntry>;

    /// Entries in `(date, id)` order for the given inclusive range.
    async fn list_entries_in_range(
        &self,
        company_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<JournalEntry>>;

    async fn list_entries(&self, company_id: &str) -> LedgerResult<Vec<JournalEntry>>;

    async fn record_period_close(&self, close: PeriodClose) -> LedgerResult<()>;
    async fn list_period_closes(&self, company_id: &str) -> LedgerResult<Vec<PeriodClose>>;

    /// `max(to_date)` across recorded closes, i.e. the tenant's
    /// closed-through date consulted by [`ledger_period_close`].
    async fn closed_through(&self, company_id: &str) -> LedgerResult<Option<NaiveDate>>;
}
