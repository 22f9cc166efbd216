use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::Account;
use crate::CompanyId;
use crate::DocumentSequence;
use crate::JournalEntry;
use crate::JournalEntryId;
use crate::LedgerError;
use crate::LedgerResult;
use crate::LedgerStore;
use crate::PeriodClose;

/// In-memory `LedgerStore`. A single mutex over the whole state stands in
/// for per-row locking (spec §5): it is sufficient to honor the ordering
/// and shared-resource invariants without claiming real multi-process
/// durability.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<(CompanyId, String), Account>,
    sequences: HashMap<(CompanyId, String), u32>,
    entries: HashMap<(CompanyId, JournalEntryId), JournalEntry>,
    period_closes: HashMap<CompanyId, Vec<PeriodClose>>,
}

impl InMemoryLedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_account_by_code(&self, company_id: &str, code: &str) -> LedgerResult<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .get(&(company_id.to_string(), code.to_string()))
            .cloned())
    }

    async fn get_account(&self, company_id: &str, account_id: &str) -> LedgerResult<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|account| account.company_id == company_id && account.id == account_id)
            .cloned())
    }

    async fn list_accounts(&self, company_id: &str) -> LedgerResult<Vec<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .filter(|account| account.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn upsert_account(&self, account: Account) -> LedgerResult<Account> {
        let mut state = self.state.lock().await;
        let key = (account.company_id.clone(), account.code.clone());
        if let Some(existing) = state.accounts.get(&key)
            && existing.id != account.id
        {
            return Err(LedgerError::Validation(format!(
                "account code {} already exists",
                account.code
            )));
        }
        state.accounts.insert(key, account.clone());
        Ok(account)
    }

    async fn insert_entry(
        &self,
        company_id: &str,
        year: i32,
        build: Box<dyn FnOnce(String) -> JournalEntry + Send>,
    ) -> LedgerResult<JournalEntry> {
        let mut state = self.state.lock().await;
        let sequence_key = (company_id.to_string(), format!("JOURNAL_ENTRY:{year}"));
        let next_number = state.sequences.entry(sequence_key).or_insert(0);
        *next_number += 1;
        let entry_number = format!("JE-{year}-{next_number:04}");

        let entry = build(entry_number);
        state
            .entries
            .insert((company_id.to_string(), entry.id.clone()), entry.clone());
        Ok(entry)
    }

    async fn get_entry(&self, company_id: &str, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .get(&(company_id.to_string(), entry_id.to_string()))
            .cloned())
    }

    async fn find_reversal_of(&self, company_id: &str, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .values()
            .find(|entry| entry.company_id == company_id && entry.reversal_of_journal_entry_id.as_deref() == Some(entry_id))
            .cloned())
    }

    async fn mark_voided(
        &self,
        company_id: &str,
        entry_id: &str,
        voided_at: DateTime<Utc>,
        reason: String,
        voided_by_user_id: Option<String>,
    ) -> LedgerResult<JournalEntry> {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .get_mut(&(company_id.to_string(), entry_id.to_string()))
            .ok_or_else(|| LedgerError::NotFound(format!("journal entry {entry_id}")))?;
        entry.voided_at = Some(voided_at);
        entry.void_reason = Some(reason);
        entry.voided_by_user_id = voided_by_user_id;
        Ok(entry.clone())
    }

    async fn list_entries_in_range(
        &self,
        company_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<JournalEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<JournalEntry> = state
            .entries
            .values()
            .filter(|entry| entry.company_id == company_id && entry.date >= from && entry.date <= to)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn list_entries(&self, company_id: &str) -> LedgerResult<Vec<JournalEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<JournalEntry> = state
            .entries
            .values()
            .filter(|entry| entry.company_id == company_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn record_period_close(&self, close: PeriodClose) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        state
            .period_closes
            .entry(close.company_id.clone())
            .or_default()
            .push(close);
        Ok(())
    }

    async fn list_period_closes(&self, company_id: &str) -> LedgerResult<Vec<PeriodClose>> {
        let state = self.state.lock().await;
        Ok(state.period_closes.get(company_id).cloned().unwrap_or_default())
    }

    async fn closed_through(&self, company_id: &str) -> LedgerResult<Option<NaiveDate>> {
        let state = self.state.lock().await;
        Ok(state
            .period_closes
            .get(company_id)
            .and_then(|closes| closes.iter().map(|close| close.to_date).max()))
    }
}
