use std::sync::Arc;

use chrono::NaiveDate;
use chrono::Utc;
use chrono::Datelike;
use ledger_money::Money;
use uuid::Uuid;

use crate::Account;
use crate::CompanyId;
use crate::JournalEntry;
use crate::JournalEntryId;
use crate::JournalLine;
use crate::LedgerError;
use crate::LedgerResult;
use crate::LedgerStore;
use crate::NewLine;

/// Inputs to [`LedgerPoster::post_journal_entry`], mirroring spec §4.2.
pub struct PostJournalEntryInput {
    pub company_id: CompanyId,
    pub date: NaiveDate,
    pub description: String,
    pub created_by_user_id: Option<String>,
    pub location_id: Option<String>,
    pub reversal_of_journal_entry_id: Option<JournalEntryId>,
    pub reversal_reason: Option<String>,
    pub lines: Vec<NewLine>,
    pub skip_account_validation: bool,
}

/// `postJournalEntry(tx, input)` (spec §4.2): validates, balances, allocates
/// a gapless `entryNumber`, and inserts the immutable entry and its lines.
pub struct LedgerPoster {
    store: Arc<dyn LedgerStore>,
}

impl LedgerPoster {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn post_journal_entry(&self, input: PostJournalEntryInput) -> LedgerResult<JournalEntry> {
        if input.lines.is_empty() {
            return Err(LedgerError::Validation("journal entry must contain at least one line".into()));
        }

        if !input.skip_account_validation {
            for line in &input.lines {
                let account = self
                    .store
                    .get_account(&input.company_id, &line.account_id)
                    .await?
                    .ok_or_else(|| LedgerError::Validation(format!("unknown account {}", line.account_id)))?;
                Self::check_account(&input.company_id, &account)?;
            }
        }

        let total_debit = Money::sum(input.lines.iter().map(|line| line.debit))
            .map_err(|err| LedgerError::Internal(err.to_string()))?;
        let total_credit = Money::sum(input.lines.iter().map(|line| line.credit))
            .map_err(|err| LedgerError::Internal(err.to_string()))?;
        if total_debit != total_credit {
            return Err(LedgerError::Unbalanced {
                debit: total_debit,
                credit: total_credit,
            });
        }

        let PostJournalEntryInput {
            company_id,
            date,
            description,
            created_by_user_id,
            location_id,
            reversal_of_journal_entry_id,
            reversal_reason,
            lines,
            skip_account_validation: _,
        } = input;

        let entry_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let new_lines: Vec<JournalLine> = lines
            .into_iter()
            .map(|line| JournalLine {
                id: Uuid::new_v4().to_string(),
                company_id: company_id.clone(),
                journal_entry_id: entry_id.clone(),
                account_id: line.account_id,
                debit: line.debit,
                credit: line.credit,
            })
            .collect();

        let year = date.year();
        let entry_id_for_closure = entry_id.clone();
        let company_id_for_closure = company_id.clone();
        let entry = self
            .store
            .insert_entry(
                &company_id,
                year,
                Box::new(move |entry_number| JournalEntry {
                    id: entry_id_for_closure,
                    company_id: company_id_for_closure,
                    entry_number,
                    date,
                    description,
                    location_id,
                    created_by_user_id,
                    created_at,
                    reversal_of_journal_entry_id,
                    reversal_reason,
                    voided_at: None,
                    void_reason: None,
                    voided_by_user_id: None,
                    lines: new_lines,
                }),
            )
            .await?;

        tracing::info!(
            company_id = %entry.company_id,
            entry_number = %entry.entry_number,
            "posted journal entry"
        );
        Ok(entry)
    }

    fn check_account(company_id: &str, account: &Account) -> LedgerResult<()> {
        if account.company_id != company_id {
            return Err(LedgerError::Validation(format!("account {} does not belong to company", account.id)));
        }
        if !account.allows_posting() {
            return Err(LedgerError::Validation(format!("account {} is not active", account.id)));
        }
        Ok(())
    }
}
