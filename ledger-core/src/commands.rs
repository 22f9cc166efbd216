use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use chrono::Utc;
use ledger_audit::AppendRequest;
use ledger_audit::AuditLog;
use ledger_locks::LockManager;
use ledger_locks::keys;
use ledger_outbox::NewEvent;
use ledger_outbox::OutboxStore;
use ledger_outbox::event_types;
use ledger_period_close::ClosedThroughStore;
use ledger_period_close::PeriodCloseAction;
use ledger_period_close::assert_open_period;
use serde_json::json;

use crate::CompanyId;
use crate::JournalEntry;
use crate::JournalEntryId;
use crate::LedgerError;
use crate::LedgerResult;
use crate::LedgerStore;
use crate::NewLine;
use crate::PeriodClose;
use crate::poster::LedgerPoster;
use crate::poster::PostJournalEntryInput;

const LOCK_TTL: Duration = Duration::from_secs(10);

pub struct CreateManualEntryInput {
    pub company_id: CompanyId,
    pub date: NaiveDate,
    pub description: String,
    pub created_by_user_id: Option<String>,
    pub location_id: Option<String>,
    pub lines: Vec<NewLine>,
    pub skip_account_validation: bool,
    pub correlation_id: Option<String>,
}

pub struct ReverseEntryInput {
    pub company_id: CompanyId,
    pub entry_id: JournalEntryId,
    pub reversal_date: NaiveDate,
    pub reason: String,
    pub created_by_user_id: Option<String>,
    pub correlation_id: Option<String>,
}

pub struct VoidEntryInput {
    pub company_id: CompanyId,
    pub entry_id: JournalEntryId,
    pub reason: String,
    pub voided_by_user_id: Option<String>,
    pub correlation_id: Option<String>,
}

pub struct AdjustEntryInput {
    pub company_id: CompanyId,
    pub entry_id: JournalEntryId,
    pub adjustment_date: NaiveDate,
    pub reason: String,
    pub corrected_lines: Vec<NewLine>,
    pub created_by_user_id: Option<String>,
    pub correlation_id: Option<String>,
}

pub struct PeriodCloseInput {
    pub company_id: CompanyId,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub closing_entry_id: JournalEntryId,
    pub created_by_user_id: Option<String>,
}

/// The command envelope on top of [`LedgerPoster`] (spec §4.3): every
/// mutation checks the tenant's closed-through date, runs under the
/// journal-entry lock key, stages its outbox events, and leaves an audit
/// trail entry.
pub struct LedgerCommands {
    store: Arc<dyn LedgerStore>,
    poster: LedgerPoster,
    outbox: Arc<dyn OutboxStore>,
    audit: Arc<dyn AuditLog>,
    closed_through_store: Arc<dyn ClosedThroughStore>,
    locks: Arc<LockManager>,
}

impl LedgerCommands {
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        outbox: Arc<dyn OutboxStore>,
        audit: Arc<dyn AuditLog>,
        closed_through_store: Arc<dyn ClosedThroughStore>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            poster: LedgerPoster::new(store.clone()),
            store,
            outbox,
            audit,
            closed_through_store,
            locks,
        }
    }

    async fn assert_period_open(&self, company_id: &str, date: NaiveDate, action: PeriodCloseAction) -> LedgerResult<()> {
        let closed_through = self.store.closed_through(company_id).await?;
        assert_open_period(closed_through, date, action)?;
        Ok(())
    }

    async fn emit(&self, company_id: &str, event_type: &str, entry: &JournalEntry, correlation_id: &str, causation_id: Option<String>) -> LedgerResult<String> {
        let record = self
            .outbox
            .append(NewEvent {
                company_id: company_id.to_string(),
                event_type: event_type.to_string(),
                schema_version: 1,
                source: "ledger-core".into(),
                partition_key: entry.id.clone(),
                correlation_id: correlation_id.to_string(),
                causation_id,
                aggregate_type: "journal_entry".into(),
                aggregate_id: entry.id.clone(),
                payload: json!({
                    "journal_entry_id": entry.id,
                    "entry_number": entry.entry_number,
                    "date": entry.date,
                }),
            })
            .await
            .map_err(|err| LedgerError::Internal(err.to_string()))?;
        Ok(record.id)
    }

    async fn audit(&self, company_id: &str, action: &str, entity_id: &str, user_id: Option<String>, correlation_id: Option<String>) -> LedgerResult<()> {
        self.audit
            .append(AppendRequest {
                company_id: company_id.to_string(),
                user_id,
                action: action.to_string(),
                entity_type: "journal_entry".into(),
                entity_id: Some(entity_id.to_string()),
                idempotency_key: None,
                correlation_id,
                metadata: serde_json::Value::Null,
            })
            .await
            .map_err(|err| LedgerError::Internal(err.to_string()))?;
        Ok(())
    }

    /// `CreateManual` (spec §4.3): posts a balanced entry and emits a single
    /// `journal.entry.created` event.
    pub async fn create_manual(&self, input: CreateManualEntryInput) -> LedgerResult<JournalEntry> {
        self.assert_period_open(&input.company_id, input.date, PeriodCloseAction::PostJournalEntry).await?;

        let company_id = input.company_id.clone();
        let lock_key = keys::journal_entry(&company_id, "new");
        let poster = &self.poster;
        let entry = self
            .locks
            .with_locks(vec![lock_key], LOCK_TTL, || async move {
                poster
                    .post_journal_entry(PostJournalEntryInput {
                        company_id: input.company_id,
                        date: input.date,
                        description: input.description,
                        created_by_user_id: input.created_by_user_id,
                        location_id: input.location_id,
                        reversal_of_journal_entry_id: None,
                        reversal_reason: None,
                        lines: input.lines,
                        skip_account_validation: input.skip_account_validation,
                    })
                    .await
            })
            .await?;

        let correlation_id = entry.id.clone();
        self.emit(&company_id, event_types::JOURNAL_ENTRY_CREATED, &entry, &correlation_id, None).await?;
        self.audit(&company_id, "journal_entry.created", &entry.id, entry.created_by_user_id.clone(), Some(correlation_id)).await?;
        Ok(entry)
    }

    /// `Reverse` (spec §4.3): posts a new entry with every line's debit/credit
    /// swapped and `reversalOfJournalEntryId` set, then emits
    /// `journal.entry.created` followed by `journal.entry.reversed` whose
    /// `causationId` is the created event's id.
    pub async fn reverse(&self, input: ReverseEntryInput) -> LedgerResult<JournalEntry> {
        let original = self
            .store
            .get_entry(&input.company_id, &input.entry_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("journal entry {}", input.entry_id)))?;
        if original.is_voided() {
            return Err(LedgerError::InvalidState(format!("journal entry {} is voided", original.id)));
        }
        if original.is_reversal() {
            return Err(LedgerError::InvalidState(format!(
                "journal entry {} is itself a reversal and cannot be reversed",
                original.id
            )));
        }
        if self.store.find_reversal_of(&input.company_id, &original.id).await?.is_some() {
            return Err(LedgerError::AlreadyReversed(format!("journal entry {} has already been reversed", original.id)));
        }

        self.assert_period_open(&input.company_id, input.reversal_date, PeriodCloseAction::ReverseJournalEntry).await?;

        let reversed_lines: Vec<NewLine> = original
            .lines
            .iter()
            .map(|line| NewLine {
                account_id: line.account_id.clone(),
                debit: line.credit,
                credit: line.debit,
            })
            .collect();

        let company_id = input.company_id.clone();
        let lock_key = keys::journal_entry(&company_id, &original.id);
        let poster = &self.poster;
        let reversal_date = input.reversal_date;
        let reason = input.reason.clone();
        let created_by_user_id = input.created_by_user_id.clone();
        let original_id = original.id.clone();
        let reversal = self
            .locks
            .with_locks(vec![lock_key], LOCK_TTL, || async move {
                poster
                    .post_journal_entry(PostJournalEntryInput {
                        company_id: company_id.clone(),
                        date: reversal_date,
                        description: format!("Reversal of {original_id}: {reason}"),
                        created_by_user_id,
                        location_id: None,
                        reversal_of_journal_entry_id: Some(original_id),
                        reversal_reason: Some(reason),
                        lines: reversed_lines,
                        skip_account_validation: true,
                    })
                    .await
            })
            .await?;

        let correlation_id = input.correlation_id.clone().unwrap_or_else(|| reversal.id.clone());
        let created_event_id = self.emit(&input.company_id, event_types::JOURNAL_ENTRY_CREATED, &reversal, &correlation_id, None).await?;
        self.emit(&input.company_id, event_types::JOURNAL_ENTRY_REVERSED, &reversal, &correlation_id, Some(created_event_id)).await?;
        self.audit(&input.company_id, "journal_entry.reversed", &original.id, input.created_by_user_id, Some(correlation_id)).await?;
        Ok(reversal)
    }

    /// `Void` (spec §4.3): the same as `Reverse` — it posts a new entry with
    /// every line's debit/credit swapped — plus it stamps `voidedAt`/
    /// `voidReason`/`voidedByUserId` onto the original in the same lock
    /// critical section. The original's lines are left untouched; only the
    /// void metadata marks it dead to readers.
    pub async fn void(&self, input: VoidEntryInput) -> LedgerResult<JournalEntry> {
        let original = self
            .store
            .get_entry(&input.company_id, &input.entry_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("journal entry {}", input.entry_id)))?;
        if original.is_voided() {
            return Err(LedgerError::InvalidState(format!("journal entry {} is already voided", original.id)));
        }
        if original.is_reversal() {
            return Err(LedgerError::InvalidState(format!(
                "journal entry {} is itself a reversal and cannot be voided",
                original.id
            )));
        }
        if self.store.find_reversal_of(&input.company_id, &original.id).await?.is_some() {
            return Err(LedgerError::AlreadyReversed(format!("journal entry {} has already been reversed", original.id)));
        }

        let void_date = Utc::now().date_naive();
        self.assert_period_open(&input.company_id, void_date, PeriodCloseAction::VoidJournalEntry).await?;

        let reversed_lines: Vec<NewLine> = original
            .lines
            .iter()
            .map(|line| NewLine {
                account_id: line.account_id.clone(),
                debit: line.credit,
                credit: line.debit,
            })
            .collect();

        let lock_key = keys::journal_entry(&input.company_id, &original.id);
        let store = &self.store;
        let poster = &self.poster;
        let company_id = input.company_id.clone();
        let entry_id = input.entry_id.clone();
        let reason = input.reason.clone();
        let voided_by_user_id = input.voided_by_user_id.clone();
        let original_id = original.id.clone();
        let (reversal, voided) = self
            .locks
            .with_locks(vec![lock_key], LOCK_TTL, || async move {
                let reversal = poster
                    .post_journal_entry(PostJournalEntryInput {
                        company_id: company_id.clone(),
                        date: void_date,
                        description: format!("Void of {original_id}: {reason}"),
                        created_by_user_id: voided_by_user_id.clone(),
                        location_id: None,
                        reversal_of_journal_entry_id: Some(original_id.clone()),
                        reversal_reason: Some(reason.clone()),
                        lines: reversed_lines,
                        skip_account_validation: true,
                    })
                    .await?;
                let voided = store
                    .mark_voided(&company_id, &entry_id, Utc::now(), reason, voided_by_user_id)
                    .await?;
                Ok::<_, LedgerError>((reversal, voided))
            })
            .await?;

        let correlation_id = input.correlation_id.clone().unwrap_or_else(|| reversal.id.clone());
        let created_event_id = self.emit(&input.company_id, event_types::JOURNAL_ENTRY_CREATED, &reversal, &correlation_id, None).await?;
        self.emit(&input.company_id, event_types::JOURNAL_ENTRY_REVERSED, &reversal, &correlation_id, Some(created_event_id)).await?;
        self.audit(&input.company_id, "journal_entry.voided", &voided.id, input.voided_by_user_id, Some(correlation_id)).await?;
        Ok(voided)
    }

    /// `Adjust` (spec §4.3): reverses the original entry and posts a
    /// corrected one in its place, emitting the three events of a reversal
    /// plus the corrected entry's own `journal.entry.created`.
    pub async fn adjust(&self, input: AdjustEntryInput) -> LedgerResult<JournalEntry> {
        let reversal = self
            .reverse(ReverseEntryInput {
                company_id: input.company_id.clone(),
                entry_id: input.entry_id.clone(),
                reversal_date: input.adjustment_date,
                reason: format!("Adjustment: {}", input.reason),
                created_by_user_id: input.created_by_user_id.clone(),
                correlation_id: input.correlation_id.clone(),
            })
            .await?;

        let original = self
            .store
            .get_entry(&input.company_id, &input.entry_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("journal entry {}", input.entry_id)))?;

        let corrected = self
            .create_manual(CreateManualEntryInput {
                company_id: input.company_id.clone(),
                date: input.adjustment_date,
                description: format!("Correction of {}: {}", original.id, input.reason),
                created_by_user_id: input.created_by_user_id,
                location_id: original.location_id.clone(),
                lines: input.corrected_lines,
                skip_account_validation: false,
                correlation_id: input.correlation_id,
            })
            .await?;

        tracing::info!(
            original_entry_id = %original.id,
            reversal_entry_id = %reversal.id,
            corrected_entry_id = %corrected.id,
            "adjusted journal entry"
        );
        Ok(corrected)
    }

    /// `PeriodClose` (spec §4.3, §4.9): records a new non-overlapping closed
    /// range for the tenant, guarded by the per-tenant period-close lock.
    pub async fn close_period(&self, input: PeriodCloseInput) -> LedgerResult<()> {
        let existing = self.store.list_period_closes(&input.company_id).await?;
        let existing_ranges: Vec<ledger_period_close::ClosedRange> = existing
            .iter()
            .map(|close| ledger_period_close::ClosedRange {
                from: close.from_date,
                to: close.to_date,
            })
            .collect();
        ledger_period_close::assert_range_does_not_overlap(&existing_ranges, input.from_date, input.to_date)?;

        let lock_key = keys::period_close(&input.company_id);
        let store = &self.store;
        let closed_through_store = &self.closed_through_store;
        let company_id = input.company_id.clone();
        let range = ledger_period_close::ClosedRange {
            from: input.from_date,
            to: input.to_date,
        };
        let close = PeriodClose {
            company_id: input.company_id.clone(),
            from_date: input.from_date,
            to_date: input.to_date,
            journal_entry_id: input.closing_entry_id.clone(),
            created_by_user_id: input.created_by_user_id.clone(),
        };
        self.locks
            .with_locks(vec![lock_key], LOCK_TTL, || async move {
                store.record_period_close(close).await?;
                closed_through_store
                    .record_close(&company_id, range)
                    .await
                    .map_err(|err| LedgerError::Internal(err.to_string()))
            })
            .await?;

        self.audit(
            &input.company_id,
            "period.closed",
            &input.closing_entry_id,
            input.created_by_user_id,
            None,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use ledger_audit::InMemoryAuditLog;
    use ledger_locks::LockStore;
    use ledger_outbox::InMemoryOutboxStore;
    use ledger_period_close::InMemoryClosedThroughStore;
    use ledger_money::Money;

    use crate::Account;
    use crate::AccountType;
    use crate::CashflowActivity;
    use crate::NormalBalance;
    use crate::ReportGroup;
    use crate::memory::InMemoryLedgerStore;

    fn account(company_id: &str, id: &str, code: &str, account_type: AccountType, normal_balance: NormalBalance) -> Account {
        Account {
            id: id.into(),
            company_id: company_id.to_string(),
            code: code.into(),
            name: code.into(),
            account_type,
            normal_balance,
            report_group: Some(ReportGroup::CashAndCashEquivalents),
            cashflow_activity: Some(CashflowActivity::Operating),
            is_active: true,
        }
    }

    async fn seeded_commands() -> LedgerCommands {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        store
            .upsert_account(account("co-1", "acc-cash", "1000", AccountType::Asset, NormalBalance::Debit))
            .await
            .expect("cash account");
        store
            .upsert_account(account("co-1", "acc-sales", "4000", AccountType::Income, NormalBalance::Credit))
            .await
            .expect("sales account");
        LedgerCommands::new(
            store,
            InMemoryOutboxStore::shared(),
            InMemoryAuditLog::shared(),
            InMemoryClosedThroughStore::shared(),
            Arc::new(LockManager::with_default_timeout(LockStore::shared())),
        )
    }

    fn balanced_lines() -> Vec<NewLine> {
        vec![
            NewLine {
                account_id: "acc-cash".into(),
                debit: Money::from_minor_units(5_000),
                credit: Money::ZERO,
            },
            NewLine {
                account_id: "acc-sales".into(),
                debit: Money::ZERO,
                credit: Money::from_minor_units(5_000),
            },
        ]
    }

    #[tokio::test]
    async fn create_manual_posts_and_emits_created_event() {
        let commands = seeded_commands().await;
        let entry = commands
            .create_manual(CreateManualEntryInput {
                company_id: "co-1".into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 10).expect("date"),
                description: "sale".into(),
                created_by_user_id: None,
                location_id: None,
                lines: balanced_lines(),
                skip_account_validation: false,
                correlation_id: None,
            })
            .await
            .expect("create");

        let events = commands.outbox.list_for_company("co-1").await.expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event_types::JOURNAL_ENTRY_CREATED);
        assert_eq!(events[0].aggregate_id, entry.id);
    }

    #[tokio::test]
    async fn reverse_emits_created_then_reversed_with_causation_chain() {
        let commands = seeded_commands().await;
        let original = commands
            .create_manual(CreateManualEntryInput {
                company_id: "co-1".into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 10).expect("date"),
                description: "sale".into(),
                created_by_user_id: None,
                location_id: None,
                lines: balanced_lines(),
                skip_account_validation: false,
                correlation_id: None,
            })
            .await
            .expect("create");

        let reversal = commands
            .reverse(ReverseEntryInput {
                company_id: "co-1".into(),
                entry_id: original.id.clone(),
                reversal_date: NaiveDate::from_ymd_opt(2025, 1, 11).expect("date"),
                reason: "mistake".into(),
                created_by_user_id: None,
                correlation_id: None,
            })
            .await
            .expect("reverse");

        assert_eq!(reversal.reversal_of_journal_entry_id, Some(original.id.clone()));
        assert!(reversal.is_balanced().expect("balanced"));

        let events = commands.outbox.list_for_company("co-1").await.expect("events");
        assert_eq!(events.len(), 3);
        let created = events.iter().find(|event| event.aggregate_id == reversal.id && event.event_type == event_types::JOURNAL_ENTRY_CREATED).expect("created event");
        let reversed = events.iter().find(|event| event.event_type == event_types::JOURNAL_ENTRY_REVERSED).expect("reversed event");
        assert_eq!(reversed.causation_id, Some(created.id.clone()));
    }

    #[tokio::test]
    async fn void_posts_swapped_reversal_and_marks_original() {
        let commands = seeded_commands().await;
        let entry = commands
            .create_manual(CreateManualEntryInput {
                company_id: "co-1".into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 10).expect("date"),
                description: "sale".into(),
                created_by_user_id: None,
                location_id: None,
                lines: balanced_lines(),
                skip_account_validation: false,
                correlation_id: None,
            })
            .await
            .expect("create");

        let voided = commands
            .void(VoidEntryInput {
                company_id: "co-1".into(),
                entry_id: entry.id.clone(),
                reason: "duplicate".into(),
                voided_by_user_id: None,
                correlation_id: None,
            })
            .await
            .expect("void");

        assert!(voided.is_voided());
        assert_eq!(voided.entry_number, entry.entry_number);
        assert_eq!(voided.lines.len(), entry.lines.len());

        let reversal = commands
            .store
            .find_reversal_of("co-1", &entry.id)
            .await
            .expect("lookup")
            .expect("reversal posted");
        assert_eq!(reversal.lines[0].debit, entry.lines[0].credit);
        assert_eq!(reversal.lines[0].credit, entry.lines[0].debit);
        assert!(reversal.is_balanced().expect("balanced"));

        let events = commands.outbox.list_for_company("co-1").await.expect("events");
        let void_events = events.iter().filter(|event| event.aggregate_id == reversal.id).count();
        assert_eq!(void_events, 2);
    }

    #[tokio::test]
    async fn voiding_an_already_voided_entry_is_rejected() {
        let commands = seeded_commands().await;
        let entry = commands
            .create_manual(CreateManualEntryInput {
                company_id: "co-1".into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 10).expect("date"),
                description: "sale".into(),
                created_by_user_id: None,
                location_id: None,
                lines: balanced_lines(),
                skip_account_validation: false,
                correlation_id: None,
            })
            .await
            .expect("create");

        commands
            .void(VoidEntryInput {
                company_id: "co-1".into(),
                entry_id: entry.id.clone(),
                reason: "duplicate".into(),
                voided_by_user_id: None,
                correlation_id: None,
            })
            .await
            .expect("first void");

        let err = commands
            .void(VoidEntryInput {
                company_id: "co-1".into(),
                entry_id: entry.id.clone(),
                reason: "again".into(),
                voided_by_user_id: None,
                correlation_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn reversing_an_already_reversed_entry_is_rejected() {
        let commands = seeded_commands().await;
        let entry = commands
            .create_manual(CreateManualEntryInput {
                company_id: "co-1".into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 10).expect("date"),
                description: "sale".into(),
                created_by_user_id: None,
                location_id: None,
                lines: balanced_lines(),
                skip_account_validation: false,
                correlation_id: None,
            })
            .await
            .expect("create");

        commands
            .reverse(ReverseEntryInput {
                company_id: "co-1".into(),
                entry_id: entry.id.clone(),
                reversal_date: NaiveDate::from_ymd_opt(2025, 1, 11).expect("date"),
                reason: "mistake".into(),
                created_by_user_id: None,
                correlation_id: None,
            })
            .await
            .expect("first reverse");

        let err = commands
            .reverse(ReverseEntryInput {
                company_id: "co-1".into(),
                entry_id: entry.id.clone(),
                reversal_date: NaiveDate::from_ymd_opt(2025, 1, 12).expect("date"),
                reason: "again".into(),
                created_by_user_id: None,
                correlation_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyReversed(_)));
    }

    #[tokio::test]
    async fn reversing_a_reversal_entry_is_rejected() {
        let commands = seeded_commands().await;
        let entry = commands
            .create_manual(CreateManualEntryInput {
                company_id: "co-1".into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 10).expect("date"),
                description: "sale".into(),
                created_by_user_id: None,
                location_id: None,
                lines: balanced_lines(),
                skip_account_validation: false,
                correlation_id: None,
            })
            .await
            .expect("create");

        let reversal = commands
            .reverse(ReverseEntryInput {
                company_id: "co-1".into(),
                entry_id: entry.id.clone(),
                reversal_date: NaiveDate::from_ymd_opt(2025, 1, 11).expect("date"),
                reason: "mistake".into(),
                created_by_user_id: None,
                correlation_id: None,
            })
            .await
            .expect("reverse");

        let err = commands
            .reverse(ReverseEntryInput {
                company_id: "co-1".into(),
                entry_id: reversal.id.clone(),
                reversal_date: NaiveDate::from_ymd_opt(2025, 1, 12).expect("date"),
                reason: "again".into(),
                created_by_user_id: None,
                correlation_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn mutation_on_or_before_closed_through_is_rejected() {
        let commands = seeded_commands().await;
        commands
            .close_period(PeriodCloseInput {
                company_id: "co-1".into(),
                from_date: NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"),
                to_date: NaiveDate::from_ymd_opt(2025, 1, 31).expect("date"),
                closing_entry_id: "je-closing".into(),
                created_by_user_id: None,
            })
            .await
            .expect("close period");

        let err = commands
            .create_manual(CreateManualEntryInput {
                company_id: "co-1".into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 15).expect("date"),
                description: "backdated".into(),
                created_by_user_id: None,
                location_id: None,
                lines: balanced_lines(),
                skip_account_validation: false,
                correlation_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::PeriodClosed(_)));
    }

    #[tokio::test]
    async fn close_period_syncs_the_shared_closed_through_store() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        let closed_through_store = InMemoryClosedThroughStore::shared();
        let commands = LedgerCommands::new(
            store,
            InMemoryOutboxStore::shared(),
            InMemoryAuditLog::shared(),
            closed_through_store.clone(),
            Arc::new(LockManager::with_default_timeout(LockStore::shared())),
        );

        commands
            .close_period(PeriodCloseInput {
                company_id: "co-1".into(),
                from_date: NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"),
                to_date: NaiveDate::from_ymd_opt(2025, 1, 31).expect("date"),
                closing_entry_id: "je-closing".into(),
                created_by_user_id: None,
            })
            .await
            .expect("close period");

        use ledger_period_close::ClosedThroughStore;
        use ledger_period_close::closed_through;
        let ranges = closed_through_store.ranges("co-1").await.expect("ranges");
        assert_eq!(closed_through(&ranges), Some(NaiveDate::from_ymd_opt(2025, 1, 31).expect("date")));
    }

    #[tokio::test]
    async fn adjust_emits_reversal_pair_and_corrected_entry() {
        let commands = seeded_commands().await;
        let original = commands
            .create_manual(CreateManualEntryInput {
                company_id: "co-1".into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 10).expect("date"),
                description: "sale".into(),
                created_by_user_id: None,
                location_id: None,
                lines: balanced_lines(),
                skip_account_validation: false,
                correlation_id: None,
            })
            .await
            .expect("create");

        let corrected = commands
            .adjust(AdjustEntryInput {
                company_id: "co-1".into(),
                entry_id: original.id.clone(),
                adjustment_date: NaiveDate::from_ymd_opt(2025, 1, 12).expect("date"),
                reason: "wrong amount".into(),
                corrected_lines: vec![
                    NewLine {
                        account_id: "acc-cash".into(),
                        debit: Money::from_minor_units(6_000),
                        credit: Money::ZERO,
                    },
                    NewLine {
                        account_id: "acc-sales".into(),
                        debit: Money::ZERO,
                        credit: Money::from_minor_units(6_000),
                    },
                ],
                created_by_user_id: None,
                correlation_id: None,
            })
            .await
            .expect("adjust");

        assert!(corrected.is_balanced().expect("balanced"));
        let events = commands.outbox.list_for_company("co-1").await.expect("events");
        assert_eq!(events.len(), 4);
    }
}
