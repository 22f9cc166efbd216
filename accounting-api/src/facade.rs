use std::sync::Arc;

use chrono::NaiveDate;
use ledger_core::JournalEntry;
use ledger_core::LedgerStore;
use ledger_core::NewLine;
use ledger_core::commands::AdjustEntryInput;
use ledger_core::commands::CreateManualEntryInput;
use ledger_core::commands::LedgerCommands;
use ledger_core::commands::PeriodCloseInput;
use ledger_core::commands::ReverseEntryInput;
use ledger_core::commands::VoidEntryInput;
use ledger_idempotency::IdempotencyError;
use ledger_idempotency::IdempotencyRunner;
use ledger_inventory::InventoryStore;
use ledger_inventory::ItemId;
use ledger_inventory::StockBalance;
use ledger_inventory::StockMove;
use ledger_inventory::commands::AdjustmentInput;
use ledger_inventory::commands::InventoryCommands;
use ledger_inventory::commands::OpeningBalanceInput;
use ledger_reports::ReportsResult;
use ledger_reports::reports::BalanceSheet;
use ledger_reports::reports::CashflowStatement;
use ledger_reports::reports::CogsLine;
use ledger_reports::reports::InventoryValuationLine;
use ledger_reports::reports::ProfitAndLoss;
use ledger_reports::reports::ReportsEngine;
use ledger_reports::reports::TrialBalanceLine;

use crate::AccountingTelemetry;

/// `LedgerApi` (spec §6): the single entry point a caller (CLI, HTTP
/// handler, job) goes through. Every mutation is wrapped in
/// [`IdempotencyRunner::run_idempotent`] keyed by `(company_id, idempotency
/// key)`; every report call passes straight through to [`ReportsEngine`],
/// which never mutates anything.
#[derive(Clone)]
pub struct LedgerApi {
    ledger: Arc<LedgerCommands>,
    inventory: Arc<InventoryCommands>,
    reports: Arc<ReportsEngine>,
    idempotency: Arc<IdempotencyRunner>,
    telemetry: Arc<AccountingTelemetry>,
}

impl LedgerApi {
    #[must_use]
    pub fn new(
        ledger: Arc<LedgerCommands>,
        inventory: Arc<InventoryCommands>,
        reports: Arc<ReportsEngine>,
        idempotency: Arc<IdempotencyRunner>,
        telemetry: Arc<AccountingTelemetry>,
    ) -> Self {
        Self {
            ledger,
            inventory,
            reports,
            idempotency,
            telemetry,
        }
    }

    pub async fn create_manual_entry(
        &self,
        idempotency_key: &str,
        input: CreateManualEntryInput,
    ) -> Result<JournalEntry, IdempotencyError> {
        let fingerprint = fingerprint(&(
            &input.company_id,
            &input.date,
            &input.description,
            &input.lines.iter().map(|l| (l.account_id.clone(), l.debit, l.credit)).collect::<Vec<_>>(),
        ));
        let company_id = input.company_id.clone();
        let ledger = self.ledger.clone();
        let outcome = self
            .idempotency
            .run_idempotent(&company_id, idempotency_key, &fingerprint, move || async move {
                ledger.create_manual(input).await.map_err(anyhow::Error::from)
            })
            .await?;
        if outcome.replay {
            tracing::info!(company_id = %company_id, key = idempotency_key, "replayed create_manual_entry");
            self.telemetry.record_idempotency_replay();
        } else {
            self.telemetry.record_entry_created();
        }
        Ok(outcome.response)
    }

    pub async fn reverse_entry(
        &self,
        idempotency_key: &str,
        input: ReverseEntryInput,
    ) -> Result<JournalEntry, IdempotencyError> {
        let fingerprint = fingerprint(&(&input.company_id, &input.entry_id, &input.reversal_date, &input.reason));
        let company_id = input.company_id.clone();
        let ledger = self.ledger.clone();
        let outcome = self
            .idempotency
            .run_idempotent(&company_id, idempotency_key, &fingerprint, move || async move {
                ledger.reverse(input).await.map_err(anyhow::Error::from)
            })
            .await?;
        if outcome.replay {
            self.telemetry.record_idempotency_replay();
        } else {
            self.telemetry.record_entry_reversed();
        }
        Ok(outcome.response)
    }

    pub async fn void_entry(&self, idempotency_key: &str, input: VoidEntryInput) -> Result<JournalEntry, IdempotencyError> {
        let fingerprint = fingerprint(&(&input.company_id, &input.entry_id, &input.reason));
        let company_id = input.company_id.clone();
        let ledger = self.ledger.clone();
        let outcome = self
            .idempotency
            .run_idempotent(&company_id, idempotency_key, &fingerprint, move || async move {
                ledger.void(input).await.map_err(anyhow::Error::from)
            })
            .await?;
        if outcome.replay {
            self.telemetry.record_idempotency_replay();
        } else {
            self.telemetry.record_entry_voided();
        }
        Ok(outcome.response)
    }

    pub async fn adjust_entry(&self, idempotency_key: &str, input: AdjustEntryInput) -> Result<JournalEntry, IdempotencyError> {
        let fingerprint = fingerprint(&(
            &input.company_id,
            &input.entry_id,
            &input.adjustment_date,
            &input.reason,
            &input.corrected_lines.iter().map(|l| (l.account_id.clone(), l.debit, l.credit)).collect::<Vec<_>>(),
        ));
        let company_id = input.company_id.clone();
        let ledger = self.ledger.clone();
        let outcome = self
            .idempotency
            .run_idempotent(&company_id, idempotency_key, &fingerprint, move || async move {
                ledger.adjust(input).await.map_err(anyhow::Error::from)
            })
            .await?;
        if outcome.replay {
            self.telemetry.record_idempotency_replay();
        } else {
            self.telemetry.record_entry_adjusted();
        }
        Ok(outcome.response)
    }

    pub async fn close_period(&self, idempotency_key: &str, input: PeriodCloseInput) -> Result<(), IdempotencyError> {
        let fingerprint = fingerprint(&(&input.company_id, &input.from_date, &input.to_date, &input.closing_entry_id));
        let company_id = input.company_id.clone();
        let ledger = self.ledger.clone();
        let outcome = self
            .idempotency
            .run_idempotent(&company_id, idempotency_key, &fingerprint, move || async move {
                ledger.close_period(input).await.map_err(anyhow::Error::from)
            })
            .await?;
        if outcome.replay {
            self.telemetry.record_idempotency_replay();
        } else {
            self.telemetry.record_period_closed();
        }
        Ok(outcome.response)
    }

    pub async fn record_opening_balance(
        &self,
        idempotency_key: &str,
        input: OpeningBalanceInput,
    ) -> Result<(StockMove, StockBalance), IdempotencyError> {
        let fingerprint = fingerprint(&(&input.company_id, &input.location_id, &input.item_id, &input.as_of_date, input.quantity, input.unit_cost));
        let company_id = input.company_id.clone();
        let inventory = self.inventory.clone();
        let outcome = self
            .idempotency
            .run_idempotent(&company_id, idempotency_key, &fingerprint, move || async move {
                inventory.opening_balance(input).await.map_err(anyhow::Error::from)
            })
            .await?;
        if outcome.replay {
            self.telemetry.record_idempotency_replay();
        } else {
            self.telemetry.record_inventory_move();
        }
        Ok(outcome.response)
    }

    pub async fn record_inventory_adjustment(
        &self,
        idempotency_key: &str,
        input: AdjustmentInput,
    ) -> Result<(StockMove, StockBalance), IdempotencyError> {
        let fingerprint = fingerprint(&(
            &input.company_id,
            &input.location_id,
            &input.item_id,
            &input.adjustment_date,
            input.quantity_delta,
            input.unit_cost,
            &input.reason,
        ));
        let company_id = input.company_id.clone();
        let inventory = self.inventory.clone();
        let outcome = self
            .idempotency
            .run_idempotent(&company_id, idempotency_key, &fingerprint, move || async move {
                inventory.adjustment(input).await.map_err(anyhow::Error::from)
            })
            .await?;
        if outcome.replay {
            self.telemetry.record_idempotency_replay();
        } else {
            self.telemetry.record_inventory_move();
        }
        Ok(outcome.response)
    }

    pub async fn trial_balance(&self, company_id: &str, as_of: NaiveDate) -> ReportsResult<Vec<TrialBalanceLine>> {
        self.reports.trial_balance(company_id, as_of).await
    }

    pub async fn balance_sheet(&self, company_id: &str, as_of: NaiveDate) -> ReportsResult<BalanceSheet> {
        self.reports.balance_sheet(company_id, as_of).await
    }

    pub async fn profit_and_loss(&self, company_id: &str, from: NaiveDate, to: NaiveDate) -> ReportsResult<ProfitAndLoss> {
        self.reports.profit_and_loss(company_id, from, to).await
    }

    pub async fn cashflow_statement(&self, company_id: &str, from: NaiveDate, to: NaiveDate) -> ReportsResult<CashflowStatement> {
        self.reports.cashflow_statement(company_id, from, to).await
    }

    pub async fn inventory_valuation(&self, company_id: &str, location_id: &str, item_ids: &[ItemId]) -> ReportsResult<Vec<InventoryValuationLine>> {
        self.reports.inventory_valuation(company_id, location_id, item_ids).await
    }

    pub async fn inventory_movement(&self, company_id: &str, location_id: &str, item_id: &str) -> ReportsResult<Vec<StockMove>> {
        self.reports.inventory_movement(company_id, location_id, item_id).await
    }

    pub async fn cogs_by_item(&self, company_id: &str, location_id: &str, item_ids: &[ItemId]) -> ReportsResult<Vec<CogsLine>> {
        self.reports.cogs_by_item(company_id, location_id, item_ids).await
    }
}

fn fingerprint(value: &impl serde::Serialize) -> String {
    use sha2::Digest;
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    let digest = sha2::Sha256::digest(&bytes);
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc as StdArc;

    use ledger_audit::InMemoryAuditLog;
    use ledger_core::Account;
    use ledger_core::AccountType;
    use ledger_core::NormalBalance;
    use ledger_core::memory::InMemoryLedgerStore;
    use ledger_idempotency::InMemoryIdempotencyStore;
    use ledger_idempotency::PollConfig;
    use ledger_inventory::commands::InventoryCommands;
    use ledger_inventory::memory::InMemoryInventoryStore;
    use ledger_locks::LockManager;
    use ledger_locks::LockStore;
    use ledger_money::Money;
    use ledger_outbox::InMemoryOutboxStore;
    use ledger_period_close::InMemoryClosedThroughStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    async fn api() -> LedgerApi {
        let ledger_store: StdArc<dyn LedgerStore> = StdArc::new(InMemoryLedgerStore::new());
        ledger_store
            .upsert_account(Account {
                id: "acc-cash".into(),
                company_id: "co-1".into(),
                code: "1000".into(),
                name: "Cash".into(),
                account_type: AccountType::Asset,
                normal_balance: NormalBalance::Debit,
                report_group: None,
                cashflow_activity: None,
                is_active: true,
            })
            .await
            .expect("cash");
        ledger_store
            .upsert_account(Account {
                id: "acc-sales".into(),
                company_id: "co-1".into(),
                code: "4000".into(),
                name: "Sales".into(),
                account_type: AccountType::Income,
                normal_balance: NormalBalance::Credit,
                report_group: None,
                cashflow_activity: None,
                is_active: true,
            })
            .await
            .expect("sales");

        let locks = StdArc::new(LockManager::with_default_timeout(LockStore::shared()));
        let outbox = InMemoryOutboxStore::shared();
        let closed_through_store = InMemoryClosedThroughStore::shared();
        let ledger_commands = StdArc::new(LedgerCommands::new(
            ledger_store.clone(),
            outbox.clone(),
            InMemoryAuditLog::shared(),
            closed_through_store.clone(),
            locks.clone(),
        ));

        let inventory_store: StdArc<dyn InventoryStore> = StdArc::new(InMemoryInventoryStore::new());
        let inventory_commands = StdArc::new(InventoryCommands::new(
            inventory_store.clone(),
            ledger_store.clone(),
            outbox,
            closed_through_store,
            locks,
        ));

        let reports = StdArc::new(ReportsEngine::new(ledger_store, inventory_store));
        let idempotency = StdArc::new(IdempotencyRunner::new(InMemoryIdempotencyStore::shared(), PollConfig::default()));

        LedgerApi::new(ledger_commands, inventory_commands, reports, idempotency, StdArc::new(AccountingTelemetry::new()))
    }

    #[tokio::test]
    async fn create_manual_entry_is_idempotent_on_replay() {
        let api = api().await;
        let input = || CreateManualEntryInput {
            company_id: "co-1".into(),
            date: date(2025, 1, 10),
            description: "sale".into(),
            created_by_user_id: None,
            location_id: None,
            lines: vec![
                NewLine {
                    account_id: "acc-cash".into(),
                    debit: Money::from_minor_units(500),
                    credit: Money::ZERO,
                },
                NewLine {
                    account_id: "acc-sales".into(),
                    debit: Money::ZERO,
                    credit: Money::from_minor_units(500),
                },
            ],
            skip_account_validation: false,
            correlation_id: None,
        };

        let first = api.create_manual_entry("req-1", input()).await.expect("first");
        let second = api.create_manual_entry("req-1", input()).await.expect("replay");
        assert_eq!(first.id, second.id);
        assert_eq!(first.entry_number, second.entry_number);
    }

    #[tokio::test]
    async fn reused_key_with_different_request_is_conflict() {
        let api = api().await;
        api.create_manual_entry(
            "req-2",
            CreateManualEntryInput {
                company_id: "co-1".into(),
                date: date(2025, 1, 10),
                description: "sale".into(),
                created_by_user_id: None,
                location_id: None,
                lines: vec![
                    NewLine {
                        account_id: "acc-cash".into(),
                        debit: Money::from_minor_units(500),
                        credit: Money::ZERO,
                    },
                    NewLine {
                        account_id: "acc-sales".into(),
                        debit: Money::ZERO,
                        credit: Money::from_minor_units(500),
                    },
                ],
                skip_account_validation: false,
                correlation_id: None,
            },
        )
        .await
        .expect("first");

        let err = api
            .create_manual_entry(
                "req-2",
                CreateManualEntryInput {
                    company_id: "co-1".into(),
                    date: date(2025, 1, 11),
                    description: "different request".into(),
                    created_by_user_id: None,
                    location_id: None,
                    lines: vec![
                        NewLine {
                            account_id: "acc-cash".into(),
                            debit: Money::from_minor_units(999),
                            credit: Money::ZERO,
                        },
                        NewLine {
                            account_id: "acc-sales".into(),
                            debit: Money::ZERO,
                            credit: Money::from_minor_units(999),
                        },
                    ],
                    skip_account_validation: false,
                    correlation_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IdempotencyError::KeyConflict));
    }

    #[tokio::test]
    async fn reports_reflect_posted_entries() {
        let api = api().await;
        api.create_manual_entry(
            "req-3",
            CreateManualEntryInput {
                company_id: "co-1".into(),
                date: date(2025, 1, 10),
                description: "sale".into(),
                created_by_user_id: None,
                location_id: None,
                lines: vec![
                    NewLine {
                        account_id: "acc-cash".into(),
                        debit: Money::from_minor_units(500),
                        credit: Money::ZERO,
                    },
                    NewLine {
                        account_id: "acc-sales".into(),
                        debit: Money::ZERO,
                        credit: Money::from_minor_units(500),
                    },
                ],
                skip_account_validation: false,
                correlation_id: None,
            },
        )
        .await
        .expect("post");

        let trial_balance = api.trial_balance("co-1", date(2025, 1, 31)).await.expect("trial balance");
        let cash_line = trial_balance.iter().find(|line| line.account_id == "acc-cash").expect("cash line present");
        assert_eq!(cash_line.debit_total, Money::from_minor_units(500));
    }
}
