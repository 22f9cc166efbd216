use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use ledger_core::Account;
use ledger_core::AccountType;
use ledger_core::JournalEntry;
use ledger_core::LedgerStore;
use ledger_core::NewLine;
use ledger_core::NormalBalance;
use ledger_core::ReportGroup;
use ledger_core::poster::LedgerPoster;
use ledger_core::poster::PostJournalEntryInput;
use ledger_locks::LockManager;
use ledger_locks::keys;
use ledger_money::Money;
use ledger_outbox::NewEvent;
use ledger_outbox::OutboxStore;
use ledger_outbox::event_types;
use ledger_period_close::ClosedThroughStore;
use ledger_period_close::PeriodCloseAction;
use ledger_period_close::assert_open_period;
use ledger_period_close::closed_through;
use serde_json::json;
use uuid::Uuid;

use crate::CompanyId;
use crate::InventoryError;
use crate::InventoryResult;
use crate::InventoryStore;
use crate::ItemId;
use crate::Location;
use crate::LocationId;
use crate::NewStockMove;
use crate::StockBalance;
use crate::StockMove;
use crate::StockMoveType;
use crate::engine::InventoryEngine;

const LOCK_TTL: Duration = Duration::from_secs(10);

const DEFAULT_LOCATION_NAME: &str = "Main Location";
const INVENTORY_ACCOUNT_CODE: &str = "1300";
const INVENTORY_ACCOUNT_NAME: &str = "Inventory";
const COGS_ACCOUNT_CODE: &str = "5001";
const COGS_ACCOUNT_NAME: &str = "Cost of Goods Sold";
const OPENING_BALANCE_EQUITY_ACCOUNT_CODE: &str = "3050";
const OPENING_BALANCE_EQUITY_ACCOUNT_NAME: &str = "Opening Balance Equity";

pub struct OpeningBalanceInput {
    pub company_id: CompanyId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub as_of_date: NaiveDate,
    pub quantity: i64,
    pub unit_cost: Money,
    pub created_by_user_id: Option<String>,
}

pub struct AdjustmentInput {
    pub company_id: CompanyId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub adjustment_date: NaiveDate,
    /// Positive to add stock (requires `unit_cost`), negative to remove it.
    pub quantity_delta: i64,
    pub unit_cost: Option<Money>,
    pub reason: String,
    pub created_by_user_id: Option<String>,
    /// Whether this move may land before the latest existing move for the
    /// pair. Unlike `OpeningBalance`, adjustments only get this implicitly
    /// when the caller opts in.
    pub allow_backdated: bool,
}

/// The company-scoped GL accounts inventory postings need, created once per
/// tenant on first use (spec §4.5).
#[derive(Debug, Clone)]
struct InventoryDefaults {
    inventory_account_id: String,
    cogs_account_id: String,
    opening_balance_equity_account_id: String,
}

/// `InventoryCommands` (spec §4.5): the command envelope on top of
/// [`InventoryEngine`] that enforces period-close and per-(location, item)
/// locking before every mutation, and that posts the offsetting journal
/// entry for every stock move that changes value.
pub struct InventoryCommands {
    engine: InventoryEngine,
    store: Arc<dyn InventoryStore>,
    poster: LedgerPoster,
    ledger_store: Arc<dyn LedgerStore>,
    outbox: Arc<dyn OutboxStore>,
    closed_through_store: Arc<dyn ClosedThroughStore>,
    locks: Arc<LockManager>,
}

impl InventoryCommands {
    #[must_use]
    pub fn new(
        store: Arc<dyn InventoryStore>,
        ledger_store: Arc<dyn LedgerStore>,
        outbox: Arc<dyn OutboxStore>,
        closed_through_store: Arc<dyn ClosedThroughStore>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            engine: InventoryEngine::new(store.clone()),
            store,
            poster: LedgerPoster::new(ledger_store.clone()),
            ledger_store,
            outbox,
            closed_through_store,
            locks,
        }
    }

    async fn assert_period_open(&self, company_id: &str, date: NaiveDate, action: PeriodCloseAction) -> InventoryResult<()> {
        let ranges = self
            .closed_through_store
            .ranges(&company_id.to_string())
            .await
            .map_err(|err| InventoryError::Internal(err.to_string()))?;
        assert_open_period(closed_through(&ranges), date, action)?;
        Ok(())
    }

    async fn item_must_participate(&self, company_id: &str, item_id: &str) -> InventoryResult<()> {
        let item = self
            .store
            .get_item(company_id, item_id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("item {item_id}")))?;
        if !item.participates_in_inventory() {
            return Err(InventoryError::Validation(format!(
                "item {item_id} does not track inventory (must be GOODS with trackInventory = true)"
            )));
        }
        Ok(())
    }

    /// `ensureInventoryCompanyDefaults` (spec §4.5): idempotently creates the
    /// tenant's default location and the three GL accounts inventory
    /// postings need, guarded by a company-wide lock so that a concurrent
    /// opening balance and adjustment never race each other into creating
    /// duplicates.
    async fn ensure_inventory_company_defaults(&self, company_id: &str) -> InventoryResult<InventoryDefaults> {
        let lock_key = keys::stock_default_alias(company_id, "default");
        let store = &self.store;
        let ledger_store = &self.ledger_store;
        let company_id = company_id.to_string();
        self.locks
            .with_locks(vec![lock_key], LOCK_TTL, || async move {
                ensure_default_location(store, &company_id).await?;
                let inventory_account_id = ensure_account(
                    ledger_store,
                    &company_id,
                    INVENTORY_ACCOUNT_CODE,
                    INVENTORY_ACCOUNT_NAME,
                    AccountType::Asset,
                    NormalBalance::Debit,
                    ReportGroup::Inventory,
                )
                .await?;
                let cogs_account_id = ensure_account(
                    ledger_store,
                    &company_id,
                    COGS_ACCOUNT_CODE,
                    COGS_ACCOUNT_NAME,
                    AccountType::Expense,
                    NormalBalance::Debit,
                    ReportGroup::Cogs,
                )
                .await?;
                let opening_balance_equity_account_id = ensure_account(
                    ledger_store,
                    &company_id,
                    OPENING_BALANCE_EQUITY_ACCOUNT_CODE,
                    OPENING_BALANCE_EQUITY_ACCOUNT_NAME,
                    AccountType::Equity,
                    NormalBalance::Credit,
                    ReportGroup::Equity,
                )
                .await?;
                Ok(InventoryDefaults {
                    inventory_account_id,
                    cogs_account_id,
                    opening_balance_equity_account_id,
                })
            })
            .await
    }

    /// Whether `move_date` would land before the latest already-recorded
    /// move for the pair, i.e. whether the insert takes the replay path
    /// (spec §4.4.2) rather than simply appending.
    async fn triggers_replay(&self, company_id: &str, location_id: &str, item_id: &str, move_date: NaiveDate) -> InventoryResult<bool> {
        let existing = self.store.list_moves(company_id, location_id, item_id).await?;
        Ok(existing.iter().any(|mv| mv.move_date > move_date))
    }

    async fn emit_journal_entry_created(&self, company_id: &str, entry: &JournalEntry, correlation_id: &str) -> InventoryResult<()> {
        self.outbox
            .append(NewEvent {
                company_id: company_id.to_string(),
                event_type: event_types::JOURNAL_ENTRY_CREATED.to_string(),
                schema_version: 1,
                source: "ledger-inventory".into(),
                partition_key: entry.id.clone(),
                correlation_id: correlation_id.to_string(),
                causation_id: None,
                aggregate_type: "journal_entry".into(),
                aggregate_id: entry.id.clone(),
                payload: json!({
                    "journal_entry_id": entry.id,
                    "entry_number": entry.entry_number,
                    "date": entry.date,
                }),
            })
            .await
            .map_err(|err| InventoryError::Internal(err.to_string()))?;
        Ok(())
    }

    async fn emit_inventory_recalc_requested(
        &self,
        company_id: &str,
        location_id: &str,
        item_id: &str,
        from_date: NaiveDate,
        correlation_id: &str,
    ) -> InventoryResult<()> {
        let aggregate_id = format!("{location_id}:{item_id}");
        self.outbox
            .append(NewEvent {
                company_id: company_id.to_string(),
                event_type: event_types::INVENTORY_RECALC_REQUESTED.to_string(),
                schema_version: 1,
                source: "ledger-inventory".into(),
                partition_key: aggregate_id.clone(),
                correlation_id: correlation_id.to_string(),
                causation_id: None,
                aggregate_type: "stock_balance".into(),
                aggregate_id,
                payload: json!({
                    "location_id": location_id,
                    "item_id": item_id,
                    "from_date": from_date,
                }),
            })
            .await
            .map_err(|err| InventoryError::Internal(err.to_string()))?;
        Ok(())
    }

    /// `OpeningBalance` (spec §4.5): seeds a fresh WAC position for an item
    /// at a location, posting `Dr Inventory / Cr Opening Balance Equity` for
    /// the seeded value. Rejected once the tenant has closed through
    /// `as_of_date`. Always allowed to land before existing moves: an
    /// opening balance is by definition the earliest entry for the pair.
    pub async fn opening_balance(&self, input: OpeningBalanceInput) -> InventoryResult<(StockMove, StockBalance)> {
        if input.quantity < 0 {
            return Err(InventoryError::Validation("opening balance quantity must not be negative".into()));
        }
        self.item_must_participate(&input.company_id, &input.item_id).await?;
        self.assert_period_open(&input.company_id, input.as_of_date, PeriodCloseAction::InventoryOpeningBalance)
            .await?;

        let defaults = self.ensure_inventory_company_defaults(&input.company_id).await?;
        let replays = self
            .triggers_replay(&input.company_id, &input.location_id, &input.item_id, input.as_of_date)
            .await?;

        let lock_key = keys::stock(&input.company_id, &input.location_id, &input.item_id);
        let engine = &self.engine;
        let company_id = input.company_id.clone();
        let location_id = input.location_id.clone();
        let item_id = input.item_id.clone();
        let as_of_date = input.as_of_date;
        let quantity = input.quantity;
        let unit_cost = input.unit_cost;
        let (mv, balance) = self
            .locks
            .with_locks(vec![lock_key], LOCK_TTL, || async move {
                engine
                    .apply_stock_move_wac(
                        &company_id,
                        &location_id,
                        &item_id,
                        NewStockMove {
                            move_date: as_of_date,
                            quantity_delta: quantity,
                            unit_cost: Some(unit_cost),
                            move_type: StockMoveType::OpeningBalance,
                            reference: None,
                            allow_backdated: true,
                        },
                    )
                    .await
            })
            .await?;

        let total_value = input
            .unit_cost
            .checked_mul_quantity(input.quantity)
            .map_err(|err| InventoryError::Internal(err.to_string()))?;

        let correlation_id = mv.id.clone();
        let entry = self
            .poster
            .post_journal_entry(PostJournalEntryInput {
                company_id: input.company_id.clone(),
                date: input.as_of_date,
                description: format!("Opening balance: item {}", input.item_id),
                created_by_user_id: input.created_by_user_id.clone(),
                location_id: Some(input.location_id.clone()),
                reversal_of_journal_entry_id: None,
                reversal_reason: None,
                lines: vec![
                    NewLine {
                        account_id: defaults.inventory_account_id.clone(),
                        debit: total_value,
                        credit: Money::ZERO,
                    },
                    NewLine {
                        account_id: defaults.opening_balance_equity_account_id.clone(),
                        debit: Money::ZERO,
                        credit: total_value,
                    },
                ],
                skip_account_validation: false,
            })
            .await
            .map_err(|err| InventoryError::Internal(err.to_string()))?;

        let mv = self
            .store
            .set_journal_entry_id(&input.company_id, &input.location_id, &input.item_id, &mv.id, &entry.id)
            .await?;

        self.emit_journal_entry_created(&input.company_id, &entry, &correlation_id).await?;
        if replays {
            self.emit_inventory_recalc_requested(&input.company_id, &input.location_id, &input.item_id, input.as_of_date, &correlation_id)
                .await?;
        }

        Ok((mv, balance))
    }

    /// `Adjustment` (spec §4.5): a manual correction to quantity on hand,
    /// positive (re-priced inbound, `Dr Inventory / Cr COGS`) or negative
    /// (shrinkage/write-off, `Dr COGS / Cr Inventory`), sized off the move's
    /// replay-derived `cost_delta` rather than the caller's raw inputs.
    pub async fn adjustment(&self, input: AdjustmentInput) -> InventoryResult<(StockMove, StockBalance)> {
        if input.quantity_delta == 0 {
            return Err(InventoryError::Validation("adjustment quantity delta must not be zero".into()));
        }
        if input.quantity_delta > 0 && input.unit_cost.is_none() {
            return Err(InventoryError::Validation("positive adjustment requires a unit cost".into()));
        }
        self.item_must_participate(&input.company_id, &input.item_id).await?;
        self.assert_period_open(&input.company_id, input.adjustment_date, PeriodCloseAction::InventoryAdjustment)
            .await?;

        let defaults = self.ensure_inventory_company_defaults(&input.company_id).await?;
        let replays = self
            .triggers_replay(&input.company_id, &input.location_id, &input.item_id, input.adjustment_date)
            .await?;

        let lock_key = keys::stock(&input.company_id, &input.location_id, &input.item_id);
        let engine = &self.engine;
        let company_id = input.company_id.clone();
        let location_id = input.location_id.clone();
        let item_id = input.item_id.clone();
        let adjustment_date = input.adjustment_date;
        let quantity_delta = input.quantity_delta;
        let unit_cost = input.unit_cost;
        let reference = Some(input.reason.clone());
        let allow_backdated = input.allow_backdated;
        let (mv, balance) = self
            .locks
            .with_locks(vec![lock_key], LOCK_TTL, || async move {
                engine
                    .apply_stock_move_wac(
                        &company_id,
                        &location_id,
                        &item_id,
                        NewStockMove {
                            move_date: adjustment_date,
                            quantity_delta,
                            unit_cost,
                            move_type: StockMoveType::Adjustment,
                            reference,
                            allow_backdated,
                        },
                    )
                    .await
            })
            .await?;

        let net_value = mv.cost_delta.abs();
        let (inventory_debit, inventory_credit, cogs_debit, cogs_credit) = if mv.cost_delta.is_negative() {
            (Money::ZERO, net_value, net_value, Money::ZERO)
        } else {
            (net_value, Money::ZERO, Money::ZERO, net_value)
        };

        let correlation_id = mv.id.clone();
        let entry = self
            .poster
            .post_journal_entry(PostJournalEntryInput {
                company_id: input.company_id.clone(),
                date: input.adjustment_date,
                description: format!("Inventory adjustment: item {} ({})", input.item_id, input.reason),
                created_by_user_id: input.created_by_user_id.clone(),
                location_id: Some(input.location_id.clone()),
                reversal_of_journal_entry_id: None,
                reversal_reason: None,
                lines: vec![
                    NewLine {
                        account_id: defaults.inventory_account_id.clone(),
                        debit: inventory_debit,
                        credit: inventory_credit,
                    },
                    NewLine {
                        account_id: defaults.cogs_account_id.clone(),
                        debit: cogs_debit,
                        credit: cogs_credit,
                    },
                ],
                skip_account_validation: false,
            })
            .await
            .map_err(|err| InventoryError::Internal(err.to_string()))?;

        let mv = self
            .store
            .set_journal_entry_id(&input.company_id, &input.location_id, &input.item_id, &mv.id, &entry.id)
            .await?;

        self.emit_journal_entry_created(&input.company_id, &entry, &correlation_id).await?;
        if replays {
            self.emit_inventory_recalc_requested(
                &input.company_id,
                &input.location_id,
                &input.item_id,
                input.adjustment_date,
                &correlation_id,
            )
            .await?;
        }

        Ok((mv, balance))
    }
}

async fn ensure_default_location(store: &Arc<dyn InventoryStore>, company_id: &str) -> InventoryResult<LocationId> {
    let locations = store.list_locations(company_id).await?;
    if let Some(existing) = locations.into_iter().find(|location| location.is_default) {
        return Ok(existing.id);
    }
    let location = store
        .upsert_location(Location {
            id: Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            name: DEFAULT_LOCATION_NAME.to_string(),
            is_default: true,
            is_active: true,
        })
        .await?;
    Ok(location.id)
}

#[allow(clippy::too_many_arguments)]
async fn ensure_account(
    ledger_store: &Arc<dyn LedgerStore>,
    company_id: &str,
    code: &str,
    name: &str,
    account_type: AccountType,
    normal_balance: NormalBalance,
    report_group: ReportGroup,
) -> InventoryResult<String> {
    if let Some(existing) = ledger_store
        .find_account_by_code(company_id, code)
        .await
        .map_err(|err| InventoryError::Internal(err.to_string()))?
    {
        return Ok(existing.id);
    }
    let account = ledger_store
        .upsert_account(Account {
            id: Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            normal_balance,
            report_group: Some(report_group),
            cashflow_activity: None,
            is_active: true,
        })
        .await
        .map_err(|err| InventoryError::Internal(err.to_string()))?;
    Ok(account.id)
}
