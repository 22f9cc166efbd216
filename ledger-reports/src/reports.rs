use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use ledger_core::Account;
use ledger_core::AccountId;
use ledger_core::AccountType;
use ledger_core::LedgerStore;
use ledger_core::NormalBalance;
use ledger_inventory::InventoryStore;
use ledger_inventory::ItemId;
use ledger_inventory::LocationId;
use ledger_inventory::StockMove;
use ledger_money::Money;

use crate::ReportsResult;

#[derive(Debug, Clone, PartialEq)]
pub struct TrialBalanceLine {
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub debit_total: Money,
    pub credit_total: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSheetLine {
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub balance: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSheet {
    pub assets: Vec<BalanceSheetLine>,
    pub liabilities: Vec<BalanceSheetLine>,
    pub equity: Vec<BalanceSheetLine>,
    /// Synthetic "9999 Current Period Earnings" line: income minus expense
    /// for the as-of year, folded into equity so assets == liabilities +
    /// equity even before a formal period close posts it for real.
    pub current_period_earnings: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfitAndLoss {
    pub income: Vec<BalanceSheetLine>,
    pub expense: Vec<BalanceSheetLine>,
    pub net_income: Money,
}

/// One of the five working-capital roll-ups (spec §4.10): Accounts
/// Receivable, Inventory, Other Current Assets, Accounts Payable, Other
/// Current Liabilities. Always present, even at zero, so a statement's shape
/// doesn't depend on which report groups happen to have activity.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingCapitalLine {
    pub label: &'static str,
    pub amount: Money,
}

/// One operating-activity account outside the five working-capital groups,
/// ranked by absolute cash effect.
#[derive(Debug, Clone, PartialEq)]
pub struct OtherOperatingLine {
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CashflowStatement {
    pub net_income: Money,
    pub working_capital: Vec<WorkingCapitalLine>,
    /// Remaining operating-activity movements, sorted by absolute effect and
    /// capped at the top 10; `operating` itself sums every such movement; not
    /// just the ones shown here.
    pub other_operating: Vec<OtherOperatingLine>,
    pub operating: Money,
    pub investing: Money,
    pub financing: Money,
    pub net_change_in_cash: Money,
    pub cash_begin: Money,
    pub cash_end: Money,
    /// `operating + investing + financing == cash_end - cash_begin`. False
    /// means an account missing `report_group`/`cashflow_activity` fell
    /// through a gap — the line items still sum the transactions, but the
    /// categorization can't be trusted until every cash-touching account is
    /// tagged.
    pub reconciles: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryValuationLine {
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub quantity_on_hand: i64,
    pub total_value: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CogsLine {
    pub item_id: ItemId,
    pub cogs_total: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountTransactionLine {
    pub journal_entry_id: String,
    pub entry_number: String,
    pub date: NaiveDate,
    pub debit: Money,
    pub credit: Money,
    pub running_balance: Money,
}

/// Pure reader over [`LedgerStore`]/[`InventoryStore`]. Every method
/// recomputes from the source of truth; nothing here is cached (that's
/// what [`crate::projections`] is for).
pub struct ReportsEngine {
    ledger: Arc<dyn LedgerStore>,
    inventory: Arc<dyn InventoryStore>,
}

impl ReportsEngine {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, inventory: Arc<dyn InventoryStore>) -> Self {
        Self { ledger, inventory }
    }

    async fn account_totals_as_of(&self, company_id: &str, as_of: NaiveDate) -> ReportsResult<HashMap<AccountId, (Money, Money)>> {
        let entries = self.ledger.list_entries(company_id).await?;
        let mut totals: HashMap<AccountId, (Money, Money)> = HashMap::new();
        for entry in entries.iter().filter(|entry| !entry.is_voided() && entry.date <= as_of) {
            for line in &entry.lines {
                let slot = totals.entry(line.account_id.clone()).or_insert((Money::ZERO, Money::ZERO));
                slot.0 = slot.0.checked_add(line.debit).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                slot.1 = slot.1.checked_add(line.credit).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
            }
        }
        Ok(totals)
    }

    async fn account_totals_in_range(&self, company_id: &str, from: NaiveDate, to: NaiveDate) -> ReportsResult<HashMap<AccountId, (Money, Money)>> {
        let entries = self.ledger.list_entries_in_range(company_id, from, to).await?;
        let mut totals: HashMap<AccountId, (Money, Money)> = HashMap::new();
        for entry in entries.iter().filter(|entry| !entry.is_voided()) {
            for line in &entry.lines {
                let slot = totals.entry(line.account_id.clone()).or_insert((Money::ZERO, Money::ZERO));
                slot.0 = slot.0.checked_add(line.debit).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                slot.1 = slot.1.checked_add(line.credit).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
            }
        }
        Ok(totals)
    }

    fn balance_of(account: &Account, debit_total: Money, credit_total: Money) -> ReportsResult<Money> {
        let result = match account.normal_balance {
            NormalBalance::Debit => debit_total.checked_sub(credit_total),
            NormalBalance::Credit => credit_total.checked_sub(debit_total),
        };
        result.map_err(|err| crate::ReportsError::Internal(err.to_string()))
    }

    pub async fn trial_balance(&self, company_id: &str, as_of: NaiveDate) -> ReportsResult<Vec<TrialBalanceLine>> {
        let totals = self.account_totals_as_of(company_id, as_of).await?;
        let accounts = self.ledger.list_accounts(company_id).await?;
        let mut lines: Vec<TrialBalanceLine> = accounts
            .into_iter()
            .filter_map(|account| {
                totals.get(&account.id).map(|(debit_total, credit_total)| TrialBalanceLine {
                    account_id: account.id,
                    code: account.code,
                    name: account.name,
                    debit_total: *debit_total,
                    credit_total: *credit_total,
                })
            })
            .collect();
        lines.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(lines)
    }

    pub async fn balance_sheet(&self, company_id: &str, as_of: NaiveDate) -> ReportsResult<BalanceSheet> {
        let totals = self.account_totals_as_of(company_id, as_of).await?;
        let accounts = self.ledger.list_accounts(company_id).await?;

        let mut assets = Vec::new();
        let mut liabilities = Vec::new();
        let mut equity = Vec::new();
        let mut income_total = Money::ZERO;
        let mut expense_total = Money::ZERO;

        for account in &accounts {
            let Some((debit_total, credit_total)) = totals.get(&account.id).copied() else {
                continue;
            };
            let balance = Self::balance_of(account, debit_total, credit_total)?;
            let line = BalanceSheetLine {
                account_id: account.id.clone(),
                code: account.code.clone(),
                name: account.name.clone(),
                balance,
            };
            match account.account_type {
                AccountType::Asset => assets.push(line),
                AccountType::Liability => liabilities.push(line),
                AccountType::Equity => equity.push(line),
                AccountType::Income => {
                    income_total = income_total
                        .checked_add(balance)
                        .map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                }
                AccountType::Expense => {
                    expense_total = expense_total
                        .checked_add(balance)
                        .map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                }
            }
        }

        let current_period_earnings = income_total
            .checked_sub(expense_total)
            .map_err(|err| crate::ReportsError::Internal(err.to_string()))?;

        for group in [&mut assets, &mut liabilities, &mut equity] {
            group.sort_by(|a, b| a.code.cmp(&b.code));
        }

        Ok(BalanceSheet {
            assets,
            liabilities,
            equity,
            current_period_earnings,
        })
    }

    pub async fn profit_and_loss(&self, company_id: &str, from: NaiveDate, to: NaiveDate) -> ReportsResult<ProfitAndLoss> {
        let totals = self.account_totals_in_range(company_id, from, to).await?;
        let accounts = self.ledger.list_accounts(company_id).await?;

        let mut income = Vec::new();
        let mut expense = Vec::new();
        let mut net_income = Money::ZERO;

        for account in &accounts {
            let Some((debit_total, credit_total)) = totals.get(&account.id).copied() else {
                continue;
            };
            let balance = Self::balance_of(account, debit_total, credit_total)?;
            match account.account_type {
                AccountType::Income => {
                    net_income = net_income.checked_add(balance).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                    income.push(BalanceSheetLine {
                        account_id: account.id.clone(),
                        code: account.code.clone(),
                        name: account.name.clone(),
                        balance,
                    });
                }
                AccountType::Expense => {
                    net_income = net_income.checked_sub(balance).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                    expense.push(BalanceSheetLine {
                        account_id: account.id.clone(),
                        code: account.code.clone(),
                        name: account.name.clone(),
                        balance,
                    });
                }
                _ => {}
            }
        }

        income.sort_by(|a, b| a.code.cmp(&b.code));
        expense.sort_by(|a, b| a.code.cmp(&b.code));

        Ok(ProfitAndLoss { income, expense, net_income })
    }

    /// Indirect-method cashflow (spec §4.10): starts from net profit, rolls
    /// working-capital accounts (AR/Inventory/Other Current Assets/AP/Other
    /// Current Liabilities) into labeled lines, buckets everything else into
    /// operating/investing/financing per its resolved
    /// [`ledger_core::CashflowActivity`], and cross-checks against the
    /// period's actual change in cash-account balances.
    pub async fn cashflow_statement(&self, company_id: &str, from: NaiveDate, to: NaiveDate) -> ReportsResult<CashflowStatement> {
        let totals = self.account_totals_in_range(company_id, from, to).await?;
        let accounts = self.ledger.list_accounts(company_id).await?;

        let working_capital_labels = [
            "Accounts Receivable",
            "Inventory",
            "Other Current Assets",
            "Accounts Payable",
            "Other Current Liabilities",
        ];
        let mut working_capital: HashMap<&'static str, Money> =
            working_capital_labels.iter().map(|label| (*label, Money::ZERO)).collect();

        let mut net_income = Money::ZERO;
        let mut other_operating: Vec<OtherOperatingLine> = Vec::new();
        let mut investing = Money::ZERO;
        let mut financing = Money::ZERO;
        let mut cash_change = Money::ZERO;

        for account in &accounts {
            let Some((debit_total, credit_total)) = totals.get(&account.id).copied() else {
                continue;
            };
            let balance = Self::balance_of(account, debit_total, credit_total)?;

            if account.report_group == Some(ledger_core::ReportGroup::CashAndCashEquivalents) {
                cash_change = cash_change.checked_add(balance).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                continue;
            }

            match account.account_type {
                AccountType::Income => {
                    net_income = net_income.checked_add(balance).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                    continue;
                }
                AccountType::Expense => {
                    net_income = net_income.checked_sub(balance).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                    continue;
                }
                _ => {}
            }

            // A cash inflow corresponds to a *decrease* in a non-cash
            // debit-side account or an *increase* in a credit-side one, so
            // the contribution to cash is the balance change with its sign
            // flipped for debit-normal accounts.
            let contribution = match account.normal_balance {
                NormalBalance::Debit => balance.negate(),
                NormalBalance::Credit => balance,
            };

            let working_capital_label = match account.report_group {
                Some(ledger_core::ReportGroup::AccountsReceivable) => Some("Accounts Receivable"),
                Some(ledger_core::ReportGroup::Inventory) => Some("Inventory"),
                Some(ledger_core::ReportGroup::OtherCurrentAsset) => Some("Other Current Assets"),
                Some(ledger_core::ReportGroup::AccountsPayable) => Some("Accounts Payable"),
                Some(ledger_core::ReportGroup::OtherCurrentLiability) => Some("Other Current Liabilities"),
                _ => None,
            };

            if let Some(label) = working_capital_label {
                let slot = working_capital.entry(label).or_insert(Money::ZERO);
                *slot = slot.checked_add(contribution).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                continue;
            }

            match account.resolved_cashflow_activity() {
                ledger_core::CashflowActivity::Operating => {
                    other_operating.push(OtherOperatingLine {
                        account_id: account.id.clone(),
                        code: account.code.clone(),
                        name: account.name.clone(),
                        amount: contribution,
                    });
                }
                ledger_core::CashflowActivity::Investing => {
                    investing = investing.checked_add(contribution).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                }
                ledger_core::CashflowActivity::Financing => {
                    financing = financing.checked_add(contribution).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                }
            }
        }

        let working_capital_total = Money::sum(working_capital.values().copied()).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
        let other_operating_total =
            Money::sum(other_operating.iter().map(|line| line.amount)).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;

        let operating = net_income
            .checked_add(working_capital_total)
            .and_then(|sum| sum.checked_add(other_operating_total))
            .map_err(|err| crate::ReportsError::Internal(err.to_string()))?;

        let total = operating
            .checked_add(investing)
            .and_then(|sum| sum.checked_add(financing))
            .map_err(|err| crate::ReportsError::Internal(err.to_string()))?;

        other_operating.sort_by(|a, b| b.amount.abs().minor_units().cmp(&a.amount.abs().minor_units()));
        other_operating.truncate(10);

        let working_capital_lines: Vec<WorkingCapitalLine> = working_capital_labels
            .into_iter()
            .map(|label| WorkingCapitalLine {
                label,
                amount: working_capital[label],
            })
            .collect();

        let cash_end_totals = self.account_totals_as_of(company_id, to).await?;
        let mut cash_end = Money::ZERO;
        for account in &accounts {
            if account.report_group != Some(ledger_core::ReportGroup::CashAndCashEquivalents) {
                continue;
            }
            let Some((debit_total, credit_total)) = cash_end_totals.get(&account.id).copied() else {
                continue;
            };
            let balance = Self::balance_of(account, debit_total, credit_total)?;
            cash_end = cash_end.checked_add(balance).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
        }
        let cash_begin = cash_end.checked_sub(cash_change).map_err(|err| crate::ReportsError::Internal(err.to_string()))?;

        Ok(CashflowStatement {
            net_income,
            working_capital: working_capital_lines,
            other_operating,
            operating,
            investing,
            financing,
            net_change_in_cash: cash_change,
            cash_begin,
            cash_end,
            reconciles: total == cash_change,
        })
    }

    pub async fn inventory_valuation(&self, company_id: &str, location_id: &str, item_ids: &[ItemId]) -> ReportsResult<Vec<InventoryValuationLine>> {
        let mut lines = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let balance = self.inventory.get_balance(company_id, location_id, item_id).await?;
            lines.push(InventoryValuationLine {
                location_id: location_id.to_string(),
                item_id: item_id.clone(),
                quantity_on_hand: balance.quantity_on_hand,
                total_value: balance.total_value,
            });
        }
        Ok(lines)
    }

    pub async fn inventory_movement(&self, company_id: &str, location_id: &str, item_id: &str) -> ReportsResult<Vec<StockMove>> {
        Ok(self.inventory.list_moves(company_id, location_id, item_id).await?)
    }

    pub async fn cogs_by_item(&self, company_id: &str, location_id: &str, item_ids: &[ItemId]) -> ReportsResult<Vec<CogsLine>> {
        let mut lines = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let moves = self.inventory.list_moves(company_id, location_id, item_id).await?;
            let mut cogs_total = Money::ZERO;
            for mv in moves.iter().filter(|mv| mv.quantity_delta < 0) {
                cogs_total = cogs_total
                    .checked_add(mv.cost_delta.negate())
                    .map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
            }
            lines.push(CogsLine {
                item_id: item_id.clone(),
                cogs_total,
            });
        }
        Ok(lines)
    }

    pub async fn account_transactions(&self, company_id: &str, account_id: &str, from: NaiveDate, to: NaiveDate) -> ReportsResult<Vec<AccountTransactionLine>> {
        let account = self
            .ledger
            .get_account(company_id, account_id)
            .await?
            .ok_or_else(|| crate::ReportsError::Internal(format!("unknown account {account_id}")))?;

        // Opening balance: every posted line on this account dated before
        // `from`, so running_balance starts where the prior period left off
        // rather than at zero.
        let mut running_balance = Money::ZERO;
        if let Some(day_before_range) = from.pred_opt() {
            let prior_entries = self.ledger.list_entries(company_id).await?;
            for entry in prior_entries.iter().filter(|entry| !entry.is_voided() && entry.date <= day_before_range) {
                for line in entry.lines.iter().filter(|line| line.account_id == account_id) {
                    let delta = Self::balance_of(&account, line.debit, line.credit)?;
                    running_balance = running_balance
                        .checked_add(delta)
                        .map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                }
            }
        }

        let entries = self.ledger.list_entries_in_range(company_id, from, to).await?;
        let mut lines = Vec::new();
        for entry in entries.iter().filter(|entry| !entry.is_voided()) {
            for line in entry.lines.iter().filter(|line| line.account_id == account_id) {
                let delta = Self::balance_of(&account, line.debit, line.credit)?;
                running_balance = running_balance
                    .checked_add(delta)
                    .map_err(|err| crate::ReportsError::Internal(err.to_string()))?;
                lines.push(AccountTransactionLine {
                    journal_entry_id: entry.id.clone(),
                    entry_number: entry.entry_number.clone(),
                    date: entry.date,
                    debit: line.debit,
                    credit: line.credit,
                    running_balance,
                });
            }
        }
        Ok(lines)
    }
}
