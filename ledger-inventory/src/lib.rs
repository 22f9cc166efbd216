#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Item/Location/StockBalance/StockMove data model and the
//! Weighted-Average-Cost engine ([`engine::InventoryEngine`]) that keeps
//! them consistent, including backdated-insert replay.

pub mod commands;
pub mod engine;
pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use ledger_money::Money;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub type CompanyId = String;
pub type LocationId = String;
pub type ItemId = String;

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InventoryError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("insufficient stock: {location_id}/{item_id} has {available} on hand, requested {requested}")]
    InsufficientStock {
        location_id: LocationId,
        item_id: ItemId,
        available: i64,
        requested: i64,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{location_id}/{item_id} has moves dated after {move_date}; pass allow_backdated to insert anyway")]
    Backdated {
        location_id: LocationId,
        item_id: ItemId,
        move_date: NaiveDate,
    },
    #[error(transparent)]
    PeriodClosed(#[from] ledger_period_close::PeriodClosePolicyError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub company_id: CompanyId,
    pub name: String,
    pub is_default: bool,
    pub is_active: bool,
}

/// Whether an item participates in the stock ledger at all. Only `Goods`
/// with `track_inventory = true` are accepted by `InventoryCommands`;
/// `Service` items exist for invoicing but never have a `StockBalance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Goods,
    Service,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub company_id: CompanyId,
    pub sku: Option<String>,
    pub name: String,
    pub item_type: ItemType,
    pub track_inventory: bool,
    pub selling_price: Option<Money>,
    pub is_active: bool,
}

impl Item {
    /// Whether this item may appear in a stock move at all (spec §3: "Only
    /// GOODS with `trackInventory = true` participate in inventory engine").
    #[must_use]
    pub fn participates_in_inventory(&self) -> bool {
        self.item_type == ItemType::Goods && self.track_inventory
    }
}

/// The current weighted-average-cost position for one item at one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StockBalance {
    pub quantity_on_hand: i64,
    pub average_unit_cost: Money,
    pub total_value: Money,
}

impl StockBalance {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            quantity_on_hand: 0,
            average_unit_cost: Money::ZERO,
            total_value: Money::ZERO,
        }
    }
}

/// What kind of event moved stock. Carried for reporting; the WAC math
/// treats every move the same way based only on the sign of `quantity_delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockMoveType {
    Purchase,
    Sale,
    OpeningBalance,
    Adjustment,
}

/// A stock movement before it has been assigned an id, sequence, or
/// WAC-derived resulting fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStockMove {
    pub move_date: NaiveDate,
    pub quantity_delta: i64,
    /// Unit cost of an inbound move. Ignored for outbound moves, where cost
    /// is derived from the running average instead.
    pub unit_cost: Option<Money>,
    pub move_type: StockMoveType,
    pub reference: Option<String>,
    /// Whether this move may be inserted before the latest existing move for
    /// its (location, item) pair. `OpeningBalance` moves default this to
    /// `true`; everything else must opt in explicitly.
    pub allow_backdated: bool,
}

/// A persisted, replay-recomputed stock movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMove {
    pub id: String,
    pub company_id: CompanyId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub sequence: u64,
    pub move_date: NaiveDate,
    pub quantity_delta: i64,
    pub unit_cost: Option<Money>,
    pub move_type: StockMoveType,
    pub reference: Option<String>,
    pub allow_backdated: bool,
    pub cost_delta: Money,
    pub resulting_quantity: i64,
    pub resulting_average_cost: Money,
    /// Set once the command layer has posted the offsetting journal entry
    /// for this move (opening balance / adjustment), so reports can join
    /// back to it. `None` for moves that don't post their own entry.
    pub journal_entry_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Persistence seam for inventory state. The in-memory implementation
/// replays every move for an (item, location) pair on each insert so that a
/// backdated move's effect propagates forward (spec §4.4.2).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_item(&self, company_id: &str, item_id: &str) -> InventoryResult<Option<Item>>;
    async fn list_items(&self, company_id: &str) -> InventoryResult<Vec<Item>>;
    async fn upsert_item(&self, item: Item) -> InventoryResult<Item>;

    async fn get_location(&self, company_id: &str, location_id: &str) -> InventoryResult<Option<Location>>;
    async fn list_locations(&self, company_id: &str) -> InventoryResult<Vec<Location>>;
    async fn upsert_location(&self, location: Location) -> InventoryResult<Location>;

    async fn get_balance(&self, company_id: &str, location_id: &str, item_id: &str) -> InventoryResult<StockBalance>;

    async fn list_moves(&self, company_id: &str, location_id: &str, item_id: &str) -> InventoryResult<Vec<StockMove>>;

    /// Inserts `new_move` in `(move_date, sequence)` order and replays every
    /// move for the (location, item) pair from scratch, rejecting the whole
    /// insert if quantity would ever go negative. Returns the persisted
    /// move (with its replay-derived fields) and the resulting balance.
    async fn record_move(
        &self,
        company_id: &str,
        location_id: &str,
        item_id: &str,
        new_move: NewStockMove,
    ) -> InventoryResult<(StockMove, StockBalance)>;

    /// Backfills `journal_entry_id` onto an already-persisted move, once the
    /// command layer has posted its offsetting journal entry. Does not
    /// affect WAC replay: the field is carried for reporting only.
    async fn set_journal_entry_id(
        &self,
        company_id: &str,
        location_id: &str,
        item_id: &str,
        move_id: &str,
        journal_entry_id: &str,
    ) -> InventoryResult<StockMove>;
}
