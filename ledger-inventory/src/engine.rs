use std::sync::Arc;

use crate::InventoryResult;
use crate::InventoryStore;
use crate::NewStockMove;
use crate::StockBalance;
use crate::StockMove;

/// `applyStockMoveWac` (spec §4.4.1): the thin entry point callers go
/// through to record a move. All of the WAC replay logic lives in the
/// store (spec §4.4.2), the same way `LedgerStore::insert_entry` owns
/// document-sequence allocation — this type exists so commands never touch
/// a concrete store implementation directly.
pub struct InventoryEngine {
    store: Arc<dyn InventoryStore>,
}

impl InventoryEngine {
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    pub async fn apply_stock_move_wac(
        &self,
        company_id: &str,
        location_id: &str,
        item_id: &str,
        new_move: NewStockMove,
    ) -> InventoryResult<(StockMove, StockBalance)> {
        self.store.record_move(company_id, location_id, item_id, new_move).await
    }

    pub async fn balance(&self, company_id: &str, location_id: &str, item_id: &str) -> InventoryResult<StockBalance> {
        self.store.get_balance(company_id, location_id, item_id).await
    }
}
