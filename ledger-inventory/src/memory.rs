use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use ledger_money::Money;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::CompanyId;
use crate::InventoryError;
use crate::InventoryResult;
use crate::InventoryStore;
use crate::Item;
use crate::ItemId;
use crate::Location;
use crate::LocationId;
use crate::NewStockMove;
use crate::StockBalance;
use crate::StockMove;

type StockKey = (CompanyId, LocationId, ItemId);

#[derive(Default)]
pub struct InMemoryInventoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    items: HashMap<(CompanyId, ItemId), Item>,
    locations: HashMap<(CompanyId, LocationId), Location>,
    moves: HashMap<StockKey, Vec<StockMove>>,
    sequences: HashMap<StockKey, u64>,
}

impl InMemoryInventoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Replays `moves` (already sorted by `(move_date, sequence)`) from an empty
/// position, recomputing each move's `cost_delta`/`resulting_*` fields.
/// Fails fast on the first move that would take quantity negative.
fn replay(key: &StockKey, moves: &mut [StockMove]) -> InventoryResult<StockBalance> {
    let mut quantity = 0_i64;
    let mut average_cost = Money::ZERO;
    let mut total_value = Money::ZERO;

    for mv in moves.iter_mut() {
        if mv.quantity_delta >= 0 {
            let unit_cost = mv.unit_cost.unwrap_or(Money::ZERO);
            let incoming_value = unit_cost
                .checked_mul_quantity(mv.quantity_delta)
                .map_err(|err| InventoryError::Internal(err.to_string()))?;
            total_value = total_value
                .checked_add(incoming_value)
                .map_err(|err| InventoryError::Internal(err.to_string()))?;
            quantity += mv.quantity_delta;
            average_cost = if quantity == 0 {
                Money::ZERO
            } else {
                total_value
                    .divide_round(quantity)
                    .map_err(|err| InventoryError::Internal(err.to_string()))?
            };
            mv.cost_delta = incoming_value;
        } else {
            let requested = -mv.quantity_delta;
            if requested > quantity {
                return Err(InventoryError::InsufficientStock {
                    location_id: key.1.clone(),
                    item_id: key.2.clone(),
                    available: quantity,
                    requested,
                });
            }
            let outgoing_value = average_cost
                .checked_mul_quantity(requested)
                .map_err(|err| InventoryError::Internal(err.to_string()))?;
            total_value = total_value
                .checked_sub(outgoing_value)
                .map_err(|err| InventoryError::Internal(err.to_string()))?;
            quantity -= requested;
            mv.cost_delta = outgoing_value.negate();
        }
        mv.resulting_quantity = quantity;
        mv.resulting_average_cost = average_cost;
    }

    Ok(StockBalance {
        quantity_on_hand: quantity,
        average_unit_cost: average_cost,
        total_value,
    })
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_item(&self, company_id: &str, item_id: &str) -> InventoryResult<Option<Item>> {
        let state = self.state.lock().await;
        Ok(state.items.get(&(company_id.to_string(), item_id.to_string())).cloned())
    }

    async fn list_items(&self, company_id: &str) -> InventoryResult<Vec<Item>> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .values()
            .filter(|item| item.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn upsert_item(&self, item: Item) -> InventoryResult<Item> {
        let mut state = self.state.lock().await;
        state.items.insert((item.company_id.clone(), item.id.clone()), item.clone());
        Ok(item)
    }

    async fn get_location(&self, company_id: &str, location_id: &str) -> InventoryResult<Option<Location>> {
        let state = self.state.lock().await;
        Ok(state
            .locations
            .get(&(company_id.to_string(), location_id.to_string()))
            .cloned())
    }

    async fn list_locations(&self, company_id: &str) -> InventoryResult<Vec<Location>> {
        let state = self.state.lock().await;
        Ok(state
            .locations
            .values()
            .filter(|location| location.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn upsert_location(&self, location: Location) -> InventoryResult<Location> {
        let mut state = self.state.lock().await;
        state
            .locations
            .insert((location.company_id.clone(), location.id.clone()), location.clone());
        Ok(location)
    }

    async fn get_balance(&self, company_id: &str, location_id: &str, item_id: &str) -> InventoryResult<StockBalance> {
        let state = self.state.lock().await;
        let key = (company_id.to_string(), location_id.to_string(), item_id.to_string());
        Ok(state
            .moves
            .get(&key)
            .and_then(|moves| moves.last())
            .map(|last| StockBalance {
                quantity_on_hand: last.resulting_quantity,
                average_unit_cost: last.resulting_average_cost,
                total_value: last
                    .resulting_average_cost
                    .checked_mul_quantity(last.resulting_quantity)
                    .unwrap_or(Money::ZERO),
            })
            .unwrap_or_else(StockBalance::zero))
    }

    async fn list_moves(&self, company_id: &str, location_id: &str, item_id: &str) -> InventoryResult<Vec<StockMove>> {
        let state = self.state.lock().await;
        let key = (company_id.to_string(), location_id.to_string(), item_id.to_string());
        Ok(state.moves.get(&key).cloned().unwrap_or_default())
    }

    async fn record_move(
        &self,
        company_id: &str,
        location_id: &str,
        item_id: &str,
        new_move: NewStockMove,
    ) -> InventoryResult<(StockMove, StockBalance)> {
        let mut state = self.state.lock().await;
        let key: StockKey = (company_id.to_string(), location_id.to_string(), item_id.to_string());

        let existing = state.moves.get(&key).cloned().unwrap_or_default();
        if let Some(last_date) = existing.iter().map(|mv| mv.move_date).max() {
            if new_move.move_date < last_date && !new_move.allow_backdated {
                return Err(InventoryError::Backdated {
                    location_id: key.1.clone(),
                    item_id: key.2.clone(),
                    move_date: new_move.move_date,
                });
            }
        }

        let sequence_slot = state.sequences.entry(key.clone()).or_insert(0);
        *sequence_slot += 1;
        let sequence = *sequence_slot;
        let move_id = Uuid::new_v4().to_string();

        let candidate = StockMove {
            id: move_id.clone(),
            company_id: key.0.clone(),
            location_id: key.1.clone(),
            item_id: key.2.clone(),
            sequence,
            move_date: new_move.move_date,
            quantity_delta: new_move.quantity_delta,
            unit_cost: new_move.unit_cost,
            move_type: new_move.move_type,
            reference: new_move.reference,
            allow_backdated: new_move.allow_backdated,
            cost_delta: Money::ZERO,
            resulting_quantity: 0,
            resulting_average_cost: Money::ZERO,
            journal_entry_id: None,
            created_at: Utc::now(),
        };

        let mut moves = existing;
        let insert_at = moves
            .iter()
            .position(|existing| (existing.move_date, existing.sequence) > (candidate.move_date, candidate.sequence))
            .unwrap_or(moves.len());
        moves.insert(insert_at, candidate);

        let balance = replay(&key, &mut moves)?;

        let persisted = moves[insert_at].clone();
        state.moves.insert(key, moves);
        Ok((persisted, balance))
    }

    async fn set_journal_entry_id(
        &self,
        company_id: &str,
        location_id: &str,
        item_id: &str,
        move_id: &str,
        journal_entry_id: &str,
    ) -> InventoryResult<StockMove> {
        let mut state = self.state.lock().await;
        let key: StockKey = (company_id.to_string(), location_id.to_string(), item_id.to_string());
        let moves = state
            .moves
            .get_mut(&key)
            .ok_or_else(|| InventoryError::NotFound(format!("stock move {move_id}")))?;
        let mv = moves
            .iter_mut()
            .find(|mv| mv.id == move_id)
            .ok_or_else(|| InventoryError::NotFound(format!("stock move {move_id}")))?;
        mv.journal_entry_id = Some(journal_entry_id.to_string());
        Ok(mv.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use chrono::NaiveDate;

    use crate::StockMoveType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[tokio::test]
    async fn three_purchases_then_a_sale_uses_weighted_average_cost() {
        let store = InMemoryInventoryStore::new();

        for (date_day, quantity, unit_cost_cents) in [(1, 10, 100), (2, 10, 200), (3, 10, 300)] {
            store
                .record_move(
                    "co-1",
                    "loc-1",
                    "item-1",
                    NewStockMove {
                        move_date: date(2025, 1, date_day),
                        quantity_delta: quantity,
                        unit_cost: Some(Money::from_minor_units(unit_cost_cents)),
                        move_type: StockMoveType::Purchase,
                        reference: None,
                        allow_backdated: false,
                    },
                )
                .await
                .expect("purchase");
        }

        // 30 units, total value 10*100 + 10*200 + 10*300 = 6000 cents, avg = 200 cents.
        let (sale_move, balance) = store
            .record_move(
                "co-1",
                "loc-1",
                "item-1",
                NewStockMove {
                    move_date: date(2025, 1, 10),
                    quantity_delta: -5,
                    unit_cost: None,
                    move_type: StockMoveType::Sale,
                    reference: None,
                    allow_backdated: false,
                },
            )
            .await
            .expect("sale");

        assert_eq!(sale_move.resulting_average_cost, Money::from_minor_units(200));
        assert_eq!(sale_move.resulting_quantity, 25);
        assert_eq!(sale_move.cost_delta, Money::from_minor_units(-1_000));
        assert_eq!(balance.quantity_on_hand, 25);
        assert_eq!(balance.average_unit_cost, Money::from_minor_units(200));
    }

    #[tokio::test]
    async fn backdated_purchase_replays_every_later_move() {
        let store = InMemoryInventoryStore::new();

        store
            .record_move(
                "co-1",
                "loc-1",
                "item-1",
                NewStockMove {
                    move_date: date(2025, 1, 1),
                    quantity_delta: 10,
                    unit_cost: Some(Money::from_minor_units(100)),
                    move_type: StockMoveType::Purchase,
                    reference: None,
                    allow_backdated: false,
                },
            )
            .await
            .expect("first purchase");

        let (_, balance_before_backdate) = store
            .record_move(
                "co-1",
                "loc-1",
                "item-1",
                NewStockMove {
                    move_date: date(2025, 1, 5),
                    quantity_delta: -4,
                    unit_cost: None,
                    move_type: StockMoveType::Sale,
                    reference: None,
                    allow_backdated: false,
                },
            )
            .await
            .expect("sale before backdate");
        assert_eq!(balance_before_backdate.average_unit_cost, Money::from_minor_units(100));

        // Insert a purchase dated before the sale: WAC at the time of the
        // sale should change, so the sale's recorded average cost shifts too.
        let (_, balance_after_backdate) = store
            .record_move(
                "co-1",
                "loc-1",
                "item-1",
                NewStockMove {
                    move_date: date(2025, 1, 3),
                    quantity_delta: 10,
                    unit_cost: Some(Money::from_minor_units(300)),
                    move_type: StockMoveType::Purchase,
                    reference: None,
                    allow_backdated: true,
                },
            )
            .await
            .expect("backdated purchase");

        let moves = store.list_moves("co-1", "loc-1", "item-1").await.expect("moves");
        let sale = moves.iter().find(|mv| mv.quantity_delta == -4).expect("sale move");
        // 20 units, 10*100 + 10*300 = 4000 -> avg 200 at the time of the sale.
        assert_eq!(sale.resulting_average_cost, Money::from_minor_units(200));
        assert_eq!(balance_after_backdate.quantity_on_hand, 16);
    }

    #[tokio::test]
    async fn sale_exceeding_quantity_on_hand_is_rejected() {
        let store = InMemoryInventoryStore::new();
        store
            .record_move(
                "co-1",
                "loc-1",
                "item-1",
                NewStockMove {
                    move_date: date(2025, 1, 1),
                    quantity_delta: 5,
                    unit_cost: Some(Money::from_minor_units(100)),
                    move_type: StockMoveType::Purchase,
                    reference: None,
                    allow_backdated: false,
                },
            )
            .await
            .expect("purchase");

        let err = store
            .record_move(
                "co-1",
                "loc-1",
                "item-1",
                NewStockMove {
                    move_date: date(2025, 1, 2),
                    quantity_delta: -6,
                    unit_cost: None,
                    move_type: StockMoveType::Sale,
                    reference: None,
                    allow_backdated: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
    }

    #[tokio::test]
    async fn backdated_move_without_allow_backdated_is_rejected() {
        let store = InMemoryInventoryStore::new();
        store
            .record_move(
                "co-1",
                "loc-1",
                "item-1",
                NewStockMove {
                    move_date: date(2025, 1, 10),
                    quantity_delta: 10,
                    unit_cost: Some(Money::from_minor_units(100)),
                    move_type: StockMoveType::Purchase,
                    reference: None,
                    allow_backdated: false,
                },
            )
            .await
            .expect("purchase");

        let err = store
            .record_move(
                "co-1",
                "loc-1",
                "item-1",
                NewStockMove {
                    move_date: date(2025, 1, 5),
                    quantity_delta: 5,
                    unit_cost: Some(Money::from_minor_units(90)),
                    move_type: StockMoveType::Purchase,
                    reference: None,
                    allow_backdated: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Backdated { .. }));
    }

    #[tokio::test]
    async fn set_journal_entry_id_backfills_a_persisted_move() {
        let store = InMemoryInventoryStore::new();
        let (mv, _) = store
            .record_move(
                "co-1",
                "loc-1",
                "item-1",
                NewStockMove {
                    move_date: date(2025, 1, 1),
                    quantity_delta: 10,
                    unit_cost: Some(Money::from_minor_units(100)),
                    move_type: StockMoveType::OpeningBalance,
                    reference: None,
                    allow_backdated: true,
                },
            )
            .await
            .expect("opening balance");
        assert_eq!(mv.journal_entry_id, None);

        let updated = store
            .set_journal_entry_id("co-1", "loc-1", "item-1", &mv.id, "je-1")
            .await
            .expect("backfill");
        assert_eq!(updated.journal_entry_id, Some("je-1".to_string()));

        let moves = store.list_moves("co-1", "loc-1", "item-1").await.expect("moves");
        assert_eq!(moves[0].journal_entry_id, Some("je-1".to_string()));
    }
}
