use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockledger_core::{MovementId, ProductId, StoreId};
use stockledger_inventory::{InvariantReport, Movement, NewMovement, StockBalance};

use super::{BalanceStore, LedgerStore, StockStore, StockTransaction, StoreError};

type Key = (StoreId, ProductId);

#[derive(Debug, Default)]
struct LedgerState {
    movements: Vec<Movement>,
    balances: BTreeMap<Key, StockBalance>,
    last_movement_id: i64,
}

/// In-memory stock store.
///
/// Intended for tests/dev. A transaction holds the whole store for its
/// lifetime, so transactions are fully serialized; committed reads wait for
/// the running transaction to finish.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Staged writes over an exclusively held [`InMemoryStockStore`].
pub struct InMemoryTransaction {
    state: OwnedMutexGuard<LedgerState>,
    movements: Vec<Movement>,
    balances: BTreeMap<Key, StockBalance>,
}

impl InMemoryTransaction {
    fn current(&self, key: &Key) -> Option<&StockBalance> {
        self.balances.get(key).or_else(|| self.state.balances.get(key))
    }

    fn stage_balance(&mut self, key: Key, quantity: i64, at: DateTime<Utc>, counted_at: Option<DateTime<Utc>>) {
        let counted_at = counted_at.or_else(|| self.current(&key).and_then(|b| b.counted_at));
        self.balances.insert(
            key,
            StockBalance {
                store_id: key.0,
                product_id: key.1,
                quantity,
                updated_at: at,
                counted_at,
            },
        );
    }
}

#[async_trait]
impl LedgerStore for InMemoryTransaction {
    async fn append(&mut self, movement: &NewMovement) -> Result<MovementId, StoreError> {
        movement.validate()?;

        let id = MovementId::from_raw(self.state.last_movement_id + self.movements.len() as i64 + 1);
        self.movements.push(movement.clone().into_recorded(id));
        Ok(id)
    }
}

#[async_trait]
impl BalanceStore for InMemoryTransaction {
    async fn get(&mut self, store_id: StoreId, product_id: ProductId) -> Result<i64, StoreError> {
        Ok(self
            .current(&(store_id, product_id))
            .map(|b| b.quantity)
            .unwrap_or(0))
    }

    async fn lock_balance(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let key = (store_id, product_id);
        match self.current(&key) {
            Some(balance) => Ok(balance.quantity),
            None => {
                self.stage_balance(key, 0, at, None);
                Ok(0)
            }
        }
    }

    async fn upsert_delta(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        delta: i64,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let key = (store_id, product_id);
        let current = self.current(&key).map(|b| b.quantity).unwrap_or(0);
        let quantity = current.checked_add(delta).ok_or_else(|| {
            StoreError::Validation(format!("balance overflow: {current} + {delta}"))
        })?;

        self.stage_balance(key, quantity, at, None);
        Ok(quantity)
    }

    async fn upsert_absolute(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        quantity: i64,
        at: DateTime<Utc>,
        counted_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.stage_balance((store_id, product_id), quantity, at, counted_at);
        Ok(())
    }
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction {
            mut state,
            movements,
            balances,
        } = *self;

        state.last_movement_id += movements.len() as i64;
        state.movements.extend(movements);
        state.balances.extend(balances);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreError> {
        let state = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            state,
            movements: Vec::new(),
            balances: BTreeMap::new(),
        }))
    }

    async fn balance(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<StockBalance>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.balances.get(&(store_id, product_id)).cloned())
    }

    async fn list_balances(&self, store_id: StoreId) -> Result<Vec<StockBalance>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .range((store_id, ProductId::from_raw(i64::MIN))..=(store_id, ProductId::from_raw(i64::MAX)))
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn movements(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Vec<Movement>, StoreError> {
        let state = self.state.lock().await;
        Ok(history(&state, store_id, product_id))
    }

    async fn verify_invariant(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<InvariantReport, StoreError> {
        let state = self.state.lock().await;
        let movements = history(&state, store_id, product_id);
        Ok(InvariantReport::new(
            store_id,
            product_id,
            state.balances.get(&(store_id, product_id)),
            &movements,
        ))
    }
}

fn history(state: &LedgerState, store_id: StoreId, product_id: ProductId) -> Vec<Movement> {
    state
        .movements
        .iter()
        .filter(|m| m.store_id == store_id && m.product_id == product_id)
        .cloned()
        .collect()
}
