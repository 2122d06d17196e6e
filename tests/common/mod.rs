#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use rust_decimal::Decimal;
use stockbook::adapters::memory_adapter::MemoryLedgerStore;
use stockbook::domain::engine::OrderEngine;
use stockbook::domain::error::LedgerError;
use stockbook::domain::market::PriceObserver;
use stockbook::domain::stock::{NewStock, Stock, StockKind};
use stockbook::ports::ledger_port::LedgerStore;

/// Observer that records every (symbol, price) it is notified about.
pub struct RecordingObserver {
    pub updates: RefCell<Vec<(String, Decimal)>>,
}

impl RecordingObserver {
    pub fn new() -> Rc<Self> {
        Rc::new(RecordingObserver {
            updates: RefCell::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.updates.borrow().len()
    }
}

impl PriceObserver for RecordingObserver {
    fn on_price_update(&self, stock: &Stock) -> Result<(), LedgerError> {
        self.updates
            .borrow_mut()
            .push((stock.symbol.clone(), stock.current_price));
        Ok(())
    }
}

/// Observer that fails every notification.
pub struct FailingObserver;

impl PriceObserver for FailingObserver {
    fn on_price_update(&self, _stock: &Stock) -> Result<(), LedgerError> {
        Err(LedgerError::Database {
            reason: "observer offline".into(),
        })
    }
}

/// Seed one stock ("BHP" at `price`) and one user ("sam" with `balance`)
/// into any store. Returns (user_id, stock_id).
pub fn seed_store<S: LedgerStore>(store: &S, balance: Decimal, price: Decimal) -> (i64, i64) {
    let stock_id = store
        .insert_stock(&NewStock::new(StockKind::Equity, "BHP", "BHP Group", price))
        .unwrap();
    let user_id = store.insert_user("sam", balance).unwrap();
    (user_id, stock_id)
}

/// A ready-to-trade engine over a seeded in-memory store.
pub fn seeded_engine(
    balance: Decimal,
    price: Decimal,
) -> (OrderEngine<MemoryLedgerStore>, i64, i64) {
    let store = MemoryLedgerStore::new();
    let (user_id, stock_id) = seed_store(&store, balance, price);
    let engine = OrderEngine::new(store).unwrap();
    (engine, user_id, stock_id)
}

/// Snapshot of the observable trading state for one (user, stock) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub balance: Decimal,
    pub quantity: i64,
    pub transaction_count: usize,
    pub listed_price: Decimal,
}

pub fn snapshot<S: LedgerStore>(
    engine: &OrderEngine<S>,
    user_id: i64,
    stock_id: i64,
) -> StateSnapshot {
    let store = engine.store();
    StateSnapshot {
        balance: store.get_user(user_id).unwrap().unwrap().balance,
        quantity: store
            .get_position(user_id, stock_id)
            .unwrap()
            .map_or(0, |p| p.quantity),
        transaction_count: store.transactions_for_user(user_id).unwrap().len(),
        listed_price: store.get_stock(stock_id).unwrap().unwrap().current_price,
    }
}
