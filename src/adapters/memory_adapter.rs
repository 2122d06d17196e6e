//! In-memory ledger store.
//!
//! Backs the unit and property tests and the `memory` demo backend. The unit
//! of work runs against a cloned copy of the state and swaps it in on commit,
//! so rollback-on-error behaves exactly like the database adapters. Commit
//! failures can be injected to exercise atomicity under store errors.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::error::{LedgerError, OrderError};
use crate::domain::position::Position;
use crate::domain::stock::{NewStock, Stock};
use crate::domain::transaction::{NewTransaction, Transaction};
use crate::domain::user::User;
use crate::ports::ledger_port::{LedgerStore, LedgerTx};

#[derive(Debug, Clone)]
struct LedgerState {
    stocks: BTreeMap<i64, Stock>,
    users: BTreeMap<i64, User>,
    positions: BTreeMap<(i64, i64), i64>,
    transactions: Vec<Transaction>,
    next_stock_id: i64,
    next_user_id: i64,
    next_transaction_id: i64,
}

impl LedgerState {
    fn new() -> Self {
        LedgerState {
            stocks: BTreeMap::new(),
            users: BTreeMap::new(),
            positions: BTreeMap::new(),
            transactions: Vec::new(),
            next_stock_id: 1,
            next_user_id: 1,
            next_transaction_id: 1,
        }
    }
}

pub struct MemoryLedgerStore {
    state: RefCell<LedgerState>,
    fail_next_commit: Cell<bool>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        MemoryLedgerStore {
            state: RefCell::new(LedgerState::new()),
            fail_next_commit: Cell::new(false),
        }
    }

    /// Make the next unit of work fail at commit, after its writes ran.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.set(true);
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        MemoryLedgerStore::new()
    }
}

struct MemoryTx<'a> {
    state: &'a mut LedgerState,
}

impl LedgerTx for MemoryTx<'_> {
    fn stock(&mut self, stock_id: i64) -> Result<Option<Stock>, LedgerError> {
        Ok(self.state.stocks.get(&stock_id).cloned())
    }

    fn user(&mut self, user_id: i64) -> Result<Option<User>, LedgerError> {
        Ok(self.state.users.get(&user_id).cloned())
    }

    fn position(&mut self, user_id: i64, stock_id: i64) -> Result<Option<Position>, LedgerError> {
        Ok(self
            .state
            .positions
            .get(&(user_id, stock_id))
            .map(|&quantity| Position {
                user_id,
                stock_id,
                quantity,
            }))
    }

    fn update_balance(&mut self, user_id: i64, balance: Decimal) -> Result<(), LedgerError> {
        let user = self
            .state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::DatabaseQuery {
                reason: format!("no user row {user_id}"),
            })?;
        user.balance = balance;
        Ok(())
    }

    fn set_position(
        &mut self,
        user_id: i64,
        stock_id: i64,
        quantity: i64,
    ) -> Result<(), LedgerError> {
        if quantity < 0 {
            return Err(LedgerError::DatabaseQuery {
                reason: format!("position quantity must be >= 0, got {quantity}"),
            });
        }
        if quantity == 0 {
            self.state.positions.remove(&(user_id, stock_id));
        } else {
            self.state.positions.insert((user_id, stock_id), quantity);
        }
        Ok(())
    }

    fn append_transaction(&mut self, entry: &NewTransaction) -> Result<i64, LedgerError> {
        let id = self.state.next_transaction_id;
        self.state.next_transaction_id += 1;
        self.state.transactions.push(Transaction {
            id,
            user_id: entry.user_id,
            stock_id: entry.stock_id,
            quantity: entry.quantity,
            price: entry.price,
            direction: entry.direction,
            executed_at: entry.executed_at,
        });
        Ok(id)
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn initialize(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    fn get_stock(&self, stock_id: i64) -> Result<Option<Stock>, LedgerError> {
        Ok(self.state.borrow().stocks.get(&stock_id).cloned())
    }

    fn list_stocks(&self) -> Result<Vec<Stock>, LedgerError> {
        Ok(self.state.borrow().stocks.values().cloned().collect())
    }

    fn insert_stock(&self, stock: &NewStock) -> Result<i64, LedgerError> {
        let mut state = self.state.borrow_mut();
        if state.stocks.values().any(|s| s.symbol == stock.symbol) {
            return Err(LedgerError::DatabaseQuery {
                reason: format!("symbol {} already listed", stock.symbol),
            });
        }
        let id = state.next_stock_id;
        state.next_stock_id += 1;
        state.stocks.insert(
            id,
            Stock {
                id,
                symbol: stock.symbol.clone(),
                name: stock.name.clone(),
                kind: stock.kind,
                current_price: stock.price,
                updated_at: Utc::now(),
            },
        );
        Ok(id)
    }

    fn update_stock_price(
        &self,
        stock_id: i64,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.borrow_mut();
        let stock = state
            .stocks
            .get_mut(&stock_id)
            .ok_or_else(|| LedgerError::DatabaseQuery {
                reason: format!("no stock row {stock_id}"),
            })?;
        stock.current_price = price;
        stock.updated_at = at;
        Ok(())
    }

    fn get_user(&self, user_id: i64) -> Result<Option<User>, LedgerError> {
        Ok(self.state.borrow().users.get(&user_id).cloned())
    }

    fn insert_user(&self, name: &str, balance: Decimal) -> Result<i64, LedgerError> {
        let mut state = self.state.borrow_mut();
        if state.users.values().any(|u| u.name == name) {
            return Err(LedgerError::DatabaseQuery {
                reason: format!("user {name} already exists"),
            });
        }
        let id = state.next_user_id;
        state.next_user_id += 1;
        state.users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                balance,
            },
        );
        Ok(id)
    }

    fn get_position(&self, user_id: i64, stock_id: i64) -> Result<Option<Position>, LedgerError> {
        Ok(self
            .state
            .borrow()
            .positions
            .get(&(user_id, stock_id))
            .map(|&quantity| Position {
                user_id,
                stock_id,
                quantity,
            }))
    }

    fn positions_for_user(&self, user_id: i64) -> Result<Vec<Position>, LedgerError> {
        Ok(self
            .state
            .borrow()
            .positions
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|(&(user_id, stock_id), &quantity)| Position {
                user_id,
                stock_id,
                quantity,
            })
            .collect())
    }

    fn transactions_for_user(&self, user_id: i64) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self
            .state
            .borrow()
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect())
    }

    fn with_unit_of_work(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), OrderError>,
    ) -> Result<(), OrderError> {
        let mut draft = self.state.borrow().clone();
        work(&mut MemoryTx { state: &mut draft })?;

        if self.fail_next_commit.replace(false) {
            return Err(OrderError::Persistence(LedgerError::Database {
                reason: "injected commit failure".into(),
            }));
        }
        *self.state.borrow_mut() = draft;
        Ok(())
    }
}
