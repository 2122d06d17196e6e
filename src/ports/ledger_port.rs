//! Ledger store port traits.
//!
//! [`LedgerStore`] is the durable home of stocks, users, positions and the
//! transaction ledger. Reads and single-row writes are available directly;
//! everything an order touches goes through [`LedgerStore::with_unit_of_work`],
//! which commits on `Ok` and rolls back on `Err` so a rejected or failed
//! order leaves no partial writes behind.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::error::{LedgerError, OrderError};
use crate::domain::position::Position;
use crate::domain::stock::{NewStock, Stock};
use crate::domain::transaction::{NewTransaction, Transaction};
use crate::domain::user::User;

/// Operations available inside one unit of work. Reads made here see the
/// transaction's own writes, and concurrent orders against the same rows are
/// serialized by the backing store's transaction mechanism.
pub trait LedgerTx {
    fn stock(&mut self, stock_id: i64) -> Result<Option<Stock>, LedgerError>;

    fn user(&mut self, user_id: i64) -> Result<Option<User>, LedgerError>;

    fn position(&mut self, user_id: i64, stock_id: i64) -> Result<Option<Position>, LedgerError>;

    fn update_balance(&mut self, user_id: i64, balance: Decimal) -> Result<(), LedgerError>;

    /// Upsert a position row. A quantity of zero deletes the row; negative
    /// quantities are a store error.
    fn set_position(
        &mut self,
        user_id: i64,
        stock_id: i64,
        quantity: i64,
    ) -> Result<(), LedgerError>;

    fn append_transaction(&mut self, entry: &NewTransaction) -> Result<i64, LedgerError>;
}

pub trait LedgerStore {
    /// Create the backing schema if it does not exist yet.
    fn initialize(&self) -> Result<(), LedgerError>;

    fn get_stock(&self, stock_id: i64) -> Result<Option<Stock>, LedgerError>;

    fn list_stocks(&self) -> Result<Vec<Stock>, LedgerError>;

    fn insert_stock(&self, stock: &NewStock) -> Result<i64, LedgerError>;

    /// Write a stock's post-trade price. Called after the order's unit of
    /// work has committed, never inside it.
    fn update_stock_price(
        &self,
        stock_id: i64,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    fn get_user(&self, user_id: i64) -> Result<Option<User>, LedgerError>;

    fn insert_user(&self, name: &str, balance: Decimal) -> Result<i64, LedgerError>;

    fn get_position(&self, user_id: i64, stock_id: i64) -> Result<Option<Position>, LedgerError>;

    fn positions_for_user(&self, user_id: i64) -> Result<Vec<Position>, LedgerError>;

    fn transactions_for_user(&self, user_id: i64) -> Result<Vec<Transaction>, LedgerError>;

    /// Run `work` inside one atomic unit. The closure's typed failures pass
    /// through unchanged; any `Err` aborts the transaction.
    fn with_unit_of_work(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), OrderError>,
    ) -> Result<(), OrderError>;
}
