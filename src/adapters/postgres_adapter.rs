//! PostgreSQL ledger store adapter.
//!
//! Money maps to NUMERIC columns (via `rust_decimal`'s postgres support)
//! and timestamps to TIMESTAMPTZ. The client lives in a `RefCell` because
//! `postgres::Client` takes `&mut self` for queries while the port trait
//! reads through `&self`.

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use postgres::{Client, NoTls};
use rust_decimal::Decimal;

use crate::domain::error::{LedgerError, OrderError};
use crate::domain::position::Position;
use crate::domain::stock::{NewStock, Stock, StockKind};
use crate::domain::transaction::{NewTransaction, TradeDirection, Transaction};
use crate::domain::user::User;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerStore, LedgerTx};

pub struct PostgresLedgerStore {
    client: RefCell<Client>,
}

impl PostgresLedgerStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, LedgerError> {
        // Try [postgres] connection_string first, fall back to [database] conninfo
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| LedgerError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let client =
            Client::connect(&connection_string, NoTls).map_err(|e| LedgerError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client: RefCell::new(client),
        })
    }
}

fn query_err(e: postgres::Error) -> LedgerError {
    LedgerError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_kind(value: &str) -> Result<StockKind, LedgerError> {
    StockKind::parse(value).ok_or_else(|| LedgerError::DatabaseQuery {
        reason: format!("bad stock kind '{value}'"),
    })
}

fn parse_direction(value: &str) -> Result<TradeDirection, LedgerError> {
    TradeDirection::parse(value).ok_or_else(|| LedgerError::DatabaseQuery {
        reason: format!("bad trade direction '{value}'"),
    })
}

fn stock_from_row(row: &postgres::Row) -> Result<Stock, LedgerError> {
    Ok(Stock {
        id: row.get(0),
        symbol: row.get(1),
        name: row.get(2),
        kind: parse_kind(row.get(3))?,
        current_price: row.get(4),
        updated_at: row.get(5),
    })
}

struct PgTx<'a, 'b> {
    tx: &'a mut postgres::Transaction<'b>,
}

impl LedgerTx for PgTx<'_, '_> {
    fn stock(&mut self, stock_id: i64) -> Result<Option<Stock>, LedgerError> {
        self.tx
            .query_opt(
                "SELECT id, symbol, name, kind, current_price, updated_at
                 FROM stocks WHERE id = $1",
                &[&stock_id],
            )
            .map_err(query_err)?
            .map(|row| stock_from_row(&row))
            .transpose()
    }

    fn user(&mut self, user_id: i64) -> Result<Option<User>, LedgerError> {
        Ok(self
            .tx
            .query_opt("SELECT id, name, balance FROM users WHERE id = $1", &[&user_id])
            .map_err(query_err)?
            .map(|row| User {
                id: row.get(0),
                name: row.get(1),
                balance: row.get(2),
            }))
    }

    fn position(&mut self, user_id: i64, stock_id: i64) -> Result<Option<Position>, LedgerError> {
        Ok(self
            .tx
            .query_opt(
                "SELECT quantity FROM positions WHERE user_id = $1 AND stock_id = $2",
                &[&user_id, &stock_id],
            )
            .map_err(query_err)?
            .map(|row| Position {
                user_id,
                stock_id,
                quantity: row.get(0),
            }))
    }

    fn update_balance(&mut self, user_id: i64, balance: Decimal) -> Result<(), LedgerError> {
        let changed = self
            .tx
            .execute(
                "UPDATE users SET balance = $1 WHERE id = $2",
                &[&balance, &user_id],
            )
            .map_err(query_err)?;
        if changed == 0 {
            return Err(LedgerError::DatabaseQuery {
                reason: format!("no user row {user_id}"),
            });
        }
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
            self.tx
                .execute(
                    "DELETE FROM positions WHERE user_id = $1 AND stock_id = $2",
                    &[&user_id, &stock_id],
                )
                .map_err(query_err)?;
        } else {
            self.tx
                .execute(
                    "INSERT INTO positions (user_id, stock_id, quantity) VALUES ($1, $2, $3)
                     ON CONFLICT (user_id, stock_id) DO UPDATE SET quantity = excluded.quantity",
                    &[&user_id, &stock_id, &quantity],
                )
                .map_err(query_err)?;
        }
        Ok(())
    }

    fn append_transaction(&mut self, entry: &NewTransaction) -> Result<i64, LedgerError> {
        let row = self
            .tx
            .query_one(
                "INSERT INTO transactions
                     (user_id, stock_id, quantity, price, direction, executed_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id",
                &[
                    &entry.user_id,
                    &entry.stock_id,
                    &entry.quantity,
                    &entry.price,
                    &entry.direction.as_str(),
                    &entry.executed_at,
                ],
            )
            .map_err(query_err)?;
        Ok(row.get(0))
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn initialize(&self) -> Result<(), LedgerError> {
        self.client
            .borrow_mut()
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS stocks (
                    id BIGSERIAL PRIMARY KEY,
                    symbol TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    current_price NUMERIC NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                );
                CREATE TABLE IF NOT EXISTS users (
                    id BIGSERIAL PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    balance NUMERIC NOT NULL
                );
                CREATE TABLE IF NOT EXISTS positions (
                    user_id BIGINT NOT NULL,
                    stock_id BIGINT NOT NULL,
                    quantity BIGINT NOT NULL CHECK (quantity > 0),
                    PRIMARY KEY (user_id, stock_id)
                );
                CREATE TABLE IF NOT EXISTS transactions (
                    id BIGSERIAL PRIMARY KEY,
                    user_id BIGINT NOT NULL,
                    stock_id BIGINT NOT NULL,
                    quantity BIGINT NOT NULL,
                    price NUMERIC NOT NULL,
                    direction TEXT NOT NULL,
                    executed_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);",
            )
            .map_err(query_err)
    }

    fn get_stock(&self, stock_id: i64) -> Result<Option<Stock>, LedgerError> {
        self.client
            .borrow_mut()
            .query_opt(
                "SELECT id, symbol, name, kind, current_price, updated_at
                 FROM stocks WHERE id = $1",
                &[&stock_id],
            )
            .map_err(query_err)?
            .map(|row| stock_from_row(&row))
            .transpose()
    }

    fn list_stocks(&self) -> Result<Vec<Stock>, LedgerError> {
        self.client
            .borrow_mut()
            .query(
                "SELECT id, symbol, name, kind, current_price, updated_at
                 FROM stocks ORDER BY id",
                &[],
            )
            .map_err(query_err)?
            .iter()
            .map(stock_from_row)
            .collect()
    }

    fn insert_stock(&self, stock: &NewStock) -> Result<i64, LedgerError> {
        let row = self
            .client
            .borrow_mut()
            .query_one(
                "INSERT INTO stocks (symbol, name, kind, current_price, updated_at)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id",
                &[
                    &stock.symbol,
                    &stock.name,
                    &stock.kind.as_str(),
                    &stock.price,
                    &Utc::now(),
                ],
            )
            .map_err(query_err)?;
        Ok(row.get(0))
    }

    fn update_stock_price(
        &self,
        stock_id: i64,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let changed = self
            .client
            .borrow_mut()
            .execute(
                "UPDATE stocks SET current_price = $1, updated_at = $2 WHERE id = $3",
                &[&price, &at, &stock_id],
            )
            .map_err(query_err)?;
        if changed == 0 {
            return Err(LedgerError::DatabaseQuery {
                reason: format!("no stock row {stock_id}"),
            });
        }
        Ok(())
    }

    fn get_user(&self, user_id: i64) -> Result<Option<User>, LedgerError> {
        Ok(self
            .client
            .borrow_mut()
            .query_opt("SELECT id, name, balance FROM users WHERE id = $1", &[&user_id])
            .map_err(query_err)?
            .map(|row| User {
                id: row.get(0),
                name: row.get(1),
                balance: row.get(2),
            }))
    }

    fn insert_user(&self, name: &str, balance: Decimal) -> Result<i64, LedgerError> {
        let row = self
            .client
            .borrow_mut()
            .query_one(
                "INSERT INTO users (name, balance) VALUES ($1, $2) RETURNING id",
                &[&name, &balance],
            )
            .map_err(query_err)?;
        Ok(row.get(0))
    }

    fn get_position(&self, user_id: i64, stock_id: i64) -> Result<Option<Position>, LedgerError> {
        Ok(self
            .client
            .borrow_mut()
            .query_opt(
                "SELECT quantity FROM positions WHERE user_id = $1 AND stock_id = $2",
                &[&user_id, &stock_id],
            )
            .map_err(query_err)?
            .map(|row| Position {
                user_id,
                stock_id,
                quantity: row.get(0),
            }))
    }

    fn positions_for_user(&self, user_id: i64) -> Result<Vec<Position>, LedgerError> {
        Ok(self
            .client
            .borrow_mut()
            .query(
                "SELECT stock_id, quantity FROM positions
                 WHERE user_id = $1 ORDER BY stock_id",
                &[&user_id],
            )
            .map_err(query_err)?
            .iter()
            .map(|row| Position {
                user_id,
                stock_id: row.get(0),
                quantity: row.get(1),
            })
            .collect())
    }

    fn transactions_for_user(&self, user_id: i64) -> Result<Vec<Transaction>, LedgerError> {
        self.client
            .borrow_mut()
            .query(
                "SELECT id, stock_id, quantity, price, direction, executed_at
                 FROM transactions WHERE user_id = $1 ORDER BY id",
                &[&user_id],
            )
            .map_err(query_err)?
            .iter()
            .map(|row| {
                Ok(Transaction {
                    id: row.get(0),
                    user_id,
                    stock_id: row.get(1),
                    quantity: row.get(2),
                    price: row.get(3),
                    direction: parse_direction(row.get(4))?,
                    executed_at: row.get(5),
                })
            })
            .collect()
    }

    fn with_unit_of_work(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), OrderError>,
    ) -> Result<(), OrderError> {
        let mut client = self.client.borrow_mut();
        let mut tx = client
            .transaction()
            .map_err(|e| OrderError::Persistence(query_err(e)))?;

        work(&mut PgTx { tx: &mut tx })?;

        tx.commit()
            .map_err(|e| OrderError::Persistence(query_err(e)))?;
        Ok(())
    }
}
