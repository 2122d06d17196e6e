//! SQLite ledger store adapter.
//!
//! Money travels as TEXT columns holding decimal strings; SQLite has no
//! native decimal type and REAL would lose exactness. Unit-of-work
//! transactions open `IMMEDIATE` so concurrent orders against the same rows
//! serialize at the database instead of racing read-modify-write.

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;

use crate::domain::error::{LedgerError, OrderError};
use crate::domain::position::Position;
use crate::domain::stock::{NewStock, Stock, StockKind};
use crate::domain::transaction::{NewTransaction, TradeDirection, Transaction};
use crate::domain::user::User;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerStore, LedgerTx};

pub struct SqliteLedgerStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteLedgerStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, LedgerError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| LedgerError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| LedgerError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| LedgerError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, LedgerError> {
        self.pool.get().map_err(|e: r2d2::Error| LedgerError::Database {
            reason: e.to_string(),
        })
    }
}

fn query_err(e: rusqlite::Error) -> LedgerError {
    LedgerError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_decimal(value: &str) -> Result<Decimal, LedgerError> {
    value.parse().map_err(|e| LedgerError::DatabaseQuery {
        reason: format!("bad decimal '{value}': {e}"),
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::DatabaseQuery {
            reason: format!("bad timestamp '{value}': {e}"),
        })
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

/// Raw row shape shared by the pooled-connection and transaction paths;
/// decimal/timestamp parsing happens after rusqlite hands the row over.
type StockRow = (i64, String, String, String, String, String);

fn stock_from_row(row: StockRow) -> Result<Stock, LedgerError> {
    let (id, symbol, name, kind, price, updated_at) = row;
    Ok(Stock {
        id,
        symbol,
        name,
        kind: parse_kind(&kind)?,
        current_price: parse_decimal(&price)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn fetch_stock(conn: &Connection, stock_id: i64) -> Result<Option<Stock>, LedgerError> {
    conn.query_row(
        "SELECT id, symbol, name, kind, current_price, updated_at FROM stocks WHERE id = ?1",
        params![stock_id],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        },
    )
    .optional()
    .map_err(query_err)?
    .map(stock_from_row)
    .transpose()
}

fn fetch_user(conn: &Connection, user_id: i64) -> Result<Option<User>, LedgerError> {
    conn.query_row(
        "SELECT id, name, balance FROM users WHERE id = ?1",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, String>(2)?)),
    )
    .optional()
    .map_err(query_err)?
    .map(|(id, name, balance): (i64, String, String)| {
        Ok(User {
            id,
            name,
            balance: parse_decimal(&balance)?,
        })
    })
    .transpose()
}

fn fetch_position(
    conn: &Connection,
    user_id: i64,
    stock_id: i64,
) -> Result<Option<Position>, LedgerError> {
    conn.query_row(
        "SELECT quantity FROM positions WHERE user_id = ?1 AND stock_id = ?2",
        params![user_id, stock_id],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map_err(query_err)
    .map(|quantity| {
        quantity.map(|quantity| Position {
            user_id,
            stock_id,
            quantity,
        })
    })
}

fn set_balance(conn: &Connection, user_id: i64, balance: Decimal) -> Result<(), LedgerError> {
    let changed = conn
        .execute(
            "UPDATE users SET balance = ?1 WHERE id = ?2",
            params![balance.to_string(), user_id],
        )
        .map_err(query_err)?;
    if changed == 0 {
        return Err(LedgerError::DatabaseQuery {
            reason: format!("no user row {user_id}"),
        });
    }
    Ok(())
}

fn upsert_position(
    conn: &Connection,
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
        conn.execute(
            "DELETE FROM positions WHERE user_id = ?1 AND stock_id = ?2",
            params![user_id, stock_id],
        )
        .map_err(query_err)?;
    } else {
        conn.execute(
            "INSERT INTO positions (user_id, stock_id, quantity) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, stock_id) DO UPDATE SET quantity = excluded.quantity",
            params![user_id, stock_id, quantity],
        )
        .map_err(query_err)?;
    }
    Ok(())
}

fn insert_transaction_row(conn: &Connection, entry: &NewTransaction) -> Result<i64, LedgerError> {
    conn.execute(
        "INSERT INTO transactions (user_id, stock_id, quantity, price, direction, executed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.user_id,
            entry.stock_id,
            entry.quantity,
            entry.price.to_string(),
            entry.direction.as_str(),
            entry.executed_at.to_rfc3339(),
        ],
    )
    .map_err(query_err)?;
    Ok(conn.last_insert_rowid())
}

fn set_stock_price(
    conn: &Connection,
    stock_id: i64,
    price: Decimal,
    at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    let changed = conn
        .execute(
            "UPDATE stocks SET current_price = ?1, updated_at = ?2 WHERE id = ?3",
            params![price.to_string(), at.to_rfc3339(), stock_id],
        )
        .map_err(query_err)?;
    if changed == 0 {
        return Err(LedgerError::DatabaseQuery {
            reason: format!("no stock row {stock_id}"),
        });
    }
    Ok(())
}

struct SqliteTx<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

impl LedgerTx for SqliteTx<'_> {
    fn stock(&mut self, stock_id: i64) -> Result<Option<Stock>, LedgerError> {
        fetch_stock(self.tx, stock_id)
    }

    fn user(&mut self, user_id: i64) -> Result<Option<User>, LedgerError> {
        fetch_user(self.tx, user_id)
    }

    fn position(&mut self, user_id: i64, stock_id: i64) -> Result<Option<Position>, LedgerError> {
        fetch_position(self.tx, user_id, stock_id)
    }

    fn update_balance(&mut self, user_id: i64, balance: Decimal) -> Result<(), LedgerError> {
        set_balance(self.tx, user_id, balance)
    }

    fn set_position(
        &mut self,
        user_id: i64,
        stock_id: i64,
        quantity: i64,
    ) -> Result<(), LedgerError> {
        upsert_position(self.tx, user_id, stock_id, quantity)
    }

    fn append_transaction(&mut self, entry: &NewTransaction) -> Result<i64, LedgerError> {
        insert_transaction_row(self.tx, entry)
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn initialize(&self) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                current_price TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                balance TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS positions (
                user_id INTEGER NOT NULL,
                stock_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                PRIMARY KEY (user_id, stock_id)
            );
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                stock_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                price TEXT NOT NULL,
                direction TEXT NOT NULL,
                executed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);",
        )
        .map_err(query_err)
    }

    fn get_stock(&self, stock_id: i64) -> Result<Option<Stock>, LedgerError> {
        fetch_stock(&*self.conn()?, stock_id)
    }

    fn list_stocks(&self) -> Result<Vec<Stock>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, symbol, name, kind, current_price, updated_at
                 FROM stocks ORDER BY id",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(query_err)?;

        let mut stocks = Vec::new();
        for row in rows {
            stocks.push(stock_from_row(row.map_err(query_err)?)?);
        }
        Ok(stocks)
    }

    fn insert_stock(&self, stock: &NewStock) -> Result<i64, LedgerError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO stocks (symbol, name, kind, current_price, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                stock.symbol,
                stock.name,
                stock.kind.as_str(),
                stock.price.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(query_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_stock_price(
        &self,
        stock_id: i64,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        set_stock_price(&*self.conn()?, stock_id, price, at)
    }

    fn get_user(&self, user_id: i64) -> Result<Option<User>, LedgerError> {
        fetch_user(&*self.conn()?, user_id)
    }

    fn insert_user(&self, name: &str, balance: Decimal) -> Result<i64, LedgerError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (name, balance) VALUES (?1, ?2)",
            params![name, balance.to_string()],
        )
        .map_err(query_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn get_position(&self, user_id: i64, stock_id: i64) -> Result<Option<Position>, LedgerError> {
        fetch_position(&*self.conn()?, user_id, stock_id)
    }

    fn positions_for_user(&self, user_id: i64) -> Result<Vec<Position>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT stock_id, quantity FROM positions
                 WHERE user_id = ?1 ORDER BY stock_id",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(query_err)?;

        let mut positions = Vec::new();
        for row in rows {
            let (stock_id, quantity) = row.map_err(query_err)?;
            positions.push(Position {
                user_id,
                stock_id,
                quantity,
            });
        }
        Ok(positions)
    }

    fn transactions_for_user(&self, user_id: i64) -> Result<Vec<Transaction>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, stock_id, quantity, price, direction, executed_at
                 FROM transactions WHERE user_id = ?1 ORDER BY id",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(query_err)?;

        let mut transactions = Vec::new();
        for row in rows {
            let (id, stock_id, quantity, price, direction, executed_at) =
                row.map_err(query_err)?;
            transactions.push(Transaction {
                id,
                user_id,
                stock_id,
                quantity,
                price: parse_decimal(&price)?,
                direction: parse_direction(&direction)?,
                executed_at: parse_timestamp(&executed_at)?,
            });
        }
        Ok(transactions)
    }

    fn with_unit_of_work(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), OrderError>,
    ) -> Result<(), OrderError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| OrderError::Persistence(query_err(e)))?;

        work(&mut SqliteTx { tx: &tx })?;

        tx.commit()
            .map_err(|e| OrderError::Persistence(query_err(e)))?;
        Ok(())
    }
}
