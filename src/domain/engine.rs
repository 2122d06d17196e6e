//! Order execution against the ledger store.
//!
//! Every order runs as one unit of work: load stock, load user, validate,
//! debit or credit the balance, append the ledger transaction, adjust the
//! position. Either the whole sequence commits or none of it does. Price
//! notification happens strictly after commit and is best-effort; a failure
//! there is logged and never turns a committed trade into an error.

use chrono::Utc;
use rust_decimal::Decimal;

use super::command::OrderCommand;
use super::error::OrderError;
use super::market::PriceBoard;
use super::transaction::{NewTransaction, TradeDirection};
use crate::ports::ledger_port::LedgerStore;

/// Validates and executes buy/sell orders. Holds the store handle and the
/// price board as explicit dependencies; there is no process-wide state.
///
/// Methods take `&mut self` and the engine is single-threaded. Concurrent
/// orders from multiple callers serialize at the store's transaction
/// mechanism; callers wanting to share one engine wrap it in a `Mutex`.
pub struct OrderEngine<S> {
    store: S,
    board: PriceBoard,
}

impl<S: LedgerStore> OrderEngine<S> {
    /// Build an engine over `store`, loading every listed stock onto the
    /// price board.
    pub fn new(store: S) -> Result<Self, OrderError> {
        let mut board = PriceBoard::new();
        for stock in store.list_stocks().map_err(OrderError::Persistence)? {
            board.track(stock);
        }
        Ok(OrderEngine { store, board })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn board(&self) -> &PriceBoard {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut PriceBoard {
        &mut self.board
    }

    /// Execute an order command in its own direction.
    pub fn submit(&mut self, command: &OrderCommand) -> Result<(), OrderError> {
        match command.direction {
            TradeDirection::Buy => self.buy(
                command.user_id,
                command.stock_id,
                command.quantity,
                command.price,
            ),
            TradeDirection::Sell => self.sell(
                command.user_id,
                command.stock_id,
                command.quantity,
                command.price,
            ),
        }
    }

    /// Buy `quantity` shares of `stock_id` at `price` for `user_id`.
    pub fn buy(
        &mut self,
        user_id: i64,
        stock_id: i64,
        quantity: i64,
        price: Decimal,
    ) -> Result<(), OrderError> {
        validate_order(quantity, price)?;
        let total = Decimal::from(quantity) * price;

        self.store.with_unit_of_work(&mut |tx| {
            tx.stock(stock_id)?
                .ok_or(OrderError::StockNotFound { stock_id })?;
            let user = tx.user(user_id)?.ok_or(OrderError::UserNotFound { user_id })?;
            if !user.can_afford(total) {
                return Err(OrderError::InsufficientFunds {
                    required: total,
                    available: user.balance,
                });
            }

            tx.update_balance(user_id, user.balance - total)?;
            tx.append_transaction(&NewTransaction {
                user_id,
                stock_id,
                quantity,
                price,
                direction: TradeDirection::Buy,
                executed_at: Utc::now(),
            })?;
            let held = tx.position(user_id, stock_id)?.map_or(0, |p| p.quantity);
            tx.set_position(user_id, stock_id, held + quantity)?;
            Ok(())
        })?;

        self.publish_price(stock_id, price);
        Ok(())
    }

    /// Sell `quantity` shares of `stock_id` at `price` for `user_id`.
    ///
    /// The exact mirror of [`buy`](Self::buy) at fixed arguments, which is
    /// what lets command undo run the opposite operation and land back on
    /// the starting balance and position.
    pub fn sell(
        &mut self,
        user_id: i64,
        stock_id: i64,
        quantity: i64,
        price: Decimal,
    ) -> Result<(), OrderError> {
        validate_order(quantity, price)?;
        let total = Decimal::from(quantity) * price;

        self.store.with_unit_of_work(&mut |tx| {
            tx.stock(stock_id)?
                .ok_or(OrderError::StockNotFound { stock_id })?;
            let user = tx.user(user_id)?.ok_or(OrderError::UserNotFound { user_id })?;
            let held = tx.position(user_id, stock_id)?.map_or(0, |p| p.quantity);
            if held < quantity {
                return Err(OrderError::InsufficientHoldings {
                    requested: quantity,
                    held,
                });
            }

            tx.update_balance(user_id, user.balance + total)?;
            tx.append_transaction(&NewTransaction {
                user_id,
                stock_id,
                quantity,
                price,
                direction: TradeDirection::Sell,
                executed_at: Utc::now(),
            })?;
            tx.set_position(user_id, stock_id, held - quantity)?;
            Ok(())
        })?;

        self.publish_price(stock_id, price);
        Ok(())
    }

    /// Post-commit side effect: push the execution price through the board
    /// and persist the refreshed record. The trade already committed, so
    /// nothing here can fail the order.
    fn publish_price(&mut self, stock_id: i64, price: Decimal) {
        if let Some(stock) = self.board.update_price(stock_id, price, Utc::now()) {
            if let Err(err) =
                self.store
                    .update_stock_price(stock.id, stock.current_price, stock.updated_at)
            {
                log::warn!("post-trade price for stock {stock_id} not persisted: {err}");
            }
        }
    }
}

fn validate_order(quantity: i64, price: Decimal) -> Result<(), OrderError> {
    if quantity <= 0 {
        return Err(OrderError::InvalidArgument {
            reason: format!("quantity must be positive, got {quantity}"),
        });
    }
    if price <= Decimal::ZERO {
        return Err(OrderError::InvalidArgument {
            reason: format!("price must be positive, got {price}"),
        });
    }
    Ok(())
}
