//! Reversible order commands and the undo/redo history.
//!
//! A command is pure data: direction plus the order's arguments. Undoing a
//! Buy submits a Sell with the same arguments and vice versa, so the engine's
//! buy/sell pair is the whole reversal mechanism and the history never needs
//! to touch stored state itself.

use rust_decimal::Decimal;

use super::engine::OrderEngine;
use super::error::OrderError;
use super::transaction::TradeDirection;
use crate::ports::ledger_port::LedgerStore;

/// A buy or sell request captured for execution and later reversal.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCommand {
    pub user_id: i64,
    pub stock_id: i64,
    pub quantity: i64,
    pub price: Decimal,
    pub direction: TradeDirection,
}

impl OrderCommand {
    pub fn buy(user_id: i64, stock_id: i64, quantity: i64, price: Decimal) -> Self {
        OrderCommand {
            user_id,
            stock_id,
            quantity,
            price,
            direction: TradeDirection::Buy,
        }
    }

    pub fn sell(user_id: i64, stock_id: i64, quantity: i64, price: Decimal) -> Self {
        OrderCommand {
            user_id,
            stock_id,
            quantity,
            price,
            direction: TradeDirection::Sell,
        }
    }

    /// The command that exactly reverses this one.
    pub fn inverse(&self) -> OrderCommand {
        OrderCommand {
            direction: self.direction.inverse(),
            ..self.clone()
        }
    }

    /// Human-readable audit line for the controller/UI layer.
    pub fn description(&self) -> String {
        format!(
            "{} {} shares of stock {} at {} for user {}",
            self.direction.as_str(),
            self.quantity,
            self.stock_id,
            self.price,
            self.user_id
        )
    }
}

/// Linear undo/redo history over executed order commands.
///
/// Not thread-safe: `&mut self` makes each pop-invoke-push sequence a single
/// compound operation for one caller. Share behind a `Mutex` if needed.
#[derive(Debug, Default)]
pub struct CommandHistory {
    undo_stack: Vec<OrderCommand>,
    redo_stack: Vec<OrderCommand>,
}

impl CommandHistory {
    pub fn new() -> Self {
        CommandHistory::default()
    }

    /// Execute a fresh command. On success it becomes the newest undoable
    /// entry and all forward history is invalidated; on failure it is
    /// discarded and the error returned.
    pub fn execute<S: LedgerStore>(
        &mut self,
        engine: &mut OrderEngine<S>,
        command: OrderCommand,
    ) -> Result<(), OrderError> {
        engine.submit(&command)?;
        self.undo_stack.push(command);
        self.redo_stack.clear();
        Ok(())
    }

    /// Reverse the newest executed command. Returns false on an empty stack
    /// or when the inverse cannot complete; a failed inverse is dropped, not
    /// retried and not restored.
    pub fn undo<S: LedgerStore>(&mut self, engine: &mut OrderEngine<S>) -> bool {
        let Some(command) = self.undo_stack.pop() else {
            return false;
        };
        match engine.submit(&command.inverse()) {
            Ok(()) => {
                self.redo_stack.push(command);
                true
            }
            Err(err) => {
                log::warn!("undo of '{}' failed, dropping it: {err}", command.description());
                false
            }
        }
    }

    /// Re-execute the newest undone command. Symmetric with [`undo`](Self::undo).
    pub fn redo<S: LedgerStore>(&mut self, engine: &mut OrderEngine<S>) -> bool {
        let Some(command) = self.redo_stack.pop() else {
            return false;
        };
        match engine.submit(&command) {
            Ok(()) => {
                self.undo_stack.push(command);
                true
            }
            Err(err) => {
                log::warn!("redo of '{}' failed, dropping it: {err}", command.description());
                false
            }
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Executed commands, oldest first.
    pub fn executed(&self) -> &[OrderCommand] {
        &self.undo_stack
    }

    /// Undone commands awaiting redo, oldest first.
    pub fn undone(&self) -> &[OrderCommand] {
        &self.redo_stack
    }
}
