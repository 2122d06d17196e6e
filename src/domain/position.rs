//! Portfolio positions: a user's held quantity of one stock.

use rust_decimal::Decimal;

/// One portfolio row, keyed by `(user_id, stock_id)`.
///
/// Quantity is always positive in a stored row; a position that would reach
/// zero is deleted instead, so row absence means quantity zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub user_id: i64,
    pub stock_id: i64,
    pub quantity: i64,
}

impl Position {
    pub fn market_value(&self, price: Decimal) -> Decimal {
        Decimal::from(self.quantity) * price
    }
}
