//! The append-only transaction ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Direction of an executed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    /// The direction that exactly reverses this one at the same
    /// quantity and price.
    pub fn inverse(&self) -> TradeDirection {
        match self {
            TradeDirection::Buy => TradeDirection::Sell,
            TradeDirection::Sell => TradeDirection::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "Buy",
            TradeDirection::Sell => "Sell",
        }
    }

    pub fn parse(value: &str) -> Option<TradeDirection> {
        match value {
            "Buy" => Some(TradeDirection::Buy),
            "Sell" => Some(TradeDirection::Sell),
            _ => None,
        }
    }
}

/// One executed trade. Rows are only ever appended: undoing an order writes
/// a new inverse transaction rather than erasing history.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub stock_id: i64,
    pub quantity: i64,
    pub price: Decimal,
    pub direction: TradeDirection,
    pub executed_at: DateTime<Utc>,
}

impl Transaction {
    pub fn gross_amount(&self) -> Decimal {
        Decimal::from(self.quantity) * self.price
    }
}

/// A trade about to be appended; the store assigns the id on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: i64,
    pub stock_id: i64,
    pub quantity: i64,
    pub price: Decimal,
    pub direction: TradeDirection,
    pub executed_at: DateTime<Utc>,
}
