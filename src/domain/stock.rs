//! Stock records and catalogue helpers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Instrument class of a listed stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockKind {
    Equity,
    Bond,
    Etf,
}

impl StockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockKind::Equity => "equity",
            StockKind::Bond => "bond",
            StockKind::Etf => "etf",
        }
    }

    pub fn parse(value: &str) -> Option<StockKind> {
        match value.to_lowercase().as_str() {
            "equity" => Some(StockKind::Equity),
            "bond" => Some(StockKind::Bond),
            "etf" => Some(StockKind::Etf),
            _ => None,
        }
    }
}

/// A listed stock. `current_price` and `updated_at` change only through the
/// price board after an order executes.
#[derive(Debug, Clone, PartialEq)]
pub struct Stock {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub kind: StockKind,
    pub current_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// A stock about to be listed; the store assigns the id on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStock {
    pub symbol: String,
    pub name: String,
    pub kind: StockKind,
    pub price: Decimal,
}

impl NewStock {
    /// Bonds and ETFs carry their class in the display name.
    pub fn new(kind: StockKind, symbol: &str, name: &str, price: Decimal) -> Self {
        let name = match kind {
            StockKind::Equity => name.to_string(),
            StockKind::Bond => format!("{name} Bond"),
            StockKind::Etf => format!("{name} ETF"),
        };
        NewStock {
            symbol: symbol.to_string(),
            name,
            kind,
            price,
        }
    }
}

/// Catalogue orderings offered to listing callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockSort {
    PriceAscending,
    PriceDescending,
    SymbolAscending,
}

/// Sort a stock listing in place. Ties keep their relative order.
pub fn sort_stocks(stocks: &mut [Stock], sort: StockSort) {
    match sort {
        StockSort::PriceAscending => stocks.sort_by(|a, b| a.current_price.cmp(&b.current_price)),
        StockSort::PriceDescending => stocks.sort_by(|a, b| b.current_price.cmp(&a.current_price)),
        StockSort::SymbolAscending => stocks.sort_by(|a, b| a.symbol.cmp(&b.symbol)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn listed(symbol: &str, price: Decimal) -> Stock {
        Stock {
            id: 1,
            symbol: symbol.into(),
            name: symbol.into(),
            kind: StockKind::Equity,
            current_price: price,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [StockKind::Equity, StockKind::Bond, StockKind::Etf] {
            assert_eq!(StockKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(StockKind::parse("ETF"), Some(StockKind::Etf));
        assert_eq!(StockKind::parse("warrant"), None);
    }

    #[test]
    fn new_stock_keeps_equity_name() {
        let stock = NewStock::new(StockKind::Equity, "BHP", "BHP Group", dec!(44.10));
        assert_eq!(stock.name, "BHP Group");
        assert_eq!(stock.symbol, "BHP");
    }

    #[test]
    fn new_stock_suffixes_bond_and_etf_names() {
        let bond = NewStock::new(StockKind::Bond, "AGB", "Treasury", dec!(99.50));
        assert_eq!(bond.name, "Treasury Bond");

        let etf = NewStock::new(StockKind::Etf, "VAS", "Vanguard Australian Shares", dec!(95.20));
        assert_eq!(etf.name, "Vanguard Australian Shares ETF");
    }

    #[test]
    fn sort_by_price_ascending() {
        let mut stocks = vec![
            listed("CBA", dec!(110.00)),
            listed("BHP", dec!(44.10)),
            listed("WES", dec!(65.35)),
        ];
        sort_stocks(&mut stocks, StockSort::PriceAscending);
        let symbols: Vec<&str> = stocks.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, ["BHP", "WES", "CBA"]);
    }

    #[test]
    fn sort_by_price_descending() {
        let mut stocks = vec![
            listed("BHP", dec!(44.10)),
            listed("CBA", dec!(110.00)),
            listed("WES", dec!(65.35)),
        ];
        sort_stocks(&mut stocks, StockSort::PriceDescending);
        let symbols: Vec<&str> = stocks.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, ["CBA", "WES", "BHP"]);
    }

    #[test]
    fn sort_by_symbol() {
        let mut stocks = vec![
            listed("WES", dec!(65.35)),
            listed("BHP", dec!(44.10)),
            listed("CBA", dec!(110.00)),
        ];
        sort_stocks(&mut stocks, StockSort::SymbolAscending);
        let symbols: Vec<&str> = stocks.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, ["BHP", "CBA", "WES"]);
    }
}
