//! The price board: in-memory stock prices plus observer fan-out.
//!
//! Observers are registered as capability handles and notified synchronously,
//! in registration order, on the caller's thread. A slow observer therefore
//! stalls the order path; v1 has no timeout around notification.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::error::LedgerError;
use super::stock::Stock;

/// Handle returned by [`PriceBoard::attach`], used to detach exactly that
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// A registered listener on stock price changes.
pub trait PriceObserver {
    fn on_price_update(&self, stock: &Stock) -> Result<(), LedgerError>;
}

/// Observer subject holding the current in-memory price per tracked stock.
///
/// Duplicates are allowed: attaching the same observer twice yields two
/// registrations and two notifications per update.
pub struct PriceBoard {
    stocks: HashMap<i64, Stock>,
    observers: Vec<(ObserverId, Rc<dyn PriceObserver>)>,
    next_observer: u64,
}

impl PriceBoard {
    pub fn new() -> Self {
        PriceBoard {
            stocks: HashMap::new(),
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// Load or refresh a stock record on the board.
    pub fn track(&mut self, stock: Stock) {
        self.stocks.insert(stock.id, stock);
    }

    pub fn stock(&self, stock_id: i64) -> Option<&Stock> {
        self.stocks.get(&stock_id)
    }

    pub fn attach(&mut self, observer: Rc<dyn PriceObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, observer));
        id
    }

    /// Remove one registration. Returns false if the id is not attached.
    pub fn detach(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(attached, _)| *attached != id);
        self.observers.len() < before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Set a tracked stock's price and notify every observer in registration
    /// order. An unknown stock id is a silent no-op returning `None`; callers
    /// that need validation look the stock up through the order engine first.
    ///
    /// Observer failures are logged and do not stop the remaining observers.
    /// Returns the refreshed record so the caller can persist it.
    pub fn update_price(
        &mut self,
        stock_id: i64,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Option<Stock> {
        let stock = match self.stocks.get_mut(&stock_id) {
            Some(stock) => stock,
            None => {
                log::debug!("price update for untracked stock {stock_id} ignored");
                return None;
            }
        };
        stock.current_price = price;
        stock.updated_at = at;
        let snapshot = stock.clone();

        for (id, observer) in &self.observers {
            if let Err(err) = observer.on_price_update(&snapshot) {
                log::warn!(
                    "observer {id:?} failed on {} price update: {err}",
                    snapshot.symbol
                );
            }
        }
        Some(snapshot)
    }
}

impl Default for PriceBoard {
    fn default() -> Self {
        PriceBoard::new()
    }
}

/// Rolling in-memory feed of price-change headlines, oldest first.
pub struct MarketNewsFeed {
    capacity: usize,
    headlines: RefCell<VecDeque<String>>,
}

impl MarketNewsFeed {
    pub fn new(capacity: usize) -> Self {
        MarketNewsFeed {
            capacity,
            headlines: RefCell::new(VecDeque::new()),
        }
    }

    pub fn headlines(&self) -> Vec<String> {
        self.headlines.borrow().iter().cloned().collect()
    }
}

impl PriceObserver for MarketNewsFeed {
    fn on_price_update(&self, stock: &Stock) -> Result<(), LedgerError> {
        let mut headlines = self.headlines.borrow_mut();
        headlines.push_back(format!(
            "{} ({}) is now trading at {}",
            stock.name, stock.symbol, stock.current_price
        ));
        while headlines.len() > self.capacity {
            headlines.pop_front();
        }
        Ok(())
    }
}
