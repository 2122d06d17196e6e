//! User account records.
//!
//! Credentials and authentication live with the excluded auth layer; the
//! ledger only needs the identity and the cash balance it debits and credits.

use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub balance: Decimal,
}

impl User {
    /// Whether the account can cover a debit of `amount`.
    pub fn can_afford(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}
