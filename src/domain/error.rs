//! Error types for the trading ledger.

use rust_decimal::Decimal;

/// Infrastructure failures: storage, configuration, imports.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("import error: {reason}")]
    Import { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Business-level order failures. Expected conditions, returned to the
/// caller as values and never panicked across the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("invalid order: {reason}")]
    InvalidArgument { reason: String },

    #[error("stock {stock_id} not found")]
    StockNotFound { stock_id: i64 },

    #[error("user {user_id} not found")]
    UserNotFound { user_id: i64 },

    #[error("insufficient funds: order costs {required}, balance is {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("insufficient holdings: tried to sell {requested}, holding {held}")]
    InsufficientHoldings { requested: i64, held: i64 },

    #[error(transparent)]
    Persistence(#[from] LedgerError),
}

impl From<&LedgerError> for std::process::ExitCode {
    fn from(err: &LedgerError) -> Self {
        let code: u8 = match err {
            LedgerError::Io(_) => 1,
            LedgerError::ConfigParse { .. }
            | LedgerError::ConfigMissing { .. }
            | LedgerError::ConfigInvalid { .. } => 2,
            LedgerError::Database { .. } | LedgerError::DatabaseQuery { .. } => 3,
            LedgerError::Import { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

impl From<&OrderError> for std::process::ExitCode {
    fn from(err: &OrderError) -> Self {
        let code: u8 = match err {
            OrderError::Persistence(inner) => return inner.into(),
            OrderError::InvalidArgument { .. } => 5,
            OrderError::StockNotFound { .. } | OrderError::UserNotFound { .. } => 6,
            OrderError::InsufficientFunds { .. } | OrderError::InsufficientHoldings { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_error_messages() {
        let err = OrderError::InsufficientFunds {
            required: dec!(500.00),
            available: dec!(120.50),
        };
        assert_eq!(
            err.to_string(),
            "insufficient funds: order costs 500.00, balance is 120.50"
        );

        let err = OrderError::InsufficientHoldings {
            requested: 10,
            held: 3,
        };
        assert_eq!(
            err.to_string(),
            "insufficient holdings: tried to sell 10, holding 3"
        );
    }

    #[test]
    fn persistence_errors_are_transparent() {
        let err = OrderError::from(LedgerError::Database {
            reason: "locked".into(),
        });
        assert_eq!(err.to_string(), "database error: locked");
    }
}
