//! CSV stock catalogue importer.
//!
//! Reads seed listings in `symbol,name,kind,price` form (header row
//! expected) and hands back [`NewStock`] records ready for insertion.

use std::path::Path;

use rust_decimal::Decimal;

use crate::domain::error::LedgerError;
use crate::domain::stock::{NewStock, StockKind};

pub fn read_stock_listings<P: AsRef<Path>>(path: P) -> Result<Vec<NewStock>, LedgerError> {
    let path = path.as_ref();
    let mut rdr = csv::Reader::from_path(path).map_err(|e| LedgerError::Import {
        reason: format!("failed to open {}: {}", path.display(), e),
    })?;

    let mut listings = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| LedgerError::Import {
            reason: format!("CSV parse error: {}", e),
        })?;

        let symbol = field(&record, 0, line, "symbol")?;
        let name = field(&record, 1, line, "name")?;
        let kind_raw = field(&record, 2, line, "kind")?;
        let price_raw = field(&record, 3, line, "price")?;

        let kind = StockKind::parse(kind_raw).ok_or_else(|| LedgerError::Import {
            reason: format!("record {line}: unknown stock kind '{kind_raw}'"),
        })?;

        let price: Decimal = price_raw.trim().parse().map_err(|e| LedgerError::Import {
            reason: format!("record {line}: invalid price '{price_raw}': {e}"),
        })?;
        if price <= Decimal::ZERO {
            return Err(LedgerError::Import {
                reason: format!("record {line}: price must be positive, got {price}"),
            });
        }

        listings.push(NewStock::new(kind, symbol, name, price));
    }

    Ok(listings)
}

fn field<'r>(
    record: &'r csv::StringRecord,
    index: usize,
    line: usize,
    column: &str,
) -> Result<&'r str, LedgerError> {
    record.get(index).ok_or_else(|| LedgerError::Import {
        reason: format!("record {line}: missing {column} column"),
    })
}
