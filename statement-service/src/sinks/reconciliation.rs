use std::path::Path;

use crate::pipeline::BatchError;

pub const RECONCILIATION_FILE: &str = "reconciliation.csv";

/// One line of the reconciliation ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationRow {
    pub date: String,
    pub name: String,
    pub net_payment: f64,
}

fn encode(rows: &[ReconciliationRow]) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["Date", "Name", "Amount"])?;
    for row in rows {
        let amount = format!("{:.2}", row.net_payment);
        // Avoid "-0.00" for payments that round to zero.
        let amount = if amount == "-0.00" { "0.00".to_string() } else { amount };
        wtr.write_record([row.date.as_str(), row.name.as_str(), amount.as_str()])?;
    }
    wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

/// Writes the ledger as `Date,Name,Amount` in the given row order and returns
/// the blake3 digest (hex) of the written bytes.
pub fn write_reconciliation(path: &Path, rows: &[ReconciliationRow]) -> Result<String, BatchError> {
    let bytes = encode(rows).map_err(|e| BatchError::Output {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    })?;
    let digest = blake3::hash(&bytes).to_hex().to_string();

    std::fs::write(path, &bytes).map_err(|source| BatchError::Output {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(digest)
}
