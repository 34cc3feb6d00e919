use std::collections::HashSet;

use super::{field, read_table, TabularInput};
use crate::pipeline::BatchError;

pub const ID_COLUMN: &str = "System ID";

/// Reads the set of allowed system numbers. Every value in the `System ID`
/// column must be an integer; blank cells are skipped.
pub fn read_allow_list(input: &TabularInput) -> Result<HashSet<i64>, BatchError> {
    let malformed = |reason: String| BatchError::MalformedAllowList {
        file: input.name.clone(),
        reason,
    };

    let (columns, records) = read_table(input).map_err(|e| malformed(e.to_string()))?;
    let idx = columns
        .position(ID_COLUMN)
        .ok_or_else(|| malformed(format!("missing required column '{ID_COLUMN}'")))?;

    let mut allowed = HashSet::with_capacity(records.len());
    for record in &records {
        let raw = field(record, idx);
        if raw.is_empty() {
            continue;
        }
        let id = raw
            .parse::<i64>()
            .map_err(|_| malformed(format!("'{raw}' is not an integer system id")))?;
        allowed.insert(id);
    }

    tracing::debug!(file = %input.name, ids = allowed.len(), "loaded allow-list");
    Ok(allowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_integer_ids() {
        let ids = read_allow_list(&TabularInput::new("ids.csv", "System ID,Note\n5,a\n9,\n\n5,dup\n")).unwrap();
        assert_eq!(ids, HashSet::from([5, 9]));
    }

    #[test]
    fn missing_id_column_is_malformed() {
        let err = read_allow_list(&TabularInput::new("ids.csv", "Id\n5\n")).unwrap_err();
        assert!(matches!(err, BatchError::MalformedAllowList { .. }));
    }

    #[test]
    fn non_integer_id_is_malformed() {
        let err = read_allow_list(&TabularInput::new("ids.csv", "System ID\nSYS-00-5\n")).unwrap_err();
        assert!(err.to_string().contains("SYS-00-5"));
    }
}
