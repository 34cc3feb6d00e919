use csv::StringRecord;
use statement_domain::domain::{NormalizedRow, PeriodLabel};
use time::{macros::format_description, Date};

use crate::pipeline::BatchError;

pub mod allow_list;
pub mod http_upload;
pub mod nepool_quarterly;
pub mod pjm_monthly;

/// One uploaded table, kept as raw bytes until a normalizer decodes it.
#[derive(Debug, Clone)]
pub struct TabularInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl TabularInput {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        Ok(Self {
            name: path.display().to_string(),
            bytes: std::fs::read(path)?,
        })
    }
}

/// Rows decoded from one production file.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTable {
    pub rows: Vec<NormalizedRow>,
    /// Label from the first data row; `None` for a header-only file.
    pub period: Option<PeriodLabel>,
    /// Rows skipped because they could not be matched to supporting data.
    pub dropped: usize,
}

/// Header positions of a table, resolved once before any row is decoded.
pub(crate) struct Columns {
    headers: StringRecord,
}

impl Columns {
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Names from `required` that are absent from the header row.
    pub(crate) fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Resolves every required column or fails naming all missing ones.
    pub(crate) fn require(
        &self,
        file: &str,
        schema: &'static str,
        required: &[&str],
    ) -> Result<Vec<usize>, BatchError> {
        let missing = self.missing(required);
        if !missing.is_empty() {
            return Err(BatchError::MissingColumns {
                file: file.to_string(),
                schema,
                columns: missing,
            });
        }
        Ok(required.iter().filter_map(|name| self.position(name)).collect())
    }
}

/// Parses a headered CSV table. Headers and fields are trimmed.
pub(crate) fn read_table(input: &TabularInput) -> Result<(Columns, Vec<StringRecord>), BatchError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input.bytes.as_slice());

    let headers = rdr
        .headers()
        .map_err(|e| BatchError::InputFormat {
            file: input.name.clone(),
            reason: format!("failed to read CSV headers: {e}"),
        })?
        .clone();

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| BatchError::InputFormat {
            file: input.name.clone(),
            reason: format!("failed to read CSV record: {e}"),
        })?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        records.push(record);
    }

    Ok((Columns { headers }, records))
}

pub(crate) fn field<'r>(record: &'r StringRecord, idx: usize) -> &'r str {
    record.get(idx).unwrap_or("")
}

fn strip_thousands(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != ',').collect()
}

fn check_non_negative(file: &str, raw: &str, value: f64) -> Result<f64, BatchError> {
    if value < 0.0 || !value.is_finite() {
        return Err(BatchError::InputFormat {
            file: file.to_string(),
            reason: format!("generation '{raw}' must be a non-negative number"),
        });
    }
    Ok(value)
}

/// Locale-formatted decimal kWh (`"1,234.5"`).
pub(crate) fn parse_generation_decimal(file: &str, raw: &str) -> Result<f64, BatchError> {
    let value: f64 = strip_thousands(raw).parse().map_err(|e| BatchError::InputFormat {
        file: file.to_string(),
        reason: format!("invalid generation '{raw}': {e}"),
    })?;
    check_non_negative(file, raw, value)
}

/// Locale-formatted whole kWh (`"1,234"`).
pub(crate) fn parse_generation_integer(file: &str, raw: &str) -> Result<f64, BatchError> {
    let value: i64 = strip_thousands(raw).parse().map_err(|e| BatchError::InputFormat {
        file: file.to_string(),
        reason: format!("invalid generation '{raw}': {e}"),
    })?;
    check_non_negative(file, raw, value as f64)
}

/// Parses a `M/D/YYYY` date. Anything after the first whitespace (such as a
/// time of day) is ignored.
pub(crate) fn parse_period_date(file: &str, raw: &str) -> Result<Date, BatchError> {
    let date_part = raw.split_whitespace().next().unwrap_or("");
    Date::parse(
        date_part,
        format_description!("[month padding:none]/[day padding:none]/[year]"),
    )
    .map_err(|_| BatchError::UnparsableDate {
        file: file.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn generation_strips_thousands_separators() {
        assert_eq!(parse_generation_decimal("f", "12,345.5").unwrap(), 12345.5);
        assert_eq!(parse_generation_integer("f", "1,200").unwrap(), 1200.0);
    }

    #[test]
    fn integer_generation_rejects_fractions() {
        assert!(matches!(
            parse_generation_integer("f", "12.5"),
            Err(BatchError::InputFormat { .. })
        ));
    }

    #[test]
    fn negative_generation_is_rejected() {
        assert!(matches!(
            parse_generation_decimal("f", "-3"),
            Err(BatchError::InputFormat { .. })
        ));
    }

    #[test]
    fn period_date_accepts_unpadded_and_time_suffix() {
        assert_eq!(parse_period_date("f", "3/31/2024").unwrap(), date!(2024-03-31));
        assert_eq!(parse_period_date("f", "01/05/2023 0:00").unwrap(), date!(2023-01-05));
    }

    #[test]
    fn period_date_rejects_garbage() {
        assert!(matches!(
            parse_period_date("f", "2024-03-31"),
            Err(BatchError::UnparsableDate { .. })
        ));
        assert!(matches!(
            parse_period_date("f", "13/01/2024"),
            Err(BatchError::UnparsableDate { .. })
        ));
    }

    #[test]
    fn missing_columns_are_all_named() {
        let input = TabularInput::new("prod.csv", "System ID,Other\nA,1\n");
        let (columns, _) = read_table(&input).unwrap();
        let err = columns
            .require("prod.csv", "NEPool quarterly", &["System ID", "Energy Produced", "Period End Date"])
            .unwrap_err();
        match err {
            BatchError::MissingColumns { columns, .. } => {
                assert_eq!(columns, vec!["Energy Produced", "Period End Date"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
