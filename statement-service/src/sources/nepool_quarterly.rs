use statement_domain::domain::{NormalizedRow, PeriodLabel, RateClass, SchemaKind};

use super::{field, parse_generation_decimal, parse_period_date, read_table, NormalizedTable, TabularInput};
use crate::pipeline::BatchError;

/// NEPool GIS quarterly production report.
///
/// Expected header columns (by name):
/// - System ID
/// - Period End Date (M/D/YYYY; only the first row's value is used)
/// - Energy Produced (kWh, may contain thousands separators)
/// - Owner First Name + Owner Last Name, or System Name
/// - Program (optional numeric program class, defaults to 1)
pub const REQUIRED_COLUMNS: &[&str] = &["System ID", "Period End Date", "Energy Produced"];
pub const OWNER_COLUMNS: &[&str] = &["Owner First Name", "Owner Last Name"];
pub const SYSTEM_NAME_COLUMN: &str = "System Name";
pub const PROGRAM_COLUMN: &str = "Program";

const DEFAULT_PROGRAM: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct NepoolRow {
    pub system_id: String,
    pub display_name: String,
    pub energy_produced_kwh: f64,
    pub program: u32,
}

impl From<NepoolRow> for NormalizedRow {
    fn from(r: NepoolRow) -> Self {
        NormalizedRow {
            id: r.system_id,
            display_name: r.display_name,
            generation_kwh: r.energy_produced_kwh,
            rate_class: RateClass::Program(r.program),
            schema: SchemaKind::NepoolQuarterly,
        }
    }
}

enum NameSource {
    Owner { first: usize, last: usize },
    SystemName(usize),
}

/// Splits a run-together system name at upper-case letters
/// (`"JaneDoeSolar"` → `"Jane Doe Solar"`).
pub fn nameify(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for ch in name.chars() {
        if let Some(p) = prev {
            if ch.is_uppercase() && p != ' ' {
                out.push(' ');
            }
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

pub fn normalize(input: &TabularInput) -> Result<NormalizedTable, BatchError> {
    let schema = SchemaKind::NepoolQuarterly.name();
    let (columns, records) = read_table(input)?;

    let required = columns.require(&input.name, schema, REQUIRED_COLUMNS)?;
    let (id_idx, date_idx, energy_idx) = (required[0], required[1], required[2]);

    let name_source = match (
        columns.position(OWNER_COLUMNS[0]),
        columns.position(OWNER_COLUMNS[1]),
        columns.position(SYSTEM_NAME_COLUMN),
    ) {
        (Some(first), Some(last), _) => NameSource::Owner { first, last },
        (_, _, Some(idx)) => NameSource::SystemName(idx),
        _ => {
            return Err(BatchError::MissingColumns {
                file: input.name.clone(),
                schema,
                columns: vec![format!(
                    "{} or {} + {}",
                    SYSTEM_NAME_COLUMN, OWNER_COLUMNS[0], OWNER_COLUMNS[1]
                )],
            })
        }
    };
    let program_idx = columns.position(PROGRAM_COLUMN);

    let period = match records.first() {
        Some(first) => Some(PeriodLabel::quarterly(parse_period_date(
            &input.name,
            field(first, date_idx),
        )?)),
        None => None,
    };

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        let display_name = match name_source {
            NameSource::Owner { first, last } => {
                format!("{} {}", field(record, first), field(record, last))
                    .trim()
                    .to_string()
            }
            NameSource::SystemName(idx) => nameify(field(record, idx)),
        };

        let program = match program_idx.map(|idx| field(record, idx)) {
            None | Some("") => DEFAULT_PROGRAM,
            Some(raw) => raw.parse().map_err(|e| BatchError::InputFormat {
                file: input.name.clone(),
                reason: format!("invalid program class '{raw}': {e}"),
            })?,
        };

        let row = NepoolRow {
            system_id: field(record, id_idx).to_string(),
            display_name,
            energy_produced_kwh: parse_generation_decimal(&input.name, field(record, energy_idx))?,
            program,
        };
        rows.push(NormalizedRow::from(row));
    }

    metrics::counter!("normalizer_rows_total").increment(rows.len() as u64);
    tracing::debug!(file = %input.name, rows = rows.len(), "normalized NEPool quarterly file");

    Ok(NormalizedTable {
        rows,
        period,
        dropped: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(body: &str) -> TabularInput {
        TabularInput::new("nepool.csv", body.to_string())
    }

    #[test]
    fn nameify_splits_camel_case() {
        assert_eq!(nameify("JaneDoeSolar"), "Jane Doe Solar");
        assert_eq!(nameify("Jane Doe"), "Jane Doe");
        assert_eq!(nameify(""), "");
    }

    #[test]
    fn decodes_rows_and_quarter_label() {
        let table = normalize(&input(
            "System ID,System Name,Period End Date,Energy Produced\n\
             NON-MA-101,JaneDoe,4/30/2024,\"1,200.5\"\n\
             NON-MA-102,JohnRoe,4/30/2024,300\n",
        ))
        .unwrap();

        assert_eq!(table.period.as_ref().map(|p| p.as_str()), Some("Q1 2024"));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].id, "NON-MA-101");
        assert_eq!(table.rows[0].display_name, "Jane Doe");
        assert_eq!(table.rows[0].generation_kwh, 1200.5);
        assert_eq!(table.rows[0].rate_class, RateClass::Program(1));
    }

    #[test]
    fn owner_columns_take_precedence_and_program_is_read() {
        let table = normalize(&input(
            "System ID,Owner First Name,Owner Last Name,System Name,Program,Period End Date,Energy Produced\n\
             NON-MA-7,Jane,Doe,Ignored,2,1/31/2024,10\n",
        ))
        .unwrap();

        assert_eq!(table.rows[0].display_name, "Jane Doe");
        assert_eq!(table.rows[0].rate_class, RateClass::Program(2));
        assert_eq!(table.period.unwrap().as_str(), "Q4 2024");
    }

    #[test]
    fn missing_required_column_fails_fast() {
        let err = normalize(&input("System ID,System Name,Energy Produced\nA,B,1\n")).unwrap_err();
        assert!(matches!(err, BatchError::MissingColumns { .. }));
        assert!(err.to_string().contains("Period End Date"));
    }

    #[test]
    fn missing_name_source_fails() {
        let err = normalize(&input("System ID,Period End Date,Energy Produced\nA,1/1/2024,1\n"))
            .unwrap_err();
        assert!(matches!(err, BatchError::MissingColumns { .. }));
    }

    #[test]
    fn bad_first_date_is_unparsable() {
        let err = normalize(&input(
            "System ID,System Name,Period End Date,Energy Produced\nA,B,sometime,1\n",
        ))
        .unwrap_err();
        assert!(matches!(err, BatchError::UnparsableDate { .. }));
    }

    #[test]
    fn header_only_file_has_no_period() {
        let table = normalize(&input("System ID,System Name,Period End Date,Energy Produced\n")).unwrap();
        assert!(table.rows.is_empty());
        assert!(table.period.is_none());
    }
}
