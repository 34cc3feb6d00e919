use std::collections::HashMap;

use statement_domain::domain::{NormalizedRow, PeriodLabel, RateClass, SchemaKind};

use super::{field, parse_generation_integer, parse_period_date, read_table, NormalizedTable, TabularInput};
use crate::pipeline::BatchError;

/// PJM GATS monthly generation report.
///
/// Expected header columns (by name):
/// - Unit ID
/// - Facility Name
/// - Generation Date (M/D/YYYY; only the first row's value is used)
/// - Generation (kWh) (whole kWh, may contain thousands separators)
pub const REQUIRED_COLUMNS: &[&str] = &["Unit ID", "Facility Name", "Generation Date", "Generation (kWh)"];

/// Columns of the generator details table joined on `Unit ID`.
pub const DETAILS_COLUMNS: &[&str] = &["Unit ID", "State"];
const DETAILS_SCHEMA: &str = "PJM generator details";

/// Jurisdictions settled under another jurisdiction's price.
const JURISDICTION_REMAP: &[(&str, &str)] = &[("NY", "DC")];

#[derive(Debug, Clone, PartialEq)]
pub struct PjmRow {
    pub unit_id: String,
    pub facility_name: String,
    pub generation_kwh: f64,
    pub jurisdiction: String,
}

impl From<PjmRow> for NormalizedRow {
    fn from(r: PjmRow) -> Self {
        NormalizedRow {
            id: r.unit_id,
            display_name: parse_facility_name(&r.facility_name),
            generation_kwh: r.generation_kwh,
            rate_class: RateClass::Jurisdiction(r.jurisdiction),
            schema: SchemaKind::PjmMonthly,
        }
    }
}

/// Unit id → jurisdiction code, read from the generator details table.
#[derive(Debug, Clone, Default)]
pub struct GeneratorDetails {
    states: HashMap<String, String>,
}

impl GeneratorDetails {
    pub fn read(input: &TabularInput) -> Result<Self, BatchError> {
        let (columns, records) = read_table(input)?;
        let idx = columns.require(&input.name, DETAILS_SCHEMA, DETAILS_COLUMNS)?;
        let (id_idx, state_idx) = (idx[0], idx[1]);

        let mut states = HashMap::with_capacity(records.len());
        for record in &records {
            let state = field(record, state_idx).to_ascii_uppercase();
            // First listing of a unit wins.
            states
                .entry(field(record, id_idx).to_string())
                .or_insert(state);
        }
        Ok(Self { states })
    }

    /// Jurisdiction used for pricing, with the fixed remaps applied.
    pub fn jurisdiction(&self, unit_id: &str) -> Option<String> {
        self.states.get(unit_id).map(|state| remap_jurisdiction(state))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

pub fn remap_jurisdiction(code: &str) -> String {
    JURISDICTION_REMAP
        .iter()
        .find(|(from, _)| *from == code)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Owner name from a GATS facility name: text after `" - "` is dropped and a
/// `"Last, First"` remainder becomes `"First Last"`.
pub fn parse_facility_name(raw: &str) -> String {
    let head = raw.split(" - ").next().unwrap_or("").trim();
    match head.split_once(',') {
        Some((last, first)) if !first.trim().is_empty() => {
            format!("{} {}", first.trim(), last.trim())
        }
        _ => head.trim_end_matches(',').trim().to_string(),
    }
}

pub fn normalize(input: &TabularInput, details: &GeneratorDetails) -> Result<NormalizedTable, BatchError> {
    let schema = SchemaKind::PjmMonthly.name();
    let (columns, records) = read_table(input)?;

    let idx = columns.require(&input.name, schema, REQUIRED_COLUMNS)?;
    let (id_idx, name_idx, date_idx, gen_idx) = (idx[0], idx[1], idx[2], idx[3]);

    let period = match records.first() {
        Some(first) => Some(PeriodLabel::monthly(parse_period_date(
            &input.name,
            field(first, date_idx),
        )?)),
        None => None,
    };

    let mut rows = Vec::with_capacity(records.len());
    let mut dropped = 0usize;
    for record in &records {
        let unit_id = field(record, id_idx);
        let Some(jurisdiction) = details.jurisdiction(unit_id) else {
            dropped += 1;
            metrics::counter!("normalizer_rows_dropped_total").increment(1);
            tracing::warn!(
                file = %input.name,
                unit_id,
                "no generator details for unit, dropping row"
            );
            continue;
        };

        let row = PjmRow {
            unit_id: unit_id.to_string(),
            facility_name: field(record, name_idx).to_string(),
            generation_kwh: parse_generation_integer(&input.name, field(record, gen_idx))?,
            jurisdiction,
        };
        rows.push(NormalizedRow::from(row));
    }

    metrics::counter!("normalizer_rows_total").increment(rows.len() as u64);
    tracing::debug!(file = %input.name, rows = rows.len(), dropped, "normalized PJM monthly file");

    Ok(NormalizedTable { rows, period, dropped })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> GeneratorDetails {
        GeneratorDetails::read(&TabularInput::new(
            "details.csv",
            "Unit ID,State\nNON-PJM-11,md\nNON-PJM-12,NY\n",
        ))
        .unwrap()
    }

    #[test]
    fn facility_names_are_reordered() {
        assert_eq!(parse_facility_name("Doe, Jane - 7.2 kW Solar"), "Jane Doe");
        assert_eq!(parse_facility_name("Sunny Acres Farm - Array 2"), "Sunny Acres Farm");
        assert_eq!(parse_facility_name("Acme Solar"), "Acme Solar");
    }

    #[test]
    fn new_york_settles_as_dc() {
        let details = details();
        assert_eq!(details.jurisdiction("NON-PJM-12").as_deref(), Some("DC"));
        assert_eq!(details.jurisdiction("NON-PJM-11").as_deref(), Some("MD"));
        assert_eq!(details.jurisdiction("NON-PJM-99"), None);
    }

    #[test]
    fn joins_details_and_drops_unmatched_rows() {
        let table = normalize(
            &TabularInput::new(
                "gats.csv",
                "Unit ID,Facility Name,Generation Date,Generation (kWh)\n\
                 NON-PJM-11,\"Doe, Jane - Solar\",2/29/2024,\"1,500\"\n\
                 NON-PJM-99,Unknown Unit,2/29/2024,20\n\
                 NON-PJM-12,Roe Farm,2/29/2024,700\n",
            ),
            &details(),
        )
        .unwrap();

        assert_eq!(table.period.as_ref().map(|p| p.as_str()), Some("February 2024"));
        assert_eq!(table.dropped, 1);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].display_name, "Jane Doe");
        assert_eq!(table.rows[0].generation_kwh, 1500.0);
        assert_eq!(table.rows[0].rate_class, RateClass::Jurisdiction("MD".into()));
        assert_eq!(table.rows[1].rate_class, RateClass::Jurisdiction("DC".into()));
    }

    #[test]
    fn details_without_state_column_fail() {
        let err = GeneratorDetails::read(&TabularInput::new("details.csv", "Unit ID\nA\n")).unwrap_err();
        assert!(matches!(err, BatchError::MissingColumns { .. }));
    }
}
