use std::{fmt, str::FromStr};

/// Source schema a row was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SchemaKind {
    /// NEPool GIS quarterly production report.
    NepoolQuarterly,
    /// PJM GATS monthly generation report, joined with a generator details table.
    PjmMonthly,
}

impl SchemaKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::NepoolQuarterly => "NEPool quarterly",
            Self::PjmMonthly => "PJM monthly",
        }
    }

    /// Decimal places used when rendering generation for customers of this schema.
    pub fn generation_decimals(self) -> usize {
        match self {
            Self::NepoolQuarterly => 3,
            Self::PjmMonthly => 4,
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Selects which unit price applies to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RateClass {
    /// Numeric program class (NEPool).
    Program(u32),
    /// Two-letter jurisdiction code (PJM).
    Jurisdiction(String),
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program(n) => write!(f, "program {n}"),
            Self::Jurisdiction(code) => write!(f, "jurisdiction {code}"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid rate class '{0}'")]
pub struct RateClassParseError(pub String);

/// Parses a rate class key as used in price field names: all digits is a
/// program class, all letters is a jurisdiction code (upper-cased).
impl FromStr for RateClass {
    type Err = RateClassParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RateClassParseError(s.to_string()));
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            return trimmed
                .parse()
                .map(Self::Program)
                .map_err(|_| RateClassParseError(s.to_string()));
        }
        if trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Ok(Self::Jurisdiction(trimmed.to_ascii_uppercase()));
        }
        Err(RateClassParseError(s.to_string()))
    }
}

/// One decoded input row, independent of the schema it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub id: String,
    pub display_name: String,
    pub generation_kwh: f64,
    pub rate_class: RateClass,
    pub schema: SchemaKind,
}

/// Accumulated state for one customer within a batch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CustomerRecord {
    pub id: String,
    pub display_name: String,
    pub accumulated_generation_kwh: f64,
    pub rate_class: RateClass,
    pub schema: SchemaKind,
}

impl CustomerRecord {
    /// Starts a record from the first row seen for its id. Generation begins at
    /// zero; the caller adds the row's delta.
    pub fn first_sighting(row: &NormalizedRow) -> Self {
        Self {
            id: row.id.clone(),
            display_name: row.display_name.clone(),
            accumulated_generation_kwh: 0.0,
            rate_class: row.rate_class.clone(),
            schema: row.schema,
        }
    }
}
