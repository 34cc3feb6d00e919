use std::fmt;

use time::{Date, Month};

use super::customer::SchemaKind;

/// Maps a calendar month to the settlement fiscal quarter.
///
/// Feb–Apr is Q1, May–Jul Q2, Aug–Oct Q3 and Nov–Jan Q4. January belongs to
/// the Q4 that started the previous November, but the label keeps the year of
/// the date it was derived from.
pub fn fiscal_quarter(month: Month) -> u8 {
    let m = u8::from(month) as i32;
    ((m - 2).rem_euclid(12) / 3 + 1) as u8
}

/// Period label derived from the first dated row of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PeriodLabel(String);

impl PeriodLabel {
    pub fn quarterly(date: Date) -> Self {
        Self(format!("Q{} {}", fiscal_quarter(date.month()), date.year()))
    }

    pub fn monthly(date: Date) -> Self {
        Self(format!("{} {}", date.month(), date.year()))
    }

    pub fn for_schema(schema: SchemaKind, date: Date) -> Self {
        match schema {
            SchemaKind::NepoolQuarterly => Self::quarterly(date),
            SchemaKind::PjmMonthly => Self::monthly(date),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reporting period of a batch: one label per contributing file, in the order
/// the files were ingested. Labels are never deduplicated or reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReportingPeriod {
    labels: Vec<PeriodLabel>,
}

impl ReportingPeriod {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: PeriodLabel) {
        self.labels.push(label);
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[PeriodLabel] {
        &self.labels
    }

    /// Filesystem-safe form of the label: every run of non-alphanumeric
    /// characters collapses to a single `_`.
    pub fn slug(&self) -> String {
        slugify(&self.to_string())
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(label.as_str())?;
        }
        Ok(())
    }
}

/// Keeps Unicode letters and digits, collapsing every other run into `_`.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_sep = false;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn fiscal_quarter_follows_february_start() {
        assert_eq!(fiscal_quarter(Month::February), 1);
        assert_eq!(fiscal_quarter(Month::April), 1);
        assert_eq!(fiscal_quarter(Month::May), 2);
        assert_eq!(fiscal_quarter(Month::October), 3);
        assert_eq!(fiscal_quarter(Month::November), 4);
        assert_eq!(fiscal_quarter(Month::December), 4);
        assert_eq!(fiscal_quarter(Month::January), 4);
    }

    #[test]
    fn january_label_keeps_its_own_year() {
        assert_eq!(PeriodLabel::quarterly(date!(2024-01-31)).as_str(), "Q4 2024");
        assert_eq!(PeriodLabel::quarterly(date!(2023-03-31)).as_str(), "Q1 2023");
    }

    #[test]
    fn monthly_label_uses_month_name() {
        assert_eq!(PeriodLabel::monthly(date!(2024-02-29)).as_str(), "February 2024");
    }

    #[test]
    fn reporting_period_appends_without_dedup() {
        let mut period = ReportingPeriod::new();
        period.push(PeriodLabel::monthly(date!(2024-01-31)));
        period.push(PeriodLabel::monthly(date!(2024-02-29)));
        period.push(PeriodLabel::monthly(date!(2024-01-15)));
        assert_eq!(period.to_string(), "January 2024, February 2024, January 2024");
        assert_eq!(period.slug(), "January_2024_February_2024_January_2024");
    }

    #[test]
    fn slugify_trims_separators() {
        assert_eq!(slugify("  Q1 2024 "), "Q1_2024");
        assert_eq!(slugify("Doe, Jane"), "Doe_Jane");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("José Núñez"), "José_Núñez");
    }
}
