use statement_domain::domain::{CustomerRecord, SettlementResult};

use crate::pipeline::{BatchError, Renderer};
use crate::transform::SettlementTerms;

/// Names of every field handed to the statement template, in render order.
pub const FIELD_NAMES: [&str; 13] = [
    "path",
    "date",
    "period",
    "name",
    "id",
    "generation",
    "price",
    "subtotal",
    "broker_rate",
    "broker_payment",
    "agg_rate",
    "aggregator",
    "payment",
];

/// Values shared by every statement of a batch.
#[derive(Debug, Clone)]
pub struct StatementContext {
    /// Logo image path as referenced from the template.
    pub logo_path: String,
    /// Batch run date, `MM/DD/YYYY`.
    pub date: String,
    pub period: String,
}

/// Field map for one rendered document.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementFields {
    values: Vec<(&'static str, String)>,
}

impl StatementFields {
    pub fn for_customer(
        ctx: &StatementContext,
        record: &CustomerRecord,
        settlement: &SettlementResult,
        terms: &SettlementTerms,
    ) -> Self {
        let generation_decimals = record.schema.generation_decimals();
        let values = vec![
            ("path", ctx.logo_path.clone()),
            ("date", ctx.date.clone()),
            ("period", ctx.period.clone()),
            ("name", record.display_name.clone()),
            ("id", record.id.clone()),
            ("generation", format_with_commas(settlement.generation_mwh, generation_decimals)),
            ("price", format_with_commas(settlement.price, 2)),
            ("subtotal", format_with_commas(settlement.subtotal, 2)),
            ("broker_rate", format_with_commas(terms.broker_rate, 2)),
            ("broker_payment", format_with_commas(settlement.broker_payment, 2)),
            ("agg_rate", format_with_commas(terms.agg_rate * 100.0, 2)),
            ("aggregator", format_with_commas(settlement.aggregator_fee, 2)),
            ("payment", format_with_commas(settlement.net_payment, 2)),
        ];
        Self { values }
    }

    /// Layout preview: every field empty except the logo.
    pub fn blank(ctx: &StatementContext) -> Self {
        let values = FIELD_NAMES
            .iter()
            .map(|&name| {
                let value = if name == "path" { ctx.logo_path.clone() } else { String::new() };
                (name, value)
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Format a number with thousands separators and a fixed number of decimals.
pub fn format_with_commas(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.1$}", value.abs(), decimals);
    let (int_part, dec_part) = match formatted.split_once('.') {
        Some((i, d)) => (i, Some(d)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    // No sign when the value rounds to zero.
    let is_zero = formatted.chars().all(|c| c == '0' || c == '.');
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };

    match dec_part {
        Some(d) => format!("{sign}{grouped}.{d}"),
        None => format!("{sign}{grouped}"),
    }
}

/// HTML renderer substituting `{{ field }}` placeholders.
///
/// Field values are HTML-escaped. Placeholders are accepted with or without
/// inner spaces. Rasterizing the HTML is left to whatever consumes the bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

impl Renderer for TemplateRenderer {
    fn extension(&self) -> &str {
        "html"
    }

    /// Replaces each known `{{ name }}` with its escaped value in one pass over
    /// the template. Unknown placeholders stay verbatim; inserted values are
    /// never rescanned.
    fn render(&self, template: &str, fields: &StatementFields) -> Result<Vec<u8>, BatchError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                rest = &rest[start..];
                break;
            };
            match fields.get(after[..end].trim()) {
                Some(value) => out.push_str(&escape_html(value)),
                None => out.push_str(&rest[start..start + end + 4]),
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statement_domain::domain::{PriceTable, RateClass, SchemaKind};

    fn ctx() -> StatementContext {
        StatementContext {
            logo_path: "assets/logo.png".to_string(),
            date: "10/16/2026".to_string(),
            period: "Q1 2024".to_string(),
        }
    }

    #[test]
    fn commas_group_thousands() {
        assert_eq!(format_with_commas(0.0, 2), "0.00");
        assert_eq!(format_with_commas(999.999, 2), "1,000.00");
        assert_eq!(format_with_commas(1234567.891, 3), "1,234,567.891");
        assert_eq!(format_with_commas(-1234.5, 2), "-1,234.50");
        assert_eq!(format_with_commas(-0.001, 2), "0.00");
        assert_eq!(format_with_commas(12.0, 4), "12.0000");
    }

    #[test]
    fn customer_fields_follow_document_contract() {
        let record = CustomerRecord {
            id: "NON-MA-101".to_string(),
            display_name: "Jane Doe".to_string(),
            accumulated_generation_kwh: 1_234_567.0,
            rate_class: RateClass::Program(1),
            schema: SchemaKind::NepoolQuarterly,
        };
        let terms = SettlementTerms {
            prices: PriceTable::from_iter([(RateClass::Program(1), 10.0)]),
            broker_rate: 1.0,
            agg_rate: 0.05,
        };
        let settlement = crate::transform::settle(&record, &terms.prices, 1.0, 0.05).unwrap();
        let fields = StatementFields::for_customer(&ctx(), &record, &settlement, &terms);

        let names: Vec<_> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(names, FIELD_NAMES.to_vec());
        assert_eq!(fields.get("generation"), Some("1,234.567"));
        assert_eq!(fields.get("subtotal"), Some("12,345.67"));
        assert_eq!(fields.get("agg_rate"), Some("5.00"));
        assert_eq!(fields.get("period"), Some("Q1 2024"));
    }

    #[test]
    fn blank_fields_keep_only_logo() {
        let fields = StatementFields::blank(&ctx());
        assert_eq!(fields.get("path"), Some("assets/logo.png"));
        assert!(fields.iter().filter(|(k, _)| *k != "path").all(|(_, v)| v.is_empty()));
    }

    #[test]
    fn renderer_substitutes_and_escapes() {
        let fields = StatementFields {
            values: vec![("name", "Doe & Sons".to_string()), ("date", String::new())],
        };

        let html = TemplateRenderer
            .render("<p>{{ name }}|{{name}}|{{ date }}</p>", &fields)
            .unwrap();
        assert_eq!(String::from_utf8(html).unwrap(), "<p>Doe &amp; Sons|Doe &amp; Sons|</p>");
    }

    #[test]
    fn substituted_values_are_not_rendered_again() {
        let fields = StatementFields {
            values: vec![
                ("name", "Jane {{ payment }}".to_string()),
                ("payment", "8.50".to_string()),
            ],
        };

        let html = TemplateRenderer
            .render("{{ name }}|{{payment}}|{{ unknown }}|{{ open", &fields)
            .unwrap();
        assert_eq!(
            String::from_utf8(html).unwrap(),
            "Jane {{ payment }}|8.50|{{ unknown }}|{{ open"
        );
    }
}
