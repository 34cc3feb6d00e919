use statement_domain::domain::{CustomerRecord, PriceTable, RateClass, SettlementResult};

use crate::pipeline::BatchError;

/// kWh per billed MWh.
const KWH_PER_MWH: f64 = 1000.0;

/// Price field prefix; `price_<class>` sets the price of one rate class.
const PRICE_FIELD_PREFIX: &str = "price_";
/// Bare `price` field, priced as program class 1.
const LEGACY_PRICE_FIELD: &str = "price";

/// Validated numeric form parameters of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementTerms {
    pub prices: PriceTable,
    pub broker_rate: f64,
    /// Fraction of the subtotal, e.g. `0.05` for 5%.
    pub agg_rate: f64,
}

/// Pure settlement of one customer.
///
/// Rules:
/// - generation is billed in MWh (`kWh / 1000`).
/// - the broker payment is a flat rate per MWh, independent of price.
/// - the aggregator fee is a fraction of the subtotal.
/// - the aggregator rate is not capped, so a rate above 1.0 yields a negative
///   net payment.
pub fn settle(
    record: &CustomerRecord,
    prices: &PriceTable,
    broker_rate: f64,
    agg_rate: f64,
) -> Result<SettlementResult, BatchError> {
    let price = prices
        .get(&record.rate_class)
        .ok_or_else(|| BatchError::UnknownRateClass {
            id: record.id.clone(),
            rate_class: record.rate_class.clone(),
        })?;

    let generation_mwh = record.accumulated_generation_kwh / KWH_PER_MWH;
    let subtotal = price * generation_mwh;
    let broker_payment = broker_rate * generation_mwh;
    let aggregator_fee = agg_rate * subtotal;
    let net_payment = subtotal - broker_payment - aggregator_fee;

    Ok(SettlementResult {
        generation_mwh,
        price,
        subtotal,
        broker_payment,
        aggregator_fee,
        net_payment,
    })
}

/// Parses a required rate: present, decimal, finite and non-negative.
pub fn parse_rate(field: &str, raw: Option<&str>) -> Result<f64, BatchError> {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Err(BatchError::IncompleteForm(format!("'{field}' is required")));
    }
    let value: f64 = raw.parse().map_err(|_| {
        BatchError::IncompleteForm(format!("'{field}' should be a decimal number, got '{raw}'"))
    })?;
    if !value.is_finite() {
        return Err(BatchError::IncompleteForm(format!("'{field}' should be a finite number")));
    }
    if value < 0.0 {
        return Err(BatchError::IncompleteForm(format!("'{field}' should be nonnegative")));
    }
    Ok(value)
}

fn form_value<'a>(form: &'a [(String, String)], name: &str) -> Option<&'a str> {
    form.iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Builds the price table and rates from submitted form fields.
///
/// `price` is an alias for `price_1`; `price_<n>` prices program class `n` and
/// `price_<CODE>` prices jurisdiction `CODE`. Blank price fields are ignored,
/// but at least one price must be given.
pub fn parse_settlement_terms(form: &[(String, String)]) -> Result<SettlementTerms, BatchError> {
    let mut prices = PriceTable::new();
    for (name, value) in form {
        let class = if name == LEGACY_PRICE_FIELD {
            RateClass::Program(1)
        } else if let Some(suffix) = name.strip_prefix(PRICE_FIELD_PREFIX) {
            suffix.parse::<RateClass>().map_err(|e| {
                BatchError::IncompleteForm(format!("'{name}' does not name a rate class: {e}"))
            })?
        } else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }
        prices.insert(class, parse_rate(name, Some(value.as_str()))?);
    }
    if prices.is_empty() {
        return Err(BatchError::IncompleteForm("at least one price is required".to_string()));
    }

    let broker_rate = parse_rate("broker_rate", form_value(form, "broker_rate"))?;
    let agg_rate = parse_rate("agg_rate", form_value(form, "agg_rate"))?;

    Ok(SettlementTerms {
        prices,
        broker_rate,
        agg_rate,
    })
}
