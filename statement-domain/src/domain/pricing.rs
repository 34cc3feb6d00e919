use std::collections::BTreeMap;

use super::customer::RateClass;

/// Unit price per MWh, keyed by rate class. Fixed for the whole batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    prices: BTreeMap<RateClass, f64>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price for a class, replacing any earlier value.
    pub fn insert(&mut self, class: RateClass, price: f64) {
        self.prices.insert(class, price);
    }

    pub fn get(&self, class: &RateClass) -> Option<f64> {
        self.prices.get(class).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RateClass, f64)> {
        self.prices.iter().map(|(k, v)| (k, *v))
    }
}

impl FromIterator<(RateClass, f64)> for PriceTable {
    fn from_iter<I: IntoIterator<Item = (RateClass, f64)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

/// Financial breakdown for one customer. Computed when statements are
/// produced and never stored back on the customer record.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SettlementResult {
    pub generation_mwh: f64,
    pub price: f64,
    pub subtotal: f64,
    pub broker_payment: f64,
    pub aggregator_fee: f64,
    pub net_payment: f64,
}
