use std::collections::{HashMap, HashSet};

use crate::domain::{CustomerRecord, NormalizedRow};

/// Per-batch mapping of customer id to accumulated state.
///
/// Iteration order is the order in which ids were first seen, which is also
/// the order of the reconciliation ledger.
#[derive(Debug, Clone, Default)]
pub struct CustomerLedger {
    records: Vec<CustomerRecord>,
    index: HashMap<String, usize>,
}

impl CustomerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges rows into the ledger. May be called once per input file; the
    /// generation of an id is summed across every call.
    ///
    /// Display name, rate class and schema are taken from the first row seen
    /// for an id and never overwritten.
    pub fn accumulate<'a, I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = &'a NormalizedRow>,
    {
        for row in rows {
            let idx = match self.index.get(&row.id) {
                Some(&idx) => idx,
                None => {
                    self.records.push(CustomerRecord::first_sighting(row));
                    let idx = self.records.len() - 1;
                    self.index.insert(row.id.clone(), idx);
                    idx
                }
            };
            self.records[idx].accumulated_generation_kwh += row.generation_kwh;
        }
    }

    /// Keeps only customers whose derived key is in `allowed`. Returns the
    /// number of removed entries.
    pub fn filter_by_allow_list(&mut self, allowed: &HashSet<i64>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| {
            derived_key(&r.id)
                .map(|key| allowed.contains(&key))
                .unwrap_or(false)
        });
        self.rebuild_index();
        before - self.records.len()
    }

    pub fn get(&self, id: &str) -> Option<&CustomerRecord> {
        self.index.get(id).map(|&idx| &self.records[idx])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomerRecord> {
        self.records.iter()
    }

    /// Total generation across all customers, in kWh.
    pub fn total_generation_kwh(&self) -> f64 {
        self.records.iter().map(|r| r.accumulated_generation_kwh).sum()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.id.clone(), idx))
            .collect();
    }
}

/// Allow-list key of a customer id: the third `-`-delimited segment parsed as
/// an integer (`"SYS-00-5"` → `5`).
pub fn derived_key(id: &str) -> Option<i64> {
    id.split('-').nth(2).and_then(|seg| seg.trim().parse().ok())
}
