use std::collections::BTreeMap;

use crate::heuristics::RawObservation;

/// Per-identity sums for one document.
///
/// Identities with no observations are absent, not zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    totals: BTreeMap<String, i64>,
    lines: BTreeMap<String, usize>,
}

impl Aggregate {
    pub fn get(&self, identity: &str) -> Option<i64> {
        self.totals.get(identity).copied()
    }

    /// Number of source lines that contributed to `identity`.
    pub fn line_count(&self, identity: &str) -> usize {
        self.lines.get(identity).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn total_cents(&self) -> i64 {
        self.totals.values().fold(0, |acc, c| acc.saturating_add(*c))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.totals.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, i64)> for Aggregate {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        let mut agg = Aggregate::default();
        for (identity, cents) in iter {
            let total = agg.totals.entry(identity.clone()).or_insert(0);
            *total = total.saturating_add(cents);
            *agg.lines.entry(identity).or_insert(0) += 1;
        }
        agg
    }
}

/// Group observations by resolved identity and sum their amounts.
///
/// Pure addition keyed by identity, so page and table-fragment order never
/// changes the result.
pub fn aggregate(observations: &[RawObservation]) -> Aggregate {
    observations
        .iter()
        .map(|obs| (obs.identity.clone(), obs.amount_cents))
        .collect()
}
