// src/reconcile.rs

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::aggregate::Aggregate;
use crate::roster::RosterRegistry;

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Month {
    Janeiro = 1,
    Fevereiro,
    #[serde(rename = "Março")]
    Marco,
    Abril,
    Maio,
    Junho,
    Julho,
    Agosto,
    Setembro,
    Outubro,
    Novembro,
    Dezembro,
}

const MONTHS: [Month; 12] = [
    Month::Janeiro,
    Month::Fevereiro,
    Month::Marco,
    Month::Abril,
    Month::Maio,
    Month::Junho,
    Month::Julho,
    Month::Agosto,
    Month::Setembro,
    Month::Outubro,
    Month::Novembro,
    Month::Dezembro,
];

impl Month {
    pub fn from_number(n: u32) -> Option<Month> {
        MONTHS.get(n.checked_sub(1)? as usize).copied()
    }

    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Month::Janeiro => "Janeiro",
            Month::Fevereiro => "Fevereiro",
            Month::Marco => "Março",
            Month::Abril => "Abril",
            Month::Maio => "Maio",
            Month::Junho => "Junho",
            Month::Julho => "Julho",
            Month::Agosto => "Agosto",
            Month::Setembro => "Setembro",
            Month::Outubro => "Outubro",
            Month::Novembro => "Novembro",
            Month::Dezembro => "Dezembro",
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown month {0:?}")]
pub struct MonthParseError(String);

impl FromStr for Month {
    type Err = MonthParseError;

    /// Accepts `3`, `Março`, `marco`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u32>() {
            return Month::from_number(n).ok_or_else(|| MonthParseError(s.to_string()));
        }
        let folded = s.to_lowercase().replace('ç', "c");
        MONTHS
            .iter()
            .copied()
            .find(|m| m.name().to_lowercase().replace('ç', "c") == folded)
            .ok_or_else(|| MonthParseError(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Period {
    pub year: i32,
    pub month: Month,
}

impl Period {
    pub fn new(year: i32, month: Month) -> Self {
        Self { year, month }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.month, self.year)
    }
}

// ---------------------------------------------------------------------------
// Ledger rows
// ---------------------------------------------------------------------------

/// Render centavos as `1234.56`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// One consultant's figures for one period. Total and commission are always
/// computed from the parts, services and rate.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    period: Period,
    consultant: String,
    parts_cents: i64,
    services_cents: i64,
    rate: f64,
}

impl LedgerRow {
    pub fn new(
        period: Period,
        consultant: impl Into<String>,
        parts_cents: i64,
        services_cents: i64,
        rate: f64,
    ) -> Self {
        Self {
            period,
            consultant: consultant.into(),
            parts_cents,
            services_cents,
            rate,
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn consultant(&self) -> &str {
        &self.consultant
    }

    pub fn parts_cents(&self) -> i64 {
        self.parts_cents
    }

    pub fn services_cents(&self) -> i64 {
        self.services_cents
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn total_cents(&self) -> i64 {
        self.parts_cents.saturating_add(self.services_cents)
    }

    /// Rounded half away from zero to the centavo.
    pub fn commission_cents(&self) -> i64 {
        (self.total_cents() as f64 * self.rate).round() as i64
    }
}

impl Serialize for LedgerRow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("LedgerRow", 7)?;
        s.serialize_field("year", &self.period.year)?;
        s.serialize_field("month", &self.period.month)?;
        s.serialize_field("consultant", &self.consultant)?;
        s.serialize_field("parts", &format_cents(self.parts_cents))?;
        s.serialize_field("services", &format_cents(self.services_cents))?;
        s.serialize_field("total", &format_cents(self.total_cents()))?;
        s.serialize_field("commission", &format_cents(self.commission_cents()))?;
        s.end()
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilePolicy {
    pub rate: f64,
    /// Add an all-zero row for every roster member missing from both reports.
    pub fill_roster: bool,
}

/// Outer-join the parts and services sums into one row per consultant,
/// ordered by total descending, then by name.
pub fn reconcile(
    parts: &Aggregate,
    services: &Aggregate,
    period: Period,
    roster: &RosterRegistry,
    policy: ReconcilePolicy,
) -> Vec<LedgerRow> {
    let mut names: BTreeSet<&str> = parts.iter().chain(services.iter()).map(|(n, _)| n).collect();
    if policy.fill_roster {
        names.extend(roster.identities().iter().map(|i| i.name()));
    }

    let mut rows: Vec<LedgerRow> = names
        .into_iter()
        .map(|name| {
            LedgerRow::new(
                period,
                name,
                parts.get(name).unwrap_or(0),
                services.get(name).unwrap_or(0),
                policy.rate,
            )
        })
        .collect();

    rows.sort_by(ledger_order);
    rows
}

/// Presentation order: highest total first, ties by consultant name.
pub fn ledger_order(a: &LedgerRow, b: &LedgerRow) -> Ordering {
    b.total_cents()
        .cmp(&a.total_cents())
        .then_with(|| a.consultant.cmp(&b.consultant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::registry;
    use proptest::prelude::*;

    const POLICY: ReconcilePolicy = ReconcilePolicy {
        rate: 0.01,
        fill_roster: false,
    };

    fn agg(pairs: &[(&str, i64)]) -> Aggregate {
        pairs.iter().map(|(n, c)| (n.to_string(), *c)).collect()
    }

    fn march() -> Period {
        Period::new(2025, "Março".parse().unwrap())
    }

    #[test]
    fn test_parts_only_person() {
        let roster = registry(&["A", "B"]);
        let rows = reconcile(&agg(&[("A", 10_000)]), &agg(&[]), march(), &roster, POLICY);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.consultant(), "A");
        assert_eq!(row.parts_cents(), 10_000);
        assert_eq!(row.services_cents(), 0);
        assert_eq!(row.total_cents(), 10_000);
        assert_eq!(row.commission_cents(), 100);
        assert_eq!(row.period().month, Month::Marco);
    }

    #[test]
    fn test_outer_join() {
        let roster = registry(&["A", "B", "C"]);
        let parts = agg(&[("A", 5_000), ("B", 1_000)]);
        let services = agg(&[("B", 2_500), ("C", 700)]);
        let rows = reconcile(&parts, &services, march(), &roster, POLICY);
        let summary: Vec<_> = rows
            .iter()
            .map(|r| (r.consultant(), r.parts_cents(), r.services_cents(), r.total_cents()))
            .collect();
        assert_eq!(
            summary,
            vec![("A", 5_000, 0, 5_000), ("B", 1_000, 2_500, 3_500), ("C", 0, 700, 700)]
        );
    }

    #[test]
    fn test_fill_roster_adds_zero_rows() {
        let roster = registry(&["ANA", "BRUNO", "CARLA"]);
        let policy = ReconcilePolicy {
            fill_roster: true,
            ..POLICY
        };
        let rows = reconcile(&agg(&[("BRUNO", 100)]), &agg(&[]), march(), &roster, policy);
        let names: Vec<_> = rows.iter().map(|r| r.consultant()).collect();
        // zero rows tie on total and fall back to name order
        assert_eq!(names, vec!["BRUNO", "ANA", "CARLA"]);
        assert_eq!(rows[1].commission_cents(), 0);
    }

    #[test]
    fn test_both_documents_empty() {
        let roster = registry(&["ANA"]);
        assert!(reconcile(&agg(&[]), &agg(&[]), march(), &roster, POLICY).is_empty());
    }

    #[test]
    fn test_commission_rounding() {
        let row = LedgerRow::new(march(), "A", 12_345, 0, 0.01);
        // 123.45 * 1% = 1.2345 -> 1.23
        assert_eq!(row.commission_cents(), 123);
        let row = LedgerRow::new(march(), "A", 150, 0, 0.01);
        // 0.015 rounds away from zero
        assert_eq!(row.commission_cents(), 2);
    }

    #[test]
    fn test_total_saturates() {
        let row = LedgerRow::new(march(), "A", i64::MAX, 1, 0.01);
        assert_eq!(row.total_cents(), i64::MAX);
    }

    #[test]
    fn test_month_parsing() {
        assert_eq!("3".parse::<Month>(), Ok(Month::Marco));
        assert_eq!("março".parse::<Month>(), Ok(Month::Marco));
        assert_eq!("MARCO".parse::<Month>(), Ok(Month::Marco));
        assert_eq!(" Dezembro ".parse::<Month>(), Ok(Month::Dezembro));
        assert!("13".parse::<Month>().is_err());
        assert!("0".parse::<Month>().is_err());
        assert!("Smarch".parse::<Month>().is_err());
        assert_eq!(Month::from_number(12), Some(Month::Dezembro));
        assert_eq!(Month::Marco.number(), 3);
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(150_000), "1500.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-120), "-1.20");
    }

    #[test]
    fn test_row_json() {
        let row = LedgerRow::new(march(), "A", 10_000, 550, 0.01);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["month"], "Março");
        assert_eq!(json["total"], "105.50");
        assert_eq!(json["commission"], "1.06");
    }

    fn sums() -> impl Strategy<Value = Vec<(usize, i64)>> {
        prop::collection::vec((0usize..4, 0i64..5_000_000), 0..8)
    }

    proptest! {
        #[test]
        fn reconcile_is_idempotent(p in sums(), s in sums(), fill in any::<bool>()) {
            let names = ["ANA", "BRUNO", "CARLA", "DANI"];
            let roster = registry(&names);
            let parts: Aggregate = p.iter().map(|(i, c)| (names[*i].to_string(), *c)).collect();
            let services: Aggregate = s.iter().map(|(i, c)| (names[*i].to_string(), *c)).collect();
            let policy = ReconcilePolicy { rate: 0.01, fill_roster: fill };

            let first = reconcile(&parts, &services, march(), &roster, policy);
            let second = reconcile(&parts, &services, march(), &roster, policy);
            prop_assert_eq!(&first, &second);
            for row in &first {
                prop_assert_eq!(row.total_cents(), row.parts_cents() + row.services_cents());
            }
            for pair in first.windows(2) {
                prop_assert!(ledger_order(&pair[0], &pair[1]) != Ordering::Greater);
            }
        }
    }
}
