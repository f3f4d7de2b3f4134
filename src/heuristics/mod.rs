// src/heuristics/mod.rs

mod patterns;

pub use patterns::{AmountError, parse_amount};

use crate::resolver::{NameResolver, Resolution};
use patterns::{LinePattern, parts_patterns, plausible_name, services_patterns};
use serde::Serialize;
use tracing::debug;

/// Which report a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Parts,
    Services,
}

impl Category {
    /// Column heading used in exports.
    pub fn label(self) -> &'static str {
        match self {
            Category::Parts => "Peças",
            Category::Services => "Serviços",
        }
    }
}

/// One (person, amount) pair pulled out of one line of page text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObservation {
    pub raw_name: String,
    /// Display name of the roster identity the raw name resolved to.
    pub identity: String,
    pub category: Category,
    pub amount_cents: i64,
    pub source_line: String,
}

/// Per-document tally of what happened to each non-blank line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub lines: usize,
    pub resolved: usize,
    /// No pattern shape matched.
    pub no_match: usize,
    /// A shape matched but the name is not on the roster.
    pub unresolved: usize,
    pub ambiguous: usize,
    pub amount_invalid: usize,
}

impl ExtractionStats {
    pub fn skipped(&self) -> usize {
        self.no_match + self.unresolved + self.ambiguous + self.amount_invalid
    }
}

#[derive(Debug)]
enum LineOutcome {
    Matched(RawObservation),
    NoMatch,
    Unresolved,
    Ambiguous,
    AmountInvalid(AmountError),
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub observations: Vec<RawObservation>,
    pub stats: ExtractionStats,
}

/// Runs a category's pattern chain over lines of page text.
pub struct LineExtractor<'r> {
    category: Category,
    patterns: &'static [LinePattern],
    resolver: &'r NameResolver,
}

impl<'r> LineExtractor<'r> {
    pub fn new(category: Category, resolver: &'r NameResolver) -> Self {
        let patterns = match category {
            Category::Parts => parts_patterns(),
            Category::Services => services_patterns(),
        };
        Self {
            category,
            patterns,
            resolver,
        }
    }

    pub fn extract<I, S>(&self, lines: I) -> Extraction
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Extraction::default();

        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            out.stats.lines += 1;

            match self.extract_line(line) {
                LineOutcome::Matched(obs) => {
                    out.stats.resolved += 1;
                    out.observations.push(obs);
                }
                LineOutcome::NoMatch => {
                    out.stats.no_match += 1;
                    debug!(category = ?self.category, line, "skip: no pattern");
                }
                LineOutcome::Unresolved => {
                    out.stats.unresolved += 1;
                    debug!(category = ?self.category, line, "skip: name not on roster");
                }
                LineOutcome::Ambiguous => {
                    out.stats.ambiguous += 1;
                    debug!(category = ?self.category, line, "skip: ambiguous name");
                }
                LineOutcome::AmountInvalid(e) => {
                    out.stats.amount_invalid += 1;
                    debug!(category = ?self.category, line, error = %e, "skip: bad amount");
                }
            }
        }

        out
    }

    /// First pattern whose name resolves and whose amount is positive wins.
    /// Otherwise the failure of the first pattern that fit the line is kept.
    fn extract_line(&self, line: &str) -> LineOutcome {
        let mut first_failure: Option<LineOutcome> = None;

        for pattern in self.patterns {
            let Some((name, amount)) = pattern.captures(line) else {
                continue;
            };

            let failure = if !plausible_name(name) {
                LineOutcome::Unresolved
            } else {
                match self.resolver.resolve(name) {
                    Resolution::Resolved(identity) => match parse_amount(amount) {
                        Ok(amount_cents) => {
                            debug!(pattern = pattern.label, "line matched");
                            return LineOutcome::Matched(RawObservation {
                                raw_name: name.to_string(),
                                identity: identity.name().to_string(),
                                category: self.category,
                                amount_cents,
                                source_line: line.to_string(),
                            });
                        }
                        Err(e) => LineOutcome::AmountInvalid(e),
                    },
                    Resolution::Ambiguous => LineOutcome::Ambiguous,
                    Resolution::Unresolved => LineOutcome::Unresolved,
                }
            };
            first_failure.get_or_insert(failure);
        }

        first_failure.unwrap_or(LineOutcome::NoMatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::registry;
    use std::sync::Arc;

    fn extract_parts<const N: usize>(r: &NameResolver, lines: [&str; N]) -> Extraction {
        LineExtractor::new(Category::Parts, r).extract(lines)
    }

    fn extract_services<const N: usize>(r: &NameResolver, lines: [&str; N]) -> Extraction {
        LineExtractor::new(Category::Services, r).extract(lines)
    }

    fn resolver() -> NameResolver {
        NameResolver::new(Arc::new(registry(&[
            "TIAGO FERNANDES DE LIMA",
            "ROSEANE CRUZ",
            "JOAO SILVA",
            "MARIA SILVA",
            "PEDRO SILVA",
        ])))
    }

    #[test]
    fn test_parts_line_with_rentability() {
        let r = resolver();
        let out = extract_parts(&r, ["TIAGO FERNANDES DE LIMA R$ 1.500,00 % 12,3"]);
        assert_eq!(out.observations.len(), 1);
        let obs = &out.observations[0];
        assert_eq!(obs.identity, "TIAGO FERNANDES DE LIMA");
        assert_eq!(obs.amount_cents, 150_000);
        assert_eq!(obs.category, Category::Parts);
        assert_eq!(out.stats.resolved, 1);
    }

    #[test]
    fn test_services_line_ignores_quantity() {
        let r = resolver();
        let out = extract_services(&r, ["Roseane Cruz 200,50 3"]);
        assert_eq!(out.observations.len(), 1);
        assert_eq!(out.observations[0].identity, "ROSEANE CRUZ");
        assert_eq!(out.observations[0].amount_cents, 20_050);
        assert_eq!(out.observations[0].raw_name, "Roseane Cruz");
    }

    #[test]
    fn test_one_observation_per_line() {
        // every parts pattern could claim this line; only the first may
        let r = resolver();
        let out = extract_parts(&r, ["ROSEANE CRUZ R$ 300,00 % 5,0"]);
        assert_eq!(out.observations.len(), 1);
        assert_eq!(out.observations[0].amount_cents, 30_000);
    }

    #[test]
    fn test_ambiguous_name_dropped() {
        let r = resolver();
        let out = extract_parts(&r, ["SILVA R$ 100,00"]);
        assert!(out.observations.is_empty());
        assert_eq!(out.stats.ambiguous, 1);
        assert_eq!(out.stats.skipped(), 1);
    }

    #[test]
    fn test_skip_reasons_counted() {
        let r = resolver();
        let lines = [
            "Relatório de Vendas por Consultor",
            "",
            "FULANO DE TAL R$ 50,00",
            "ROSEANE CRUZ R$ 0,00",
            "TIAGO FERNANDES DE LIMA R$ 10,00",
        ];
        let out = extract_parts(&r, lines);
        assert_eq!(out.stats.lines, 4);
        assert_eq!(out.stats.no_match, 1);
        assert_eq!(out.stats.unresolved, 1);
        assert_eq!(out.stats.amount_invalid, 1);
        assert_eq!(out.stats.resolved, 1);
        assert_eq!(out.stats.skipped(), 3);
    }

    #[test]
    fn test_percentage_not_taken_as_amount() {
        // zero sale: weaker patterns must not fall back to the rentability figure
        let r = resolver();
        let out = extract_parts(&r, ["ROSEANE CRUZ R$ 0,00 % 7"]);
        assert!(out.observations.is_empty());
        assert_eq!(out.stats.amount_invalid, 1);
    }

    #[test]
    fn test_header_row_not_a_person() {
        let r = resolver();
        let out = extract_services(&r, ["TOTAL 5.000,00 12"]);
        assert!(out.observations.is_empty());
        assert_eq!(out.stats.unresolved, 1);
    }
}
