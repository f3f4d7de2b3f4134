use regex::Regex;
use std::sync::LazyLock;

/// One line shape: a name followed by an amount, plus whatever the report
/// prints around them.
#[derive(Debug)]
pub struct LinePattern {
    pub label: &'static str,
    regex: Regex,
}

impl LinePattern {
    fn new(label: &'static str, pattern: &str) -> Self {
        Self {
            label,
            regex: Regex::new(pattern).expect("static line pattern"),
        }
    }

    /// Returns the raw `(name, amount)` captures when the line has this shape.
    pub fn captures<'t>(&self, line: &'t str) -> Option<(&'t str, &'t str)> {
        let caps = self.regex.captures(line)?;
        let name = caps.name("name")?.as_str().trim();
        let amount = caps.name("amount")?.as_str();
        Some((name, amount))
    }
}

// ---------------------------------------------------------------------------
// Pattern chains, most specific first
// ---------------------------------------------------------------------------

static PARTS: LazyLock<Vec<LinePattern>> = LazyLock::new(|| {
    vec![
        // "NAME R$ 1.500,00 % 12,3" (sale value + rentability, percentage dropped)
        LinePattern::new(
            "currency+percent",
            r"^(?P<name>.+?)\s+R\$\s*(?P<amount>\d[\d.,]*)\s*%\s*-?[\d.,]+",
        ),
        LinePattern::new("currency", r"^(?P<name>.+?)\s+R\$\s*(?P<amount>\d[\d.,]*)"),
        LinePattern::new("percent", r"^(?P<name>.+?)\s+(?P<amount>\d[\d.,]*)\s*%"),
        LinePattern::new("trailing-amount", r"^(?P<name>.+?)\s+(?P<amount>\d[\d.,]*)\s*$"),
    ]
});

static SERVICES: LazyLock<Vec<LinePattern>> = LazyLock::new(|| {
    vec![
        // "NAME 200,50 3" (amount + integer quantity, quantity dropped)
        LinePattern::new(
            "amount+quantity",
            r"^(?P<name>.+?)\s+(?:R\$\s*)?(?P<amount>\d[\d.,]*)\s+\d+\s*$",
        ),
        LinePattern::new(
            "trailing-amount",
            r"^(?P<name>.+?)\s+(?:R\$\s*)?(?P<amount>\d[\d.,]*)\s*$",
        ),
    ]
});

pub fn parts_patterns() -> &'static [LinePattern] {
    &PARTS
}

pub fn services_patterns() -> &'static [LinePattern] {
    &SERVICES
}

/// A name capture must look like a name, not like a currency or
/// percentage column swallowed by a weak pattern.
pub fn plausible_name(name: &str) -> bool {
    name.chars().any(char::is_alphabetic) && !name.contains("R$") && !name.contains('%')
}

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("malformed amount {0:?}")]
    Malformed(String),

    #[error("amount is not positive")]
    NotPositive,
}

/// Largest single amount accepted: R$ 10 trillion.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000_000;

/// Parse a Brazilian-formatted amount ("R$ 1.234,56") into centavos.
///
/// `.` is a thousands separator and `,` the decimal mark.
pub fn parse_amount(raw: &str) -> Result<i64, AmountError> {
    let cleaned: String = raw
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let malformed = || AmountError::Malformed(raw.trim().to_string());
    let value: f64 = cleaned.parse().map_err(|_| malformed())?;
    if !value.is_finite() {
        return Err(malformed());
    }

    if value <= 0.0 {
        return Err(AmountError::NotPositive);
    }
    // positive but below one centavo, or beyond any real report figure
    let cents = (value * 100.0).round();
    if cents < 1.0 || cents > MAX_AMOUNT_CENTS as f64 {
        return Err(malformed());
    }
    Ok(cents as i64)
}
