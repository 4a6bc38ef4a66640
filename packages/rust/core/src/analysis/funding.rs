//! Free-text funding amount parsing and AUD conversion.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use grantscout_shared::NOT_FOUND;

static MILLIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$?\s*(\d+(?:\.\d+)?)\s*(?:million|mil\b|m\b)").expect("valid regex")
});

static THOUSANDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\$?\s*(\d+(?:\.\d+)?)\s*k\b").expect("valid regex"));

static DOLLARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*(\d+(?:\.\d+)?)").expect("valid regex"));

static STANDALONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d$.])(\d{5,})(?:[^\d]|$)").expect("valid regex"));

static CURRENCY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(USD|NZD|CAD|GBP|EUR|AUD)\b").expect("valid regex"));

static UP_TO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)up to").expect("valid regex"));
static TIERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)tier|stream|phase").expect("valid regex"));
static PER_ANNUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)per annum|per year|p\.a\.|annually").expect("valid regex")
});
static MULTI_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:over|for) \d+ years?").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Currency {
    Aud,
    Nzd,
    Usd,
    Cad,
    Gbp,
    Eur,
    Unknown,
}

impl Currency {
    const CODES: [Currency; 6] = [
        Self::Aud,
        Self::Nzd,
        Self::Usd,
        Self::Cad,
        Self::Gbp,
        Self::Eur,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aud => "AUD",
            Self::Nzd => "NZD",
            Self::Usd => "USD",
            Self::Cad => "CAD",
            Self::Gbp => "GBP",
            Self::Eur => "EUR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Fixed conversion rate to AUD. Unknown currencies convert 1:1.
    pub fn aud_rate(&self) -> f64 {
        match self {
            Self::Aud | Self::Unknown => 1.0,
            Self::Nzd => 0.91,
            Self::Usd => 1.52,
            Self::Cad => 1.09,
            Self::Gbp => 1.93,
            Self::Eur => 1.63,
        }
    }

    fn from_code(code: &str) -> Self {
        Self::CODES
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(code))
            .unwrap_or(Self::Unknown)
    }

    /// First currency marker found, checked USD, NZD, CAD, GBP, EUR, AUD in
    /// that order; a bare `$` means AUD.
    pub fn detect(text: &str) -> Self {
        let upper = text.to_uppercase();
        let codes: Vec<Self> = CURRENCY_CODE
            .captures_iter(text)
            .map(|caps| Self::from_code(&caps[1]))
            .collect();
        let has = |c: Self| codes.contains(&c);

        if has(Self::Usd) || upper.contains("US$") {
            Self::Usd
        } else if has(Self::Nzd) || upper.contains("NZ$") {
            Self::Nzd
        } else if has(Self::Cad) || upper.contains("CA$") {
            Self::Cad
        } else if has(Self::Gbp) || text.contains('£') {
            Self::Gbp
        } else if has(Self::Eur) || text.contains('€') {
            Self::Eur
        } else if has(Self::Aud) || upper.contains("A$") || text.contains('$') {
            Self::Aud
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
    Variable,
    Percentage,
    None,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Variable => "VARIABLE",
            Self::Percentage => "PERCENTAGE",
            Self::None => "NONE",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured reading of a "Funding Amount" value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingInfo {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub currency: Currency,
    /// `max` converted at the fixed rate.
    pub amount_aud: Option<f64>,
    pub confidence: Confidence,
    pub notes: String,
}

impl FundingInfo {
    fn without_amount(currency: Currency, confidence: Confidence, notes: &str) -> Self {
        Self {
            min: None,
            max: None,
            currency,
            amount_aud: None,
            confidence,
            notes: notes.to_string(),
        }
    }
}

/// Parse a funding description.
pub fn parse_funding(text: &str) -> FundingInfo {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case(NOT_FOUND) {
        return FundingInfo::without_amount(Currency::Unknown, Confidence::None, "Empty field");
    }

    let lower = text.to_lowercase();
    if ["variable", "varies", "not specified", "unspecified"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return FundingInfo::without_amount(
            Currency::Unknown,
            Confidence::Variable,
            "Variable or unspecified amount",
        );
    }

    if text.contains('%') && !DOLLARS.is_match(text) {
        return FundingInfo::without_amount(
            Currency::Unknown,
            Confidence::Percentage,
            "Percentage-based funding",
        );
    }

    let currency = Currency::detect(text);
    let numbers = extract_amounts(text);
    let (Some(&min), Some(&max)) = (numbers.first(), numbers.last()) else {
        return FundingInfo::without_amount(currency, Confidence::Low, "No numbers found");
    };

    let mut confidence = Confidence::High;
    let mut notes = Vec::new();

    if UP_TO.is_match(text) {
        notes.push("Up to amount".to_string());
    }
    if numbers.len() > 1 {
        notes.push(format!(
            "Range: {} - {}",
            format_thousands(min),
            format_thousands(max)
        ));
        confidence = Confidence::Medium;
    }
    if TIERED.is_match(text) {
        notes.push("Tiered/multi-stream funding".to_string());
        confidence = Confidence::Medium;
    }
    if PER_ANNUM.is_match(text) {
        notes.push("Per annum amount".to_string());
    }
    if MULTI_YEAR.is_match(text) {
        notes.push("Multi-year total".to_string());
    }
    let mut mentioned: Vec<Currency> = CURRENCY_CODE
        .captures_iter(text)
        .map(|caps| Currency::from_code(&caps[1]))
        .collect();
    mentioned.dedup();
    let mentioned = mentioned.len();
    if mentioned > 1 {
        notes.push("Multiple currencies mentioned".to_string());
        confidence = Confidence::Medium;
    }

    FundingInfo {
        min: Some(min),
        max: Some(max),
        currency,
        amount_aud: Some(max * currency.aud_rate()),
        confidence,
        notes: if notes.is_empty() {
            "Standard amount".to_string()
        } else {
            notes.join("; ")
        },
    }
}

/// Monetary amounts in the text, ascending and de-duplicated.
///
/// Recognises `X million` / `XM`, `XK`, `$X` of at least 1,000, and bare
/// numbers of five or more digits. Thousands separators are ignored.
pub fn extract_amounts(text: &str) -> Vec<f64> {
    let text = text.replace(',', "");
    let mut amounts: Vec<f64> = Vec::new();
    let mut push = |value: f64| {
        if !amounts.contains(&value) {
            amounts.push(value);
        }
    };

    for caps in MILLIONS.captures_iter(&text) {
        if let Ok(n) = caps[1].parse::<f64>() {
            push(n * 1_000_000.0);
        }
    }
    for caps in THOUSANDS.captures_iter(&text) {
        if let Ok(n) = caps[1].parse::<f64>() {
            push(n * 1_000.0);
        }
    }
    let scaled = MILLIONS.replace_all(&text, " ");
    let scaled = THOUSANDS.replace_all(&scaled, " ");
    for caps in DOLLARS.captures_iter(&scaled) {
        if let Ok(n) = caps[1].parse::<f64>() {
            if n >= 1_000.0 {
                push(n);
            }
        }
    }
    for caps in STANDALONE.captures_iter(&scaled) {
        if let Ok(n) = caps[1].parse::<f64>() {
            push(n);
        }
    }

    amounts.sort_by(f64::total_cmp);
    amounts
}

/// Whole-number rendering with comma thousands separators.
pub fn format_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_aud_amount() {
        let info = parse_funding("AUD $50,000");
        assert_eq!(info.min, Some(50_000.0));
        assert_eq!(info.max, Some(50_000.0));
        assert_eq!(info.currency, Currency::Aud);
        assert_eq!(info.amount_aud, Some(50_000.0));
        assert_eq!(info.confidence, Confidence::High);
        assert_eq!(info.notes, "Standard amount");
    }

    #[test]
    fn millions_and_ranges() {
        let info = parse_funding("Between $500K and $2.5 million over 3 years");
        assert_eq!(info.min, Some(500_000.0));
        assert_eq!(info.max, Some(2_500_000.0));
        assert_eq!(info.confidence, Confidence::Medium);
        assert_eq!(
            info.notes,
            "Range: 500,000 - 2,500,000; Multi-year total"
        );
    }

    #[test]
    fn foreign_currency_converts() {
        let info = parse_funding("Up to NZ$100,000 per annum");
        assert_eq!(info.currency, Currency::Nzd);
        assert_eq!(info.max, Some(100_000.0));
        let aud = info.amount_aud.unwrap();
        assert!((aud - 91_000.0).abs() < 0.01);
        assert_eq!(info.notes, "Up to amount; Per annum amount");
    }

    #[test]
    fn special_cases() {
        assert_eq!(parse_funding("").confidence, Confidence::None);
        assert_eq!(parse_funding("not found").confidence, Confidence::None);
        assert_eq!(parse_funding("Varies by project").confidence, Confidence::Variable);
        assert_eq!(parse_funding("50% of eligible costs").confidence, Confidence::Percentage);
        let low = parse_funding("Generous support available");
        assert_eq!(low.confidence, Confidence::Low);
        assert_eq!(low.max, None);
    }

    #[test]
    fn currency_codes_need_word_boundaries() {
        assert_eq!(Currency::detect("Academic fellowship, $80,000"), Currency::Aud);
        assert_eq!(Currency::detect("USD 25,000"), Currency::Usd);
        assert_eq!(Currency::detect("£40,000"), Currency::Gbp);
        assert_eq!(Currency::detect("No amount"), Currency::Unknown);

        let info = parse_funding("AUD 10,000 or USD 7,000");
        assert_eq!(info.confidence, Confidence::Medium);
        assert!(info.notes.contains("Multiple currencies mentioned"));
    }

    #[test]
    fn tiers_lower_confidence() {
        let info = parse_funding("Stream 1: $20,000");
        assert_eq!(info.confidence, Confidence::Medium);
        assert_eq!(info.max, Some(20_000.0));
    }

    #[test]
    fn small_numbers_are_not_amounts() {
        assert!(extract_amounts("Round 3 of 2025, up to 12 months").is_empty());
        assert_eq!(extract_amounts("Total pool 150000"), vec![150_000.0]);
    }

    #[test]
    fn thousands_formatting() {
        assert_eq!(format_thousands(0.0), "0");
        assert_eq!(format_thousands(999.0), "999");
        assert_eq!(format_thousands(1_000.0), "1,000");
        assert_eq!(format_thousands(2_500_000.4), "2,500,000");
        assert_eq!(format_thousands(152_000.0), "152,000");
    }
}
