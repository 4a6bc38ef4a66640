//! Core domain types: grant records, crawled pages, seeds.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GrantScoutError, Result};

/// Placeholder for any grant field the source did not state.
pub const NOT_FOUND: &str = "not found";

fn not_found() -> String {
    NOT_FOUND.to_string()
}

/// Run timestamp used in export filenames and snapshot folders.
pub fn run_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

/// The "Level of Complexity" category. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Complexity {
    Low,
    Moderate,
    Complex,
    #[serde(rename = "Very Complex")]
    VeryComplex,
    Varies,
    #[default]
    #[serde(rename = "not found")]
    NotFound,
}

impl Complexity {
    pub const ALL: [Complexity; 6] = [
        Self::Low,
        Self::Moderate,
        Self::Complex,
        Self::VeryComplex,
        Self::Varies,
        Self::NotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::Complex => "Complex",
            Self::VeryComplex => "Very Complex",
            Self::Varies => "Varies",
            Self::NotFound => NOT_FOUND,
        }
    }

    /// Strict parse of an enumeration value.
    ///
    /// Case-insensitive; tolerates surrounding whitespace and a trailing
    /// comma or full stop (`"Very Complex,"`). Anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let cleaned = value
            .trim()
            .trim_end_matches([',', '.'])
            .trim()
            .to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().to_lowercase() == cleaned)
    }

    /// Map a free-text complexity narrative onto a category.
    ///
    /// Checks run most-specific first, so "moderate to complex" lands on
    /// `Complex` and "low to moderate" on `Moderate`.
    pub fn infer(narrative: &str) -> Option<Self> {
        let text = narrative.to_lowercase();
        if text.contains("very high") || text.contains("very complex") {
            Some(Self::VeryComplex)
        } else if text.contains("high") || text.contains("complex") {
            Some(Self::Complex)
        } else if text.contains("moderate") {
            Some(Self::Moderate)
        } else if text.contains("low") {
            Some(Self::Low)
        } else if text.contains("varies") || text.contains("variable") {
            Some(Self::Varies)
        } else {
            None
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = GrantScoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            GrantScoutError::validation(format!("unknown complexity category '{s}'"))
        })
    }
}

// ---------------------------------------------------------------------------
// GrantField
// ---------------------------------------------------------------------------

/// The eleven grant fields, in export column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantField {
    GrantName,
    AdministeringBody,
    GrantPurpose,
    ApplicationDeadline,
    FundingAmount,
    CoContribution,
    EligibilityCriteria,
    AssessmentCriteria,
    ApplicationComplexity,
    WebLink,
    LevelOfComplexity,
}

impl GrantField {
    pub const ALL: [GrantField; 11] = [
        Self::GrantName,
        Self::AdministeringBody,
        Self::GrantPurpose,
        Self::ApplicationDeadline,
        Self::FundingAmount,
        Self::CoContribution,
        Self::EligibilityCriteria,
        Self::AssessmentCriteria,
        Self::ApplicationComplexity,
        Self::WebLink,
        Self::LevelOfComplexity,
    ];

    /// CSV header and JSON object key.
    pub fn header(&self) -> &'static str {
        match self {
            Self::GrantName => "Grant Name",
            Self::AdministeringBody => "Administering Body",
            Self::GrantPurpose => "Grant Purpose",
            Self::ApplicationDeadline => "Application Deadline",
            Self::FundingAmount => "Funding Amount",
            Self::CoContribution => "Co-contribution Requirements",
            Self::EligibilityCriteria => "Eligibility Criteria",
            Self::AssessmentCriteria => "Assessment Criteria",
            Self::ApplicationComplexity => "Application Complexity",
            Self::WebLink => "Web Link",
            Self::LevelOfComplexity => "Level of Complexity",
        }
    }

    /// Snake-case name used in config field maps.
    pub fn key(&self) -> &'static str {
        match self {
            Self::GrantName => "grant_name",
            Self::AdministeringBody => "administering_body",
            Self::GrantPurpose => "grant_purpose",
            Self::ApplicationDeadline => "application_deadline",
            Self::FundingAmount => "funding_amount",
            Self::CoContribution => "co_contribution",
            Self::EligibilityCriteria => "eligibility_criteria",
            Self::AssessmentCriteria => "assessment_criteria",
            Self::ApplicationComplexity => "application_complexity",
            Self::WebLink => "web_link",
            Self::LevelOfComplexity => "level_of_complexity",
        }
    }

    /// Look up a field by header or snake-case key.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.key() == name || f.header().eq_ignore_ascii_case(name))
    }

    /// Header row for CSV export.
    pub fn headers() -> [&'static str; 11] {
        Self::ALL.map(|f| f.header())
    }
}

// ---------------------------------------------------------------------------
// GrantRecord
// ---------------------------------------------------------------------------

/// One grant opportunity in the fixed 11-field schema.
///
/// Every field is always present; missing information is [`NOT_FOUND`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    #[serde(rename = "Grant Name", default = "not_found")]
    pub grant_name: String,
    #[serde(rename = "Administering Body", default = "not_found")]
    pub administering_body: String,
    #[serde(rename = "Grant Purpose", default = "not_found")]
    pub grant_purpose: String,
    #[serde(rename = "Application Deadline", default = "not_found")]
    pub application_deadline: String,
    #[serde(rename = "Funding Amount", default = "not_found")]
    pub funding_amount: String,
    #[serde(rename = "Co-contribution Requirements", default = "not_found")]
    pub co_contribution: String,
    #[serde(rename = "Eligibility Criteria", default = "not_found")]
    pub eligibility_criteria: String,
    #[serde(rename = "Assessment Criteria", default = "not_found")]
    pub assessment_criteria: String,
    #[serde(rename = "Application Complexity", default = "not_found")]
    pub application_complexity: String,
    #[serde(rename = "Web Link", default = "not_found")]
    pub web_link: String,
    #[serde(rename = "Level of Complexity", default)]
    pub level_of_complexity: Complexity,
}

impl Default for GrantRecord {
    fn default() -> Self {
        Self {
            grant_name: not_found(),
            administering_body: not_found(),
            grant_purpose: not_found(),
            application_deadline: not_found(),
            funding_amount: not_found(),
            co_contribution: not_found(),
            eligibility_criteria: not_found(),
            assessment_criteria: not_found(),
            application_complexity: not_found(),
            web_link: not_found(),
            level_of_complexity: Complexity::NotFound,
        }
    }
}

impl GrantRecord {
    /// Read a field as text.
    pub fn get(&self, field: GrantField) -> &str {
        match field {
            GrantField::GrantName => &self.grant_name,
            GrantField::AdministeringBody => &self.administering_body,
            GrantField::GrantPurpose => &self.grant_purpose,
            GrantField::ApplicationDeadline => &self.application_deadline,
            GrantField::FundingAmount => &self.funding_amount,
            GrantField::CoContribution => &self.co_contribution,
            GrantField::EligibilityCriteria => &self.eligibility_criteria,
            GrantField::AssessmentCriteria => &self.assessment_criteria,
            GrantField::ApplicationComplexity => &self.application_complexity,
            GrantField::WebLink => &self.web_link,
            GrantField::LevelOfComplexity => self.level_of_complexity.as_str(),
        }
    }

    /// Set a text field. Blank input stores [`NOT_FOUND`].
    ///
    /// For [`GrantField::LevelOfComplexity`] the value must parse as a
    /// [`Complexity`]; otherwise a validation error is returned and the
    /// record is unchanged.
    pub fn set(&mut self, field: GrantField, value: &str) -> Result<()> {
        let value = value.trim();
        let text = if value.is_empty() {
            not_found()
        } else {
            value.to_string()
        };

        let slot = match field {
            GrantField::GrantName => &mut self.grant_name,
            GrantField::AdministeringBody => &mut self.administering_body,
            GrantField::GrantPurpose => &mut self.grant_purpose,
            GrantField::ApplicationDeadline => &mut self.application_deadline,
            GrantField::FundingAmount => &mut self.funding_amount,
            GrantField::CoContribution => &mut self.co_contribution,
            GrantField::EligibilityCriteria => &mut self.eligibility_criteria,
            GrantField::AssessmentCriteria => &mut self.assessment_criteria,
            GrantField::ApplicationComplexity => &mut self.application_complexity,
            GrantField::WebLink => &mut self.web_link,
            GrantField::LevelOfComplexity => {
                self.level_of_complexity = if value.is_empty() {
                    Complexity::NotFound
                } else {
                    value.parse()?
                };
                return Ok(());
            }
        };
        *slot = text;
        Ok(())
    }

    /// Whether a field holds the placeholder.
    pub fn is_missing(&self, field: GrantField) -> bool {
        self.get(field).eq_ignore_ascii_case(NOT_FOUND)
    }

    /// Field values in export column order.
    pub fn to_row(&self) -> [&str; 11] {
        GrantField::ALL.map(|f| self.get(f))
    }
}

// ---------------------------------------------------------------------------
// PageRecord
// ---------------------------------------------------------------------------

/// A crawled page after text cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Normalised page URL; always on the seed's host.
    pub url: String,
    /// Link distance from the seed (seed = 0).
    pub depth: u32,
    pub title: String,
    pub text: String,
    /// Set when the static HTML looked empty or script-gated.
    #[serde(default)]
    pub needs_richer_render: bool,
}

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

/// Seed URLs plus optional per-run crawl overrides.
#[derive(Debug, Clone, Default)]
pub struct SeedConfig {
    pub seeds: Vec<Url>,
    pub max_depth: Option<u32>,
    pub max_pages_per_seed: Option<usize>,
}

impl SeedConfig {
    /// Load seeds from a seed list file with no overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self {
            seeds: load_seed_file(path)?,
            ..Default::default()
        })
    }
}

/// Read and parse a seed list file.
pub fn load_seed_file(path: &Path) -> Result<Vec<Url>> {
    let content = std::fs::read_to_string(path).map_err(|e| GrantScoutError::io(path, e))?;
    parse_seed_list(&content)
}

/// Parse a line-oriented seed list.
///
/// Blank lines and lines starting with `#` are ignored. Every other line
/// must be an absolute http(s) URL; the first bad line is a config error.
/// Exact duplicates are dropped, first occurrence wins.
pub fn parse_seed_list(content: &str) -> Result<Vec<Url>> {
    let mut seeds: Vec<Url> = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let url = Url::parse(line).map_err(|e| {
            GrantScoutError::config(format!("seed line {}: invalid URL '{line}': {e}", idx + 1))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(GrantScoutError::config(format!(
                "seed line {}: unsupported scheme '{}'",
                idx + 1,
                url.scheme()
            )));
        }

        if seeds.contains(&url) {
            tracing::debug!(%url, "duplicate seed ignored");
            continue;
        }
        seeds.push(url);
    }

    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_is_all_not_found() {
        let record = GrantRecord::default();
        for field in GrantField::ALL {
            assert_eq!(record.get(field), NOT_FOUND, "{field:?}");
        }
    }

    #[test]
    fn record_serializes_with_header_keys_in_order() {
        let mut record = GrantRecord::default();
        record.grant_name = "X Fund".into();
        record.level_of_complexity = Complexity::VeryComplex;

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.starts_with(r#"{"Grant Name":"X Fund","Administering Body""#));
        assert!(json.ends_with(r#""Level of Complexity":"Very Complex"}"#));
    }

    #[test]
    fn record_deserializes_missing_keys_as_not_found() {
        let record: GrantRecord = serde_json::from_str(r#"{"Grant Name":"Only Name"}"#).unwrap();
        assert_eq!(record.grant_name, "Only Name");
        assert_eq!(record.co_contribution, NOT_FOUND);
        assert_eq!(record.level_of_complexity, Complexity::NotFound);
    }

    #[test]
    fn set_blank_becomes_not_found() {
        let mut record = GrantRecord::default();
        record.set(GrantField::FundingAmount, "  AUD $50,000 ").unwrap();
        assert_eq!(record.funding_amount, "AUD $50,000");
        record.set(GrantField::FundingAmount, "   ").unwrap();
        assert_eq!(record.funding_amount, NOT_FOUND);
    }

    #[test]
    fn set_complexity_rejects_unknown_value() {
        let mut record = GrantRecord::default();
        assert!(record.set(GrantField::LevelOfComplexity, "Extreme").is_err());
        assert_eq!(record.level_of_complexity, Complexity::NotFound);

        record.set(GrantField::LevelOfComplexity, "moderate").unwrap();
        assert_eq!(record.level_of_complexity, Complexity::Moderate);
    }

    #[test]
    fn complexity_parse_tolerates_trailing_comma() {
        assert_eq!(Complexity::parse("Very Complex,"), Some(Complexity::VeryComplex));
        assert_eq!(Complexity::parse(" not found "), Some(Complexity::NotFound));
        assert_eq!(Complexity::parse("Hard"), None);
    }

    #[test]
    fn complexity_infer_from_narrative() {
        assert_eq!(
            Complexity::infer("Very high - national competitive round"),
            Some(Complexity::VeryComplex)
        );
        assert_eq!(
            Complexity::infer("Moderate to complex, requires budget"),
            Some(Complexity::Complex)
        );
        assert_eq!(
            Complexity::infer("Low to moderate effort"),
            Some(Complexity::Moderate)
        );
        assert_eq!(Complexity::infer("Low - short form"), Some(Complexity::Low));
        assert_eq!(Complexity::infer("Varies by stream"), Some(Complexity::Varies));
        assert_eq!(Complexity::infer("unclear"), None);
    }

    #[test]
    fn field_lookup_by_header_or_key() {
        assert_eq!(GrantField::from_name("web_link"), Some(GrantField::WebLink));
        assert_eq!(
            GrantField::from_name("co-contribution requirements"),
            Some(GrantField::CoContribution)
        );
        assert_eq!(GrantField::from_name("Expired"), None);
    }

    #[test]
    fn seed_list_skips_comments_and_blanks() {
        let content = "# seeds\n\nhttps://www.health.gov.au/grants\n  \nhttps://www.arc.gov.au/funding\n# trailing\n";
        let seeds = parse_seed_list(content).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].host_str(), Some("www.health.gov.au"));
    }

    #[test]
    fn seed_list_reports_bad_line_number() {
        let err = parse_seed_list("https://ok.example.com\nnot a url\n").unwrap_err();
        assert!(err.to_string().contains("seed line 2"));

        let err = parse_seed_list("ftp://files.example.com/\n").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn seed_list_drops_duplicates() {
        let seeds = parse_seed_list("https://a.example.com/\nhttps://a.example.com/\n").unwrap();
        assert_eq!(seeds.len(), 1);
    }

    #[test]
    fn run_timestamp_format() {
        let at = DateTime::parse_from_rfc3339("2025-07-01T09:05:03Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(run_timestamp(&at), "20250701_090503");
    }
}
