//! Post-export analysis of a grants CSV: deadline and funding parsing,
//! complexity back-fill, and tags.

pub mod deadline;
pub mod funding;
pub mod tags;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, instrument};

use grantscout_artifacts::{read_grants_csv, write_table};
use grantscout_shared::{Complexity, GrantRecord, GrantScoutError, Result};

pub use deadline::{DeadlineInfo, DeadlineKind, DeadlineStatus, extract_dates, parse_deadline};
pub use funding::{Confidence, Currency, FundingInfo, extract_amounts, format_thousands, parse_funding};
pub use tags::{frequency_table, generate_tags, tag_frequencies};

/// Column order of the enriched CSV.
pub const ENRICHED_HEADERS: [&str; 23] = [
    "Grant Name",
    "Administering Body",
    "Grant Purpose",
    "Application Deadline",
    "Deadline Type",
    "Deadline Date",
    "Deadline Status",
    "Days Until Deadline",
    "Deadline Notes",
    "Expired",
    "Funding Amount",
    "Funding Min Amount",
    "Funding Max Amount",
    "Funding Currency",
    "Funding Amount (AUD)",
    "Parsing Confidence",
    "Parsing Notes",
    "Co-contribution Requirements",
    "Eligibility Criteria",
    "Assessment Criteria",
    "Application Complexity",
    "Web Link",
    "Level of Complexity",
];

/// A grant with its parsed deadline and funding.
#[derive(Debug, Clone)]
pub struct EnrichedGrant {
    pub grant: GrantRecord,
    pub deadline: DeadlineInfo,
    pub funding: FundingInfo,
}

impl EnrichedGrant {
    pub fn new(mut grant: GrantRecord, today: NaiveDate) -> Self {
        if grant.level_of_complexity == Complexity::NotFound {
            if let Some(level) = Complexity::infer(&grant.application_complexity) {
                grant.level_of_complexity = level;
            }
        }
        let deadline = parse_deadline(&grant.application_deadline, today);
        let funding = parse_funding(&grant.funding_amount);
        Self {
            grant,
            deadline,
            funding,
        }
    }

    /// Values in [`ENRICHED_HEADERS`] order.
    pub fn to_row(&self) -> Vec<String> {
        let g = &self.grant;
        let amount = |v: Option<f64>| v.map(format_thousands).unwrap_or_default();

        vec![
            g.grant_name.clone(),
            g.administering_body.clone(),
            g.grant_purpose.clone(),
            g.application_deadline.clone(),
            self.deadline.kind.to_string(),
            self.deadline.formatted_date(),
            self.deadline.status.to_string(),
            self.deadline
                .days_until
                .map(|d| d.to_string())
                .unwrap_or_default(),
            self.deadline.notes.clone(),
            if self.deadline.is_expired() { "Yes" } else { "No" }.to_string(),
            g.funding_amount.clone(),
            amount(self.funding.min),
            amount(self.funding.max),
            self.funding.currency.to_string(),
            amount(self.funding.amount_aud),
            self.funding.confidence.to_string(),
            self.funding.notes.clone(),
            g.co_contribution.clone(),
            g.eligibility_criteria.clone(),
            g.assessment_criteria.clone(),
            g.application_complexity.clone(),
            g.web_link.clone(),
            g.level_of_complexity.to_string(),
        ]
    }
}

/// Counts printed after `analyze`.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSummary {
    pub output: PathBuf,
    pub total: usize,
    pub expired: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_confidence: BTreeMap<String, usize>,
    /// Open grants with a parsed AUD amount, largest first.
    pub actionable: Vec<(String, f64)>,
}

/// `{stem}_parsed_complete.csv` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "grants".to_string());
    input.with_file_name(format!("{stem}_parsed_complete.csv"))
}

/// Read an exported CSV, enrich every row and write the result atomically.
#[instrument(skip_all, fields(input = %input.display()))]
pub fn analyze(input: &Path, output: Option<&Path>, today: NaiveDate) -> Result<AnalysisSummary> {
    let grants = read_grants_csv(input)?;
    if grants.is_empty() {
        return Err(GrantScoutError::validation(format!(
            "{} contains no grants",
            input.display()
        )));
    }

    let enriched: Vec<EnrichedGrant> = grants
        .into_iter()
        .map(|g| EnrichedGrant::new(g, today))
        .collect();

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));
    let rows: Vec<Vec<String>> = enriched.iter().map(EnrichedGrant::to_row).collect();
    write_table(&output, &ENRICHED_HEADERS, &rows)?;

    let summary = summarize(&enriched, output);
    info!(
        grants = summary.total,
        expired = summary.expired,
        output = %summary.output.display(),
        "analysis written"
    );
    Ok(summary)
}

fn summarize(enriched: &[EnrichedGrant], output: PathBuf) -> AnalysisSummary {
    let mut summary = AnalysisSummary {
        output,
        total: enriched.len(),
        ..AnalysisSummary::default()
    };

    for e in enriched {
        *summary
            .by_status
            .entry(e.deadline.status.to_string())
            .or_insert(0) += 1;
        *summary
            .by_confidence
            .entry(e.funding.confidence.to_string())
            .or_insert(0) += 1;
        if e.deadline.is_expired() {
            summary.expired += 1;
        }
        if let (true, Some(aud)) = (e.deadline.status.is_open(), e.funding.amount_aud) {
            summary.actionable.push((e.grant.grant_name.clone(), aud));
        }
    }
    summary
        .actionable
        .sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use grantscout_artifacts::grants_to_csv;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    fn sample() -> Vec<GrantRecord> {
        vec![
            GrantRecord {
                grant_name: "MRFF Cardiovascular Health".into(),
                administering_body: "Department of Health".into(),
                application_deadline: "15 August 2025".into(),
                funding_amount: "Up to $2 million".into(),
                application_complexity: "High, multi-stage review".into(),
                ..GrantRecord::default()
            },
            GrantRecord {
                grant_name: "Old Round".into(),
                application_deadline: "Closed".into(),
                funding_amount: "$50,000".into(),
                level_of_complexity: Complexity::Low,
                ..GrantRecord::default()
            },
        ]
    }

    #[test]
    fn enriched_row_matches_headers() {
        let e = EnrichedGrant::new(sample().remove(0), today());
        let row = e.to_row();
        assert_eq!(row.len(), ENRICHED_HEADERS.len());

        let col = |name: &str| {
            let idx = ENRICHED_HEADERS.iter().position(|h| *h == name).unwrap();
            row[idx].clone()
        };
        assert_eq!(col("Deadline Type"), "SPECIFIC");
        assert_eq!(col("Deadline Date"), "2025-08-15");
        assert_eq!(col("Deadline Status"), "SOON");
        assert_eq!(col("Days Until Deadline"), "45");
        assert_eq!(col("Expired"), "No");
        assert_eq!(col("Funding Max Amount"), "2,000,000");
        assert_eq!(col("Funding Currency"), "AUD");
        assert_eq!(col("Parsing Confidence"), "HIGH");
        // Back-filled from the narrative.
        assert_eq!(col("Level of Complexity"), "Complex");
        assert_eq!(col("Co-contribution Requirements"), "not found");
    }

    #[test]
    fn analyze_writes_parsed_complete_csv() {
        let dir = std::env::temp_dir().join(format!("gs-analyze-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("grants_20250701_120000.csv");
        std::fs::write(&input, grants_to_csv(&sample()).unwrap()).unwrap();

        let summary = analyze(&input, None, today()).unwrap();
        assert_eq!(summary.output, dir.join("grants_20250701_120000_parsed_complete.csv"));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.by_status["SOON"], 1);
        assert_eq!(summary.by_status["CLOSED"], 1);
        assert_eq!(summary.actionable.len(), 1);
        assert_eq!(summary.actionable[0].0, "MRFF Cardiovascular Health");

        let written = std::fs::read_to_string(&summary.output).unwrap();
        let header = written.lines().next().unwrap();
        assert!(header.starts_with("Grant Name,Administering Body,Grant Purpose,Application Deadline,Deadline Type"));
        assert!(written.contains("Yes"));

        // The base columns still read back as grants.
        let again = read_grants_csv(&summary.output).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(again[1].grant_name, "Old Round");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_csv_is_rejected() {
        let dir = std::env::temp_dir().join(format!("gs-analyze-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("empty.csv");
        std::fs::write(&input, grants_to_csv(&[]).unwrap()).unwrap();
        assert!(analyze(&input, None, today()).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
