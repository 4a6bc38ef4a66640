//! Free-text application deadline parsing.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::Serialize;

use grantscout_shared::NOT_FOUND;

const MONTH: &str = "(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)";

/// `23 July 2025`, `23 July, 2025`, `23 Jul 2025`
static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(\d{{1,2}})\s+{MONTH}\.?,?\s+(\d{{4}})\b")).expect("valid regex")
});

/// `July 23, 2025`
static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b{MONTH}\.?\s+(\d{{1,2}}),?\s+(\d{{4}})\b")).expect("valid regex")
});

/// `2-Jul-25`
static DASHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})-([A-Za-z]{3})-(\d{2})\b").expect("valid regex"));

/// `23/07/2025`, day first.
static SLASHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid regex"));

/// `2025-07-23`
static ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid regex"));

static ROUND_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)round\s+(\d+)").expect("valid regex"));

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d{1,2}[:.]\d{2}\s*(am|pm|aest|aedt|acst|awst|nzst|nzdt)").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DeadlineKind {
    Specific,
    Rolling,
    Annual,
    Closed,
    Tba,
    Multiple,
    NextRound,
    Other,
    Unknown,
}

impl DeadlineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specific => "SPECIFIC",
            Self::Rolling => "ROLLING",
            Self::Annual => "ANNUAL",
            Self::Closed => "CLOSED",
            Self::Tba => "TBA",
            Self::Multiple => "MULTIPLE",
            Self::NextRound => "NEXT_ROUND",
            Self::Other => "OTHER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeadlineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DeadlineStatus {
    Urgent,
    Soon,
    Upcoming,
    Ongoing,
    Past,
    Closed,
    Tba,
    Unknown,
}

impl DeadlineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "URGENT",
            Self::Soon => "SOON",
            Self::Upcoming => "UPCOMING",
            Self::Ongoing => "ONGOING",
            Self::Past => "PAST",
            Self::Closed => "CLOSED",
            Self::Tba => "TBA",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Applications can still be submitted.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Urgent | Self::Soon | Self::Upcoming | Self::Ongoing)
    }
}

impl fmt::Display for DeadlineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured reading of an "Application Deadline" value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadlineInfo {
    pub kind: DeadlineKind,
    pub primary_date: Option<NaiveDate>,
    pub secondary_date: Option<NaiveDate>,
    pub status: DeadlineStatus,
    /// Days from the reference date; absent for past or closed deadlines.
    pub days_until: Option<i64>,
    pub notes: String,
}

impl DeadlineInfo {
    /// `2025-07-23` or `2025-07-23 to 2025-08-30`; empty without a date.
    pub fn formatted_date(&self) -> String {
        match (self.primary_date, self.secondary_date) {
            (Some(first), Some(second)) => format!("{first} to {second}"),
            (Some(first), None) => first.to_string(),
            _ => String::new(),
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.status, DeadlineStatus::Past | DeadlineStatus::Closed)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Classify a deadline and date it relative to `today`.
pub fn parse_deadline(text: &str, today: NaiveDate) -> DeadlineInfo {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case(NOT_FOUND) {
        return DeadlineInfo {
            kind: DeadlineKind::Unknown,
            primary_date: None,
            secondary_date: None,
            status: DeadlineStatus::Unknown,
            days_until: None,
            notes: "No deadline information".to_string(),
        };
    }

    let dates = extract_dates(text);
    let kind = classify(text, !dates.is_empty());
    let primary_date = dates.first().copied();
    let secondary_date = dates.get(1).copied();
    let status = status_for(kind, primary_date, today);

    let days_until = match (primary_date, status) {
        (_, DeadlineStatus::Past | DeadlineStatus::Closed) => None,
        (Some(date), _) => Some((date - today).num_days()),
        (None, _) => None,
    };

    DeadlineInfo {
        kind,
        primary_date,
        secondary_date,
        status,
        days_until,
        notes: notes_for(text, kind),
    }
}

/// Every recognisable date in the text, sorted and de-duplicated.
pub fn extract_dates(text: &str) -> Vec<NaiveDate> {
    let mut dates = BTreeSet::new();

    for caps in DAY_MONTH_YEAR.captures_iter(text) {
        if let Some(date) = ymd(&caps[3], month_number(&caps[2]), &caps[1]) {
            dates.insert(date);
        }
    }
    for caps in MONTH_DAY_YEAR.captures_iter(text) {
        if let Some(date) = ymd(&caps[3], month_number(&caps[1]), &caps[2]) {
            dates.insert(date);
        }
    }
    for caps in DASHED.captures_iter(text) {
        let year = format!("20{}", &caps[3]);
        if let Some(date) = ymd(&year, month_number(&caps[2]), &caps[1]) {
            dates.insert(date);
        }
    }
    for caps in SLASHED.captures_iter(text) {
        if let Some(date) = ymd(&caps[3], caps[2].parse().ok(), &caps[1]) {
            dates.insert(date);
        }
    }
    for caps in ISO.captures_iter(text) {
        if let Some(date) = ymd(&caps[1], caps[2].parse().ok(), &caps[3]) {
            dates.insert(date);
        }
    }

    dates.into_iter().collect()
}

fn ymd(year: &str, month: Option<u32>, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month?, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn classify(text: &str, has_date: bool) -> DeadlineKind {
    let lower = text.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if any(&["ongoing", "continuous", "rolling"]) {
        DeadlineKind::Rolling
    } else if any(&["annual", "yearly"]) {
        DeadlineKind::Annual
    } else if any(&["closed", "completed", "allocated"]) {
        DeadlineKind::Closed
    } else if any(&["tbc", "tba", "to be announced", "expected", "anticipated"]) {
        DeadlineKind::Tba
    } else if any(&["various", "varies", "multiple", "specific calls"]) {
        DeadlineKind::Multiple
    } else if lower.contains("round") && lower.contains("next") {
        DeadlineKind::NextRound
    } else if has_date {
        DeadlineKind::Specific
    } else {
        DeadlineKind::Other
    }
}

fn status_for(kind: DeadlineKind, date: Option<NaiveDate>, today: NaiveDate) -> DeadlineStatus {
    match kind {
        DeadlineKind::Rolling | DeadlineKind::Annual | DeadlineKind::Multiple => {
            return DeadlineStatus::Ongoing;
        }
        DeadlineKind::Closed => return DeadlineStatus::Closed,
        DeadlineKind::Tba => return DeadlineStatus::Tba,
        _ => {}
    }

    match date {
        Some(date) if date < today => DeadlineStatus::Past,
        Some(date) if date < today + Duration::days(30) => DeadlineStatus::Urgent,
        Some(date) if date < today + Duration::days(90) => DeadlineStatus::Soon,
        Some(_) => DeadlineStatus::Upcoming,
        None => DeadlineStatus::Unknown,
    }
}

fn notes_for(text: &str, kind: DeadlineKind) -> String {
    let lower = text.to_lowercase();
    let mut notes = Vec::new();

    if lower.contains("minimum data") {
        notes.push("Multi-stage application".to_string());
    }
    if lower.contains("eoi") || lower.contains("expression of interest") {
        notes.push("EOI required".to_string());
    }
    if let Some(caps) = ROUND_NUMBER.captures(text) {
        notes.push(format!("Round {}", &caps[1]));
    }
    if CLOCK_TIME.is_match(text) {
        notes.push("Specific time deadline".to_string());
    }
    match kind {
        DeadlineKind::Rolling => notes.push("Applications accepted continuously".to_string()),
        DeadlineKind::Annual => notes.push("Annual application cycle".to_string()),
        DeadlineKind::Multiple => notes.push("Multiple deadlines throughout year".to_string()),
        _ => {}
    }

    if notes.is_empty() {
        "Standard deadline".to_string()
    } else {
        notes.join("; ")
    }
}
