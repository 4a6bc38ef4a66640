//! Mapping feed entries onto the grant schema.

use std::collections::BTreeMap;

use serde_json::Value;

use grantscout_shared::{Complexity, GrantField, GrantRecord, GrantScoutError, Result};

/// Keys tried, in order, for a field the feed config does not map.
fn fallback_keys(field: GrantField) -> &'static [&'static str] {
    match field {
        GrantField::GrantName => &["grant_name", "title", "name"],
        GrantField::AdministeringBody => &[
            "administering_body",
            "agency",
            "organisation",
            "organization",
            "funder",
        ],
        GrantField::GrantPurpose => &["purpose", "description", "summary"],
        GrantField::ApplicationDeadline => &["deadline", "close_date", "closing_date", "closes"],
        GrantField::FundingAmount => &["funding_amount", "amount", "funding", "value"],
        GrantField::CoContribution => &["co_contribution"],
        GrantField::EligibilityCriteria => &["eligibility", "eligibility_criteria"],
        GrantField::AssessmentCriteria => &["assessment_criteria", "assessment"],
        GrantField::ApplicationComplexity => &["application_complexity"],
        GrantField::WebLink => &["web_link", "url", "link"],
        GrantField::LevelOfComplexity => &["level_of_complexity", "complexity"],
    }
}

/// Per-feed mapping from entry keys (or JSON pointers) to grant fields.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    explicit: BTreeMap<&'static str, String>,
    default_body: Option<String>,
}

impl FieldMap {
    /// Build from config. Keys are grant field names (`grant_name` or
    /// `Grant Name`); values are entry keys or JSON pointers (`/a/b`).
    pub fn from_config(
        map: &BTreeMap<String, String>,
        default_body: Option<String>,
    ) -> Result<Self> {
        let mut explicit = BTreeMap::new();
        for (name, source) in map {
            let field = GrantField::from_name(name).ok_or_else(|| {
                GrantScoutError::config(format!("field_map: unknown grant field '{name}'"))
            })?;
            explicit.insert(field.key(), source.clone());
        }
        Ok(Self {
            explicit,
            default_body,
        })
    }

    /// Map one entry. Anything not found becomes "not found".
    pub fn apply(&self, entry: &Value) -> GrantRecord {
        let mut record = GrantRecord::default();

        for field in GrantField::ALL {
            let Some(value) = self.lookup(entry, field) else {
                continue;
            };

            if field == GrantField::LevelOfComplexity {
                record.level_of_complexity = Complexity::parse(&value)
                    .or_else(|| Complexity::infer(&value))
                    .unwrap_or_default();
            } else {
                // Text fields never fail to set.
                let _ = record.set(field, &value);
            }
        }

        if record.is_missing(GrantField::AdministeringBody) {
            if let Some(body) = &self.default_body {
                record.administering_body = body.clone();
            }
        }
        record
    }

    fn lookup(&self, entry: &Value, field: GrantField) -> Option<String> {
        match self.explicit.get(field.key()) {
            Some(source) => value_text(entry, source),
            None => fallback_keys(field)
                .iter()
                .find_map(|key| value_text(entry, key)),
        }
    }
}

/// Read `source` (a key or a JSON pointer) from an entry as plain text.
///
/// Strings are stripped of markup; numbers and booleans are formatted;
/// arrays of scalars are joined with "; ". Empty results are `None`.
pub fn value_text(entry: &Value, source: &str) -> Option<String> {
    let value = if source.starts_with('/') {
        entry.pointer(source)?
    } else {
        entry.get(source)?
    };

    let text = match value {
        Value::String(s) => grantscout_text::plain_text(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(grantscout_text::plain_text(s)),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Value::Null | Value::Object(_) => return None,
    };

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Whether an entry passes the feed's allow-list.
///
/// An empty allow-list or an unset filter field accepts everything. For an
/// array-valued field, any element may match. Matching ignores case.
pub fn passes_allow(entry: &Value, filter_field: Option<&str>, allow: &[String]) -> bool {
    let Some(field) = filter_field else {
        return true;
    };
    if allow.is_empty() {
        return true;
    }

    let value = if field.starts_with('/') {
        entry.pointer(field)
    } else {
        entry.get(field)
    };

    let matches = |s: &str| allow.iter().any(|a| a.trim().eq_ignore_ascii_case(s.trim()));
    match value {
        Some(Value::String(s)) => matches(s),
        Some(Value::Number(n)) => matches(&n.to_string()),
        Some(Value::Array(items)) => items.iter().any(|item| match item {
            Value::String(s) => matches(s),
            Value::Number(n) => matches(&n.to_string()),
            _ => false,
        }),
        _ => false,
    }
}
