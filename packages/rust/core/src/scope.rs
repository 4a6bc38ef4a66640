//! Keyword relevance filter.

use tracing::debug;

use grantscout_shared::{GrantRecord, ScopeConfig};

/// Keeps grants whose text mentions any configured keyword.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    keywords: Vec<String>,
}

impl ScopeFilter {
    /// Keywords are lower-cased once; blanks are dropped.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn from_config(config: &ScopeConfig) -> Self {
        Self::new(&config.keywords)
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Substring match over name, purpose, eligibility and assessment.
    pub fn passes_scope(&self, grant: &GrantRecord) -> bool {
        let haystack = [
            grant.grant_name.as_str(),
            grant.grant_purpose.as_str(),
            grant.eligibility_criteria.as_str(),
            grant.assessment_criteria.as_str(),
        ]
        .join(" ")
        .to_lowercase();

        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }

    /// Drop out-of-scope grants, keeping order.
    pub fn filter(&self, grants: Vec<GrantRecord>) -> Vec<GrantRecord> {
        let before = grants.len();
        let kept: Vec<GrantRecord> = grants.into_iter().filter(|g| self.passes_scope(g)).collect();
        debug!(before, after = kept.len(), "scope filter applied");
        kept
    }
}
