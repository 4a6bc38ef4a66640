//! Duplicate removal across pages and feeds.

use std::collections::HashSet;
use std::fmt;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use grantscout_shared::GrantRecord;

/// Identity of a grant: name, administering body and deadline.
///
/// Each part is trimmed, internal whitespace runs collapse to one space and
/// the result is lower-cased. No Unicode normalisation is applied, so
/// "Café" and "Cafe\u{301}" stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    pub name: String,
    pub body: String,
    pub deadline: String,
}

impl DedupeKey {
    pub fn of(grant: &GrantRecord) -> Self {
        Self {
            name: normalize(&grant.grant_name),
            body: normalize(&grant.administering_body),
            deadline: normalize(&grant.application_deadline),
        }
    }

    /// Short stable digest for log correlation.
    pub fn hash_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.body.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.deadline.as_bytes());
        let digest = hasher.finalize();
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.name, self.body, self.deadline)
    }
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Keep the first record for each [`DedupeKey`], in input order.
pub fn dedupe(grants: Vec<GrantRecord>) -> Vec<GrantRecord> {
    let mut seen = HashSet::with_capacity(grants.len());
    let mut kept = Vec::with_capacity(grants.len());

    for grant in grants {
        let key = DedupeKey::of(&grant);
        if seen.contains(&key) {
            warn!(key = %key, hash_key = %key.hash_key(), "duplicate grant dropped");
            continue;
        }
        seen.insert(key);
        kept.push(grant);
    }

    debug!(kept = kept.len(), "dedupe complete");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(name: &str, body: &str, deadline: &str, purpose: &str) -> GrantRecord {
        GrantRecord {
            grant_name: name.into(),
            administering_body: body.into(),
            application_deadline: deadline.into(),
            grant_purpose: purpose.into(),
            ..GrantRecord::default()
        }
    }

    #[test]
    fn first_seen_wins() {
        let grants = vec![
            grant("Health Grant", "Dept of Health", "31 Mar 2025", "first purpose"),
            grant("Health Grant", "Dept of Health", "31 Mar 2025", "second purpose"),
        ];
        let out = dedupe(grants);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].grant_purpose, "first purpose");
    }

    #[test]
    fn normalisation_ignores_case_and_spacing() {
        let grants = vec![
            grant("Health  Grant ", "DEPT OF HEALTH", "31 Mar 2025", "a"),
            grant(" health grant", "Dept of\tHealth", "31  mar 2025", "b"),
            grant("Health Grant", "Dept of Health", "30 Jun 2025", "c"),
        ];
        let out = dedupe(grants);
        let purposes: Vec<&str> = out.iter().map(|g| g.grant_purpose.as_str()).collect();
        assert_eq!(purposes, vec!["a", "c"]);
    }

    #[test]
    fn output_keys_are_unique() {
        let grants: Vec<GrantRecord> = (0..20)
            .map(|i| grant(&format!("Grant {}", i % 7), "Body", "TBA", &i.to_string()))
            .collect();
        let out = dedupe(grants);
        let keys: HashSet<DedupeKey> = out.iter().map(DedupeKey::of).collect();
        assert_eq!(keys.len(), out.len());
        assert_eq!(out.len(), 7);
    }

    #[test]
    fn hash_key_is_stable_and_short() {
        let a = DedupeKey::of(&grant("X", "Y", "Z", ""));
        let b = DedupeKey::of(&grant(" x ", "y", "z", "other"));
        assert_eq!(a.hash_key(), b.hash_key());
        assert_eq!(a.hash_key().len(), 16);
    }
}
