//! Hashtag generation for browsing and reporting.

use std::collections::{BTreeMap, BTreeSet};

use grantscout_shared::{Complexity, GrantRecord};

/// Topic tags from name and purpose: `(needles, tag)`; any needle matches.
const TOPICS: &[(&[&str], &str)] = &[
    (&["research"], "#Research"),
    (&["health"], "#Health"),
    (&["medical"], "#Medical"),
    (&["innovation", "innovative"], "#Innovation"),
    (&["mrff"], "#MRFF"),
    (&["clinical"], "#Clinical"),
    (&["trial"], "#ClinicalTrials"),
    (&["stem cell"], "#StemCell"),
    (&["cardiovascular"], "#Cardiovascular"),
    (&["cancer"], "#Cancer"),
    (&["dementia", "ageing"], "#Dementia"),
    (&["diabetes"], "#Diabetes"),
    (&["artificial intelligence", "machine learning"], "#AI"),
];

/// Tags that need every needle present.
const COMPOUND_TOPICS: &[(&[&str], &str)] = &[
    (&["digital", "transform"], "#DigitalTransformation"),
    (&["workforce", "health"], "#HealthWorkforce"),
    (&["digital", "workforce", "health"], "#DigitalHealthWorkforce"),
    (&["digital", "health"], "#DigitalHealth"),
];

const NEW_ZEALAND: &[&str] = &[
    "new zealand",
    "mbie",
    "callaghan innovation",
    "ministry of business, innovation and employment",
    "tertiary education commission",
    "health research council",
];

const INTERNATIONAL: &[&str] = &[
    "gates foundation",
    "bill & melinda gates",
    "unesco",
    "chan zuckerberg",
    "wellcome trust",
    "open philanthropy",
    "global innovation fund",
    "grand challenges canada",
    "american australian association",
];

const AUSTRALIAN: &[&str] = &[
    "australian",
    "australia",
    "commonwealth",
    "federal",
    "nhmrc",
    "csiro",
    "austcyber",
    "mrff",
];

const COMMONWEALTH: &[&str] = &[
    "commonwealth",
    "federal",
    "australian government",
    "department of health",
    "nhmrc",
    "csiro",
    "mrff",
    "austcyber",
];

/// First match wins.
const STATES: &[(&[&str], &str)] = &[
    (&["nsw", "new south wales", "sydney"], "#NSW"),
    (&["victoria", "melbourne"], "#Victoria"),
    (&["queensland", "qld", "brisbane"], "#Queensland"),
    (&["western australia", "perth"], "#WesternAustralia"),
    (&["south australia", "adelaide"], "#SouthAustralia"),
    (&["tasmania", "hobart"], "#Tasmania"),
    (&["northern territory", "darwin"], "#NorthernTerritory"),
    (&["australian capital territory", "canberra"], "#ACT"),
];

/// Tags describing one grant.
pub fn generate_tags(grant: &GrantRecord) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    let text = format!("{} {}", grant.grant_name, grant.grant_purpose).to_lowercase();
    let body = grant.administering_body.to_lowercase();

    for (needles, tag) in TOPICS {
        if needles.iter().any(|n| text.contains(n)) {
            tags.insert(tag.to_string());
        }
    }
    for (needles, tag) in COMPOUND_TOPICS {
        if needles.iter().all(|n| text.contains(n)) {
            tags.insert(tag.to_string());
        }
    }

    tags.extend(geographic_tags(&body));

    if has_word(&body, "nhmrc") {
        tags.insert("#NHMRC".to_string());
    }
    if has_word(&body, "arc") || body.contains("australian research council") {
        tags.insert("#ARC".to_string());
    }

    if grant.level_of_complexity != Complexity::NotFound {
        tags.insert(format!("#{}", grant.level_of_complexity.as_str().replace([' ', '-'], "")));
    }

    tags
}

/// Location tags from the administering body (lower-cased).
fn geographic_tags(body: &str) -> Vec<String> {
    if NEW_ZEALAND.iter().any(|n| body.contains(n)) || has_word(body, "nz") {
        return vec!["#NewZealand".to_string()];
    }
    if INTERNATIONAL.iter().any(|n| body.contains(n)) {
        return vec!["#International".to_string()];
    }

    let australian = AUSTRALIAN.iter().any(|n| body.contains(n)) || has_word(body, "arc");
    if !australian {
        return Vec::new();
    }

    let mut tags = vec!["#Australia".to_string()];
    if COMMONWEALTH.iter().any(|n| body.contains(n)) || has_word(body, "arc") {
        tags.push("#Commonwealth".to_string());
    }
    if let Some((_, tag)) = STATES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| body.contains(n)))
    {
        tags.push(tag.to_string());
    }
    tags
}

/// Whole-word match for short acronyms ("arc" must not hit "research").
fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}

/// How many grants carry each tag.
pub fn tag_frequencies(grants: &[GrantRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for grant in grants {
        for tag in generate_tags(grant) {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }
    counts
}

/// Markdown table, most frequent first, ties alphabetical.
pub fn frequency_table(counts: &BTreeMap<String, usize>) -> String {
    let mut rows: Vec<(&String, &usize)> = counts.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut out = String::from("| Tag | Frequency |\n|-----|-----------|\n");
    for (tag, count) in rows {
        out.push_str(&format!("| {tag} | {count} |\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(name: &str, purpose: &str, body: &str, level: Complexity) -> GrantRecord {
        GrantRecord {
            grant_name: name.into(),
            grant_purpose: purpose.into(),
            administering_body: body.into(),
            level_of_complexity: level,
            ..GrantRecord::default()
        }
    }

    fn tags(g: &GrantRecord) -> Vec<String> {
        generate_tags(g).into_iter().collect()
    }

    #[test]
    fn topic_and_commonwealth_tags() {
        let g = grant(
            "MRFF Clinical Trials Activity",
            "Research into cancer treatments",
            "Australian Government Department of Health and Aged Care",
            Complexity::VeryComplex,
        );
        let t = tags(&g);
        for expected in [
            "#MRFF",
            "#Clinical",
            "#ClinicalTrials",
            "#Research",
            "#Cancer",
            "#Australia",
            "#Commonwealth",
            "#VeryComplex",
        ] {
            assert!(t.contains(&expected.to_string()), "missing {expected} in {t:?}");
        }
        assert!(!t.contains(&"#ARC".to_string()));
    }

    #[test]
    fn digital_health_compounds() {
        let g = grant(
            "Digital Health Workforce Program",
            "not found",
            "not found",
            Complexity::NotFound,
        );
        let t = tags(&g);
        assert!(t.contains(&"#DigitalHealth".to_string()));
        assert!(t.contains(&"#HealthWorkforce".to_string()));
        assert!(t.contains(&"#DigitalHealthWorkforce".to_string()));
        assert!(t.iter().all(|tag| !tag.starts_with("#not")));
    }

    #[test]
    fn new_zealand_short_circuits() {
        let g = grant("Explorer Grants", "x", "Health Research Council of New Zealand", Complexity::Low);
        let t = tags(&g);
        assert!(t.contains(&"#NewZealand".to_string()));
        assert!(!t.contains(&"#Australia".to_string()));
    }

    #[test]
    fn state_and_org_tags() {
        let g = grant("Discovery Projects", "x", "ARC, Canberra", Complexity::Complex);
        let t = tags(&g);
        assert!(t.contains(&"#ARC".to_string()));
        assert!(t.contains(&"#Australia".to_string()));
        assert!(t.contains(&"#ACT".to_string()));

        let g = grant("Medical Research Future", "x", "Queensland Health", Complexity::Moderate);
        assert!(!tags(&g).contains(&"#Queensland".to_string()));
        let g = grant("Research", "x", "Queensland Government, Australia", Complexity::Moderate);
        assert!(tags(&g).contains(&"#Queensland".to_string()));
    }

    #[test]
    fn frequencies_and_table() {
        let grants = vec![
            grant("Health Research", "x", "NHMRC", Complexity::Complex),
            grant("Health Services", "x", "Other", Complexity::Low),
        ];
        let counts = tag_frequencies(&grants);
        assert_eq!(counts["#Health"], 2);
        assert_eq!(counts["#Research"], 1);
        assert_eq!(counts["#NHMRC"], 1);

        let table = frequency_table(&counts);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "| Tag | Frequency |");
        assert_eq!(lines[2], "| #Health | 2 |");
    }
}
