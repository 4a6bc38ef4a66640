//! Extraction prompt and response schema.

use serde_json::{Map, Value, json};

use grantscout_shared::{Complexity, GrantField};

/// System instruction sent with every chunk.
pub const SYSTEM_INSTRUCTION: &str = "\
You extract grant and funding opportunities from web page text for a team \
that tracks funding in Australian and New Zealand healthcare, digital health, \
artificial intelligence, medical research, innovation, health workforce and \
education.

For every distinct grant in the text, return one object with these fields:
- grant_name: name or title of the grant, e.g. \"MRFF 2025 Cardiovascular Health Grant Opportunity (GO7554)\"
- administering_body: the organisation providing the grant
- grant_purpose: the stated purpose of the grant
- application_deadline: the deadline as written, e.g. \"1 September 2025 (5pm AEST)\"
- funding_amount: the amount as written, e.g. \"AUD $50,000\"
- co_contribution: free text on co-contribution requirements, \"none required\" or \"not specified\" when stated that way
- eligibility_criteria: who may apply
- assessment_criteria: how applications are assessed
- application_complexity: one sentence judging how hard the application is and why
- web_link: the grant's own URL if the text gives one
- level_of_complexity: exactly one of \"Low\", \"Moderate\", \"Complex\", \"Very Complex\", \"Varies\" or \"not found\"

Rules:
- Never make things up. If a field is not in the text, use \"not found\".
- Only application_complexity and level_of_complexity may use your own judgement.
- Use Australian English spelling.
- Do not use em-dashes or title case in free text.
- Return {\"grants\": []} when the text lists no grants.";

/// Per-chunk user message.
pub fn user_message(source_url: &str, chunk: &str) -> String {
    format!(
        "Source page: {source_url}\n\n\
         Extract every grant described in the page text below.\n\n\
         PAGE TEXT:\n{chunk}"
    )
}

/// Strict JSON schema for `response_format`.
///
/// Top level is `{ "grants": [ {11 string fields} ] }`; no extra
/// properties at either level.
pub fn response_schema() -> Value {
    let mut properties = Map::new();
    for field in GrantField::ALL {
        let schema = match field {
            GrantField::LevelOfComplexity => json!({
                "type": "string",
                "enum": Complexity::ALL.iter().map(Complexity::as_str).collect::<Vec<_>>(),
            }),
            _ => json!({ "type": "string" }),
        };
        properties.insert(field.key().to_string(), schema);
    }
    let required: Vec<&str> = GrantField::ALL.iter().map(GrantField::key).collect();

    json!({
        "type": "object",
        "properties": {
            "grants": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false,
                }
            }
        },
        "required": ["grants"],
        "additionalProperties": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_closed_and_lists_all_fields() {
        let schema = response_schema();
        assert_eq!(schema["additionalProperties"], false);
        let item = &schema["properties"]["grants"]["items"];
        assert_eq!(item["additionalProperties"], false);
        assert_eq!(item["required"].as_array().unwrap().len(), 11);
        assert!(item["properties"]["co_contribution"].is_object());
        let levels = item["properties"]["level_of_complexity"]["enum"].as_array().unwrap();
        assert!(levels.contains(&json!("Very Complex")));
        assert!(levels.contains(&json!("not found")));
    }

    #[test]
    fn user_message_embeds_url_and_chunk() {
        let msg = user_message("https://www.health.gov.au/grants", "MRFF round 3 opens");
        assert!(msg.contains("https://www.health.gov.au/grants"));
        assert!(msg.ends_with("MRFF round 3 opens"));
    }

    #[test]
    fn instruction_covers_rules() {
        assert!(SYSTEM_INSTRUCTION.contains("not found"));
        assert!(SYSTEM_INSTRUCTION.contains("Australian English"));
        assert!(SYSTEM_INSTRUCTION.contains("em-dashes"));
    }
}
