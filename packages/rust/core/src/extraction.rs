//! Chunk-to-grants extraction through a [`CompletionModel`].

use serde_json::Value;
use tracing::{debug, instrument, warn};

use grantscout_shared::{
    Complexity, GrantField, GrantRecord, GrantScoutError, LlmConfig, Result, RetryPolicy,
    ValidationPolicy, is_retryable, retry,
};

use crate::llm::{CompletionModel, CompletionRequest};
use crate::prompt;

/// Extracts grant records from text chunks.
#[derive(Debug, Clone)]
pub struct Extractor<M> {
    model: M,
    retry: RetryPolicy,
    policy: ValidationPolicy,
    temperature: f32,
}

impl<M: CompletionModel> Extractor<M> {
    pub fn new(model: M, retry: RetryPolicy, policy: ValidationPolicy) -> Self {
        Self {
            model,
            retry,
            policy,
            temperature: 0.1,
        }
    }

    pub fn from_config(model: M, config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            ..Self::new(model, RetryPolicy::from_config(config), config.validation_policy)
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    /// Extract every grant in one chunk.
    ///
    /// Transport failures and malformed replies are retried under the
    /// configured [`RetryPolicy`]; the last error is returned once attempts
    /// run out.
    #[instrument(skip(self, chunk), fields(chars = chunk.chars().count()))]
    pub async fn extract(&self, chunk: &str, source_url: &str) -> Result<Vec<GrantRecord>> {
        let request = CompletionRequest {
            system: prompt::SYSTEM_INSTRUCTION.to_string(),
            user: prompt::user_message(source_url, chunk),
            schema: prompt::response_schema(),
            schema_name: "grant_extraction".to_string(),
            temperature: self.temperature,
        };

        let grants = retry(&self.retry, is_retryable, |attempt| {
            let request = &request;
            async move {
                debug!(attempt, "requesting extraction");
                let content = self.model.complete(request).await?;
                decode_grants(&content, source_url, self.policy)
            }
        })
        .await?;

        debug!(grants = grants.len(), "chunk extracted");
        Ok(grants)
    }
}

/// Decode a model reply into records.
///
/// The reply must be a JSON object whose `grants` key holds an array of
/// objects using only the schema's snake_case keys; anything else is a parse
/// error so the call is retried. Per-field problems follow `policy`. A
/// missing `web_link` is filled with `source_url`.
pub fn decode_grants(content: &str, source_url: &str, policy: ValidationPolicy) -> Result<Vec<GrantRecord>> {
    let doc: Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| GrantScoutError::parse(format!("reply is not JSON: {e}")))?;

    let entries = doc
        .get("grants")
        .and_then(Value::as_array)
        .ok_or_else(|| GrantScoutError::parse("reply has no 'grants' array"))?;

    let mut grants = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let object = entry
            .as_object()
            .ok_or_else(|| GrantScoutError::parse(format!("grants[{index}] is not an object")))?;
        if let Some(extra) = object
            .keys()
            .find(|key| GrantField::ALL.iter().all(|f| f.key() != key.as_str()))
        {
            return Err(GrantScoutError::parse(format!(
                "grants[{index}] has unexpected key '{extra}'"
            )));
        }

        match validate_entry(object, policy) {
            Ok(mut grant) => {
                if grant.is_missing(GrantField::WebLink) {
                    grant.web_link = source_url.to_string();
                }
                grants.push(grant);
            }
            Err(reason) => {
                warn!(index, reason = %reason, "discarding invalid grant entry");
            }
        }
    }
    Ok(grants)
}

/// Apply the validation policy to one entry. `Err` carries the reason the
/// entry was discarded.
fn validate_entry(
    object: &serde_json::Map<String, Value>,
    policy: ValidationPolicy,
) -> std::result::Result<GrantRecord, String> {
    let mut grant = GrantRecord::default();

    for field in GrantField::ALL {
        let text = match object.get(field.key()) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
            other => match policy {
                ValidationPolicy::Discard => {
                    return Err(match other {
                        None => format!("missing {}", field.key()),
                        Some(_) => format!("{} is not a non-empty string", field.key()),
                    });
                }
                ValidationPolicy::Coerce => continue,
            },
        };

        if field == GrantField::LevelOfComplexity {
            grant.level_of_complexity = match Complexity::parse(text) {
                Some(level) => level,
                None if policy == ValidationPolicy::Discard => {
                    return Err(format!("level_of_complexity '{text}' is not a category"));
                }
                None => Complexity::infer(text).unwrap_or_default(),
            };
            continue;
        }

        grant.set(field, text).map_err(|e| e.to_string())?;
    }

    Ok(grant)
}

/// Some models wrap JSON in a Markdown fence despite the schema.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
