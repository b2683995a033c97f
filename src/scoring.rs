//! Scoring collaborator adapter.
//!
//! Submits a bounded batch of high-signal fields to an external
//! relevance-scoring collaborator and validates its response before anything
//! reaches the suggestion table. The collaborator's output is untrusted
//! structured input: unknown paths, out-of-range scores, unknown aggregation
//! types, and malformed conditions are dropped, not repaired.
//!
//! Every failure mode — network error, timeout, HTTP error, unparseable
//! body — collapses into [`ScoringOutcome::Failed`] with a diagnostic. The
//! adapter never returns `Err` and never aborts the surrounding run.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::config::ScoringConfig;
use crate::models::{AggregationType, FieldSubmission};

/// Tagged outcome of one scoring attempt.
#[derive(Debug)]
pub enum ScoringOutcome {
    /// Validated proposals, possibly empty.
    Scored(Vec<Proposal>),
    /// Diagnostic for why no proposals were produced.
    Failed(String),
}

/// One validated extractor proposal.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub field_path: String,
    pub relevance_score: f64,
    /// `relevance_score / 10`, the value persisted downstream.
    pub confidence: f64,
    pub suggested_name: String,
    pub aggregation_type: AggregationType,
    /// `"always"` or a predicate object.
    pub conditions: Value,
    pub description: String,
    pub category: Option<String>,
}

/// Score a batch of fields. Infallible by contract: collaborator trouble
/// becomes `Failed`, an empty batch becomes `Scored(vec![])`.
pub async fn score_fields(cfg: &ScoringConfig, fields: &[FieldSubmission]) -> ScoringOutcome {
    if fields.is_empty() {
        return ScoringOutcome::Scored(Vec::new());
    }

    match cfg.provider.as_str() {
        "openai" => match score_openai(cfg, fields).await {
            Ok(content) => ScoringOutcome::Scored(validate_proposals(&content, fields, cfg.min_score)),
            Err(e) => ScoringOutcome::Failed(e.to_string()),
        },
        "disabled" => ScoringOutcome::Failed("scoring provider is disabled".to_string()),
        other => ScoringOutcome::Failed(format!("unknown scoring provider: {}", other)),
    }
}

const SYSTEM_PROMPT: &str = "You score discovered data fields from campaign records for \
extraction-worthiness. For each input field, decide whether a reviewer should build an \
extractor for it. Respond with a JSON object of the form \
{\"suggestions\": [{\"fieldPath\": string, \"relevanceScore\": number 0-10, \
\"suggestedName\": snake_case string, \"aggregationType\": one of \
sum|avg|first|last|concat|unique|count, \"conditions\": \"always\" or a predicate object, \
\"description\": string, \"category\": string}]}. \
Only include fields with relevanceScore of 3 or higher. Only reference fieldPath values \
that appear in the input.";

/// Call the OpenAI chat completions API and return the assistant message
/// content parsed as JSON.
async fn score_openai(cfg: &ScoringConfig, fields: &[FieldSubmission]) -> Result<Value> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let model = cfg
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("scoring.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "temperature": 0,
        "response_format": { "type": "json_object" },
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": serde_json::to_string(fields)? },
        ],
    });

    let mut last_err = None;

    for attempt in 0..=cfg.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: Value = response.json().await?;
                    let content = json
                        .pointer("/choices/0/message/content")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            anyhow::anyhow!("scoring response missing message content")
                        })?;
                    return serde_json::from_str(content)
                        .map_err(|e| anyhow::anyhow!("scoring response is not valid JSON: {}", e));
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "scoring API error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("scoring API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("scoring failed after retries")))
}

/// Validate the collaborator's raw output against the submitted batch.
///
/// Dropped entirely: unknown field paths, scores outside [0, 10], scores
/// below `min_score`, unknown aggregation types, and conditions that are
/// neither `"always"` nor an object. Duplicate paths keep the
/// highest-scoring entry.
pub fn validate_proposals(
    content: &Value,
    submitted: &[FieldSubmission],
    min_score: f64,
) -> Vec<Proposal> {
    let submitted_paths: HashSet<&str> = submitted.iter().map(|f| f.path.as_str()).collect();

    let items = content
        .get("suggestions")
        .and_then(Value::as_array)
        .or_else(|| content.as_array());
    let Some(items) = items else {
        return Vec::new();
    };

    let mut by_path: BTreeMap<String, Proposal> = BTreeMap::new();

    for item in items {
        let Some(path) = item.get("fieldPath").and_then(Value::as_str) else {
            continue;
        };
        if !submitted_paths.contains(path) {
            continue;
        }
        let Some(score) = item.get("relevanceScore").and_then(Value::as_f64) else {
            continue;
        };
        if !(0.0..=10.0).contains(&score) || score < min_score {
            continue;
        }
        let Some(aggregation_type) = item
            .get("aggregationType")
            .and_then(Value::as_str)
            .and_then(AggregationType::parse)
        else {
            continue;
        };
        let conditions = match item.get("conditions") {
            None | Some(Value::Null) => Value::String("always".to_string()),
            Some(Value::String(s)) if s == "always" => Value::String("always".to_string()),
            Some(obj @ Value::Object(_)) => obj.clone(),
            Some(_) => continue,
        };

        let raw_name = item
            .get("suggestedName")
            .and_then(Value::as_str)
            .unwrap_or("");
        let proposal = Proposal {
            field_path: path.to_string(),
            relevance_score: score,
            confidence: score / 10.0,
            suggested_name: sanitize_name(raw_name, path),
            aggregation_type,
            conditions,
            description: item
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            category: item
                .get("category")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
        };

        match by_path.get(path) {
            Some(existing) if existing.relevance_score >= score => {}
            _ => {
                by_path.insert(path.to_string(), proposal);
            }
        }
    }

    by_path.into_values().collect()
}

/// Force a name into an identifier-safe snake_case form; fall back to a name
/// derived from the path when the collaborator supplied nothing usable.
pub fn sanitize_name(raw: &str, path: &str) -> String {
    let cleaned = snake_case(raw);
    if !cleaned.is_empty() {
        return ensure_leading_letter(cleaned);
    }
    ensure_leading_letter(snake_case(path))
}

fn snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_sep = true;
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}

fn ensure_leading_letter(name: String) -> String {
    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => name,
        Some(_) => format!("field_{}", name),
        None => "field".to_string(),
    }
}
