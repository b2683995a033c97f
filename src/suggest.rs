//! Suggestion merge/dedup and the end-to-end `generate` pass.
//!
//! Reconciles validated scoring proposals against the suggestion table. The
//! table holds at most one `pending` row per field path (database-enforced,
//! see the partial unique index), and a new proposal only overwrites a
//! pending row when its confidence is strictly greater — suggestion quality
//! is monotonic per path and repeated low-value re-scoring causes no churn.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::catalog;
use crate::config::Config;
use crate::scoring::{self, Proposal, ScoringOutcome};

/// An already-approved extractor, used by the existing-match heuristic.
#[derive(Debug, Clone)]
pub struct ApprovedExtractor {
    pub name: String,
    pub path: String,
}

/// Counts from merging one batch of proposals.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionMergeOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub failed: u64,
}

enum MergeProposalResult {
    Inserted,
    Updated,
    Unchanged,
}

/// Merge validated proposals into the suggestion table.
///
/// One conflict-targeted upsert per proposal: inserting a pending row, or —
/// when a pending row for the path already exists — overwriting its mutable
/// fields only if the new confidence is strictly greater. Terminal rows for
/// the same path are untouched audit history.
///
/// Per-proposal persistence failures are logged and counted, never fatal:
/// one bad row must not drop the rest of the batch.
pub async fn merge_proposals(
    pool: &SqlitePool,
    proposals: &[Proposal],
    approved: &[ApprovedExtractor],
    source_run_id: Option<&str>,
) -> SuggestionMergeOutcome {
    let mut outcome = SuggestionMergeOutcome::default();

    for proposal in proposals {
        match merge_proposal(pool, proposal, approved, source_run_id).await {
            Ok(MergeProposalResult::Inserted) => outcome.inserted += 1,
            Ok(MergeProposalResult::Updated) => outcome.updated += 1,
            Ok(MergeProposalResult::Unchanged) => outcome.unchanged += 1,
            Err(e) => {
                eprintln!(
                    "warning: failed to persist suggestion for '{}': {}",
                    proposal.field_path, e
                );
                outcome.failed += 1;
            }
        }
    }

    outcome
}

async fn merge_proposal(
    pool: &SqlitePool,
    proposal: &Proposal,
    approved: &[ApprovedExtractor],
    source_run_id: Option<&str>,
) -> Result<MergeProposalResult> {
    let existing_match =
        find_existing_match(&proposal.suggested_name, &proposal.field_path, approved);
    let now_ms = Utc::now().timestamp_millis();
    let new_id = Uuid::new_v4().to_string();

    // RETURNING id tells insert (our fresh id) and update (the stored row's
    // id) apart; no row at all means the confidence gate left it unchanged.
    let row = sqlx::query(
        r#"
        INSERT INTO extractor_suggestions
            (id, field_path, suggested_name, aggregation_type, conditions_json,
             description, confidence, is_new, existing_match, status,
             source_run_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)
        ON CONFLICT(field_path) WHERE status = 'pending' DO UPDATE SET
            suggested_name = excluded.suggested_name,
            aggregation_type = excluded.aggregation_type,
            conditions_json = excluded.conditions_json,
            description = excluded.description,
            confidence = excluded.confidence,
            updated_at = excluded.updated_at
        WHERE excluded.confidence > extractor_suggestions.confidence
        RETURNING id
        "#,
    )
    .bind(&new_id)
    .bind(&proposal.field_path)
    .bind(&proposal.suggested_name)
    .bind(proposal.aggregation_type.as_str())
    .bind(serde_json::to_string(&proposal.conditions)?)
    .bind(&proposal.description)
    .bind(proposal.confidence)
    .bind(existing_match.is_none())
    .bind(existing_match)
    .bind(source_run_id)
    .bind(now_ms)
    .bind(now_ms)
    .fetch_optional(pool)
    .await?;

    match row {
        None => Ok(MergeProposalResult::Unchanged),
        Some(row) => {
            let returned: String = row.get("id");
            if returned == new_id {
                Ok(MergeProposalResult::Inserted)
            } else {
                Ok(MergeProposalResult::Updated)
            }
        }
    }
}

/// Plain string-equality heuristic against already-approved extractors:
/// exact path match, or normalized-name match. Deliberately not a semantic
/// matcher.
pub fn find_existing_match(
    suggested_name: &str,
    field_path: &str,
    approved: &[ApprovedExtractor],
) -> Option<String> {
    let norm_name = normalize(suggested_name);
    approved
        .iter()
        .find(|a| a.path == field_path || normalize(&a.name) == norm_name)
        .map(|a| a.name.clone())
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Names and paths of every approved or modified suggestion, for the
/// existing-match heuristic.
pub async fn approved_extractors(pool: &SqlitePool) -> Result<Vec<ApprovedExtractor>> {
    let rows = sqlx::query(
        "SELECT suggested_name, field_path FROM extractor_suggestions \
         WHERE status IN ('approved', 'modified')",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ApprovedExtractor {
            name: row.get("suggested_name"),
            path: row.get("field_path"),
        })
        .collect())
}

/// Result of one `generate` pass.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSummary {
    pub fields_submitted: usize,
    pub suggestions_generated: usize,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Proposals that could not be persisted.
    pub failed: u64,
    /// Diagnostic when the scoring collaborator failed; the pass itself
    /// still succeeds with zero suggestions.
    pub failure: Option<String>,
}

/// One scoring pass end-to-end: select the batch, score it, merge the
/// validated proposals, and advance every submitted field to `reviewed`
/// whether or not scoring succeeded.
pub async fn run_generate(
    pool: &SqlitePool,
    cfg: &Config,
    min_frequency: Option<f64>,
    only_new: bool,
) -> Result<GenerateSummary> {
    let min_freq = min_frequency.unwrap_or(cfg.scoring.min_frequency);
    let fields =
        catalog::fields_for_scoring(pool, min_freq, only_new, cfg.scoring.batch_limit).await?;

    let mut summary = GenerateSummary {
        fields_submitted: fields.len(),
        ..Default::default()
    };
    if fields.is_empty() {
        return Ok(summary);
    }

    let source_run_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM discovery_runs ORDER BY created_at DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    let approved = approved_extractors(pool).await?;

    match scoring::score_fields(&cfg.scoring, &fields).await {
        ScoringOutcome::Scored(proposals) => {
            summary.suggestions_generated = proposals.len();
            let merged =
                merge_proposals(pool, &proposals, &approved, source_run_id.as_deref()).await;
            summary.inserted = merged.inserted;
            summary.updated = merged.updated;
            summary.unchanged = merged.unchanged;
            summary.failed = merged.failed;
        }
        ScoringOutcome::Failed(diagnostic) => {
            summary.failure = Some(diagnostic);
        }
    }

    let paths: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
    catalog::mark_fields_reviewed(pool, &paths).await?;

    Ok(summary)
}
