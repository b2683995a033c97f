//! Suggestion review lifecycle.
//!
//! State machine over `ExtractorSuggestion.status`: `pending` →
//! `approved` | `rejected` | `modified`, all terminal. Every transition is a
//! single conditional `UPDATE ... WHERE status = 'pending'`, so two
//! concurrent reviewers racing on the same row resolve to exactly one winner;
//! the loser gets an "already resolved" error. Bulk approval is one filtered
//! set-based update for the same reason.
//!
//! Acting on an already-terminal suggestion is an error, distinct from
//! acting on an unknown id.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::models::{AggregationType, ExtractorSuggestion, SuggestionStatus};

/// Reviewer-supplied overrides applied during approval. Any override turns
/// the terminal status into `modified` instead of `approved`.
#[derive(Debug, Default, Clone)]
pub struct Modifications {
    pub suggested_name: Option<String>,
    pub aggregation_type: Option<AggregationType>,
    pub conditions: Option<Value>,
    pub description: Option<String>,
}

impl Modifications {
    pub fn is_empty(&self) -> bool {
        self.suggested_name.is_none()
            && self.aggregation_type.is_none()
            && self.conditions.is_none()
            && self.description.is_none()
    }
}

#[derive(Debug, Default, Clone)]
pub struct SuggestionFilter {
    pub status: Option<SuggestionStatus>,
    pub min_confidence: Option<f64>,
    pub limit: Option<i64>,
}

/// Result of a bulk approval.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkApproveOutcome {
    pub approved: u64,
    /// Pending rows at the time of the call, informational.
    pub total_considered: i64,
}

pub async fn approve(
    pool: &SqlitePool,
    id: &str,
    modifications: Option<&Modifications>,
    reviewed_by: Option<&str>,
) -> Result<ExtractorSuggestion> {
    let mods = modifications.filter(|m| !m.is_empty());
    let target = if mods.is_some() {
        SuggestionStatus::Modified
    } else {
        SuggestionStatus::Approved
    };
    let empty = Modifications::default();
    let mods = mods.unwrap_or(&empty);
    let now_ms = Utc::now().timestamp_millis();

    let conditions_json = mods
        .conditions
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let row = sqlx::query(
        r#"
        UPDATE extractor_suggestions SET
            status = ?,
            suggested_name = COALESCE(?, suggested_name),
            aggregation_type = COALESCE(?, aggregation_type),
            conditions_json = COALESCE(?, conditions_json),
            description = COALESCE(?, description),
            reviewed_by = ?,
            reviewed_at = ?,
            updated_at = ?
        WHERE id = ? AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(target.as_str())
    .bind(mods.suggested_name.as_deref())
    .bind(mods.aggregation_type.map(|a| a.as_str()))
    .bind(conditions_json)
    .bind(mods.description.as_deref())
    .bind(reviewed_by)
    .bind(now_ms)
    .bind(now_ms)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => suggestion_from_row(&row),
        None => not_transitionable(pool, id).await,
    }
}

pub async fn reject(
    pool: &SqlitePool,
    id: &str,
    reviewed_by: Option<&str>,
) -> Result<ExtractorSuggestion> {
    let now_ms = Utc::now().timestamp_millis();
    let row = sqlx::query(
        r#"
        UPDATE extractor_suggestions
        SET status = 'rejected', reviewed_by = ?, reviewed_at = ?, updated_at = ?
        WHERE id = ? AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(reviewed_by)
    .bind(now_ms)
    .bind(now_ms)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => suggestion_from_row(&row),
        None => not_transitionable(pool, id).await,
    }
}

/// Approve every pending suggestion at or above `min_confidence` in one
/// set-based update. Concurrent single-item actions on the same rows cannot
/// be double-applied: whichever statement runs first wins the row.
pub async fn bulk_approve(pool: &SqlitePool, min_confidence: f64) -> Result<BulkApproveOutcome> {
    let total_considered: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM extractor_suggestions WHERE status = 'pending'")
            .fetch_one(pool)
            .await?;

    let now_ms = Utc::now().timestamp_millis();
    let res = sqlx::query(
        r#"
        UPDATE extractor_suggestions
        SET status = 'approved', reviewed_at = ?, updated_at = ?
        WHERE status = 'pending' AND confidence >= ?
        "#,
    )
    .bind(now_ms)
    .bind(now_ms)
    .bind(min_confidence)
    .execute(pool)
    .await?;

    Ok(BulkApproveOutcome {
        approved: res.rows_affected(),
        total_considered,
    })
}

pub async fn list_suggestions(
    pool: &SqlitePool,
    filter: &SuggestionFilter,
) -> Result<Vec<ExtractorSuggestion>> {
    let status = filter.status.map(|s| s.as_str());
    let rows = sqlx::query(
        r#"
        SELECT * FROM extractor_suggestions
        WHERE (? IS NULL OR status = ?)
          AND (? IS NULL OR confidence >= ?)
        ORDER BY confidence DESC, field_path
        LIMIT ?
        "#,
    )
    .bind(status)
    .bind(status)
    .bind(filter.min_confidence)
    .bind(filter.min_confidence)
    .bind(filter.limit.unwrap_or(200))
    .fetch_all(pool)
    .await?;

    rows.iter().map(suggestion_from_row).collect()
}

async fn not_transitionable(pool: &SqlitePool, id: &str) -> Result<ExtractorSuggestion> {
    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM extractor_suggestions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    match current {
        None => anyhow::bail!("suggestion not found: {}", id),
        Some(status) => anyhow::bail!("suggestion {} already resolved (status: {})", id, status),
    }
}

pub(crate) fn suggestion_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExtractorSuggestion> {
    let status_str: String = row.get("status");
    let agg_str: String = row.get("aggregation_type");
    Ok(ExtractorSuggestion {
        id: row.get("id"),
        field_path: row.get("field_path"),
        suggested_name: row.get("suggested_name"),
        aggregation_type: AggregationType::parse(&agg_str)
            .ok_or_else(|| anyhow::anyhow!("unknown aggregation type in row: {}", agg_str))?,
        conditions: serde_json::from_str(&row.get::<String, _>("conditions_json"))
            .unwrap_or(Value::String("always".to_string())),
        description: row.get("description"),
        confidence: row.get("confidence"),
        is_new: row.get("is_new"),
        existing_match: row.get("existing_match"),
        status: SuggestionStatus::parse(&status_str)
            .ok_or_else(|| anyhow::anyhow!("unknown suggestion status in row: {}", status_str))?,
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: row.get("reviewed_at"),
        source_run_id: row.get("source_run_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
