//! Persistent field catalog and the per-run merge layer.
//!
//! Merges one run's aggregated statistics into the `field_records` table.
//! Because concurrent ingestion runs may discover the same new path at the
//! same time, the insert-or-merge is a single `ON CONFLICT(path)` upsert:
//! counters sum, type bitmasks union, and the cumulative frequency is
//! recomputed inside the statement, so no update is ever lost to a
//! check-then-insert race. The bounded sample list is the one piece that
//! cannot merge in a single statement; it uses a short compare-and-swap loop
//! and is best-effort under contention.
//!
//! Per-path persistence failures are logged and counted, never fatal. A run
//! only fails outright when it attempted at least one path and persisted
//! nothing.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::aggregate::{FieldStat, RunStats};
use crate::config::DiscoveryConfig;
use crate::models::{
    DiscoveryRunLog, FieldRecord, FieldStatus, FieldSubmission, TypeSet,
};

/// Outcome of one discovery run's merge, also snapshotted into the run log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub record_count: i64,
    pub fields_discovered: i64,
    pub new_fields: i64,
    pub updated_fields: i64,
    pub skipped_low_frequency: i64,
    pub failed_paths: i64,
    pub truncated_branches: i64,
}

enum MergePathResult {
    Inserted,
    Updated,
    Skipped,
}

/// Merge one run's statistics into the catalog and write its run log.
pub async fn merge_run(
    pool: &SqlitePool,
    stats: &RunStats,
    cfg: &DiscoveryConfig,
    source_id: &str,
    company_name: Option<&str>,
    duration_ms: i64,
) -> Result<RunSummary> {
    let now = Utc::now().timestamp();

    let mut summary = RunSummary {
        run_id: Uuid::new_v4().to_string(),
        record_count: stats.total_records,
        fields_discovered: stats.fields.len() as i64,
        new_fields: 0,
        updated_fields: 0,
        skipped_low_frequency: 0,
        failed_paths: 0,
        truncated_branches: stats.truncated_branches as i64,
    };

    let mut attempted = 0i64;
    for (path, stat) in &stats.fields {
        let run_freq = stats.frequency(stat);
        if run_freq >= cfg.noise_threshold {
            attempted += 1;
        }
        match merge_path(pool, path, stat, run_freq, stats.total_records, cfg, now).await {
            Ok(MergePathResult::Inserted) => summary.new_fields += 1,
            Ok(MergePathResult::Updated) => summary.updated_fields += 1,
            Ok(MergePathResult::Skipped) => summary.skipped_low_frequency += 1,
            Err(e) => {
                eprintln!("warning: failed to persist field '{}': {}", path, e);
                summary.failed_paths += 1;
            }
        }
    }

    if attempted > 0 && summary.new_fields + summary.updated_fields == 0 {
        anyhow::bail!(
            "discovery run persisted no fields ({} paths failed)",
            summary.failed_paths
        );
    }

    sqlx::query(
        r#"
        INSERT INTO discovery_runs
            (id, source_id, company_name, record_count, fields_discovered,
             new_fields, updated_fields, duration_ms, summary_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&summary.run_id)
    .bind(source_id)
    .bind(company_name)
    .bind(summary.record_count)
    .bind(summary.fields_discovered)
    .bind(summary.new_fields)
    .bind(summary.updated_fields)
    .bind(duration_ms)
    .bind(serde_json::to_string(&summary)?)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(summary)
}

async fn merge_path(
    pool: &SqlitePool,
    path: &str,
    stat: &FieldStat,
    run_freq: f64,
    total_records: i64,
    cfg: &DiscoveryConfig,
    now: i64,
) -> Result<MergePathResult> {
    if run_freq < cfg.noise_threshold {
        // Below the noise threshold a path is never inserted, but an
        // existing record still absorbs the run's observations. The
        // occurrence count tracks at-or-above-threshold runs only.
        // SQLite evaluates SET expressions against the pre-update row, so
        // the frequency recomputation sees the old counters.
        let res = sqlx::query(
            r#"
            UPDATE field_records SET
                data_types = data_types | ?,
                match_count = match_count + ?,
                record_count = record_count + ?,
                frequency = CAST(match_count + ? AS REAL) / (record_count + ?),
                last_seen_at = ?
            WHERE path = ?
            "#,
        )
        .bind(stat.types.bits())
        .bind(stat.count)
        .bind(total_records)
        .bind(stat.count)
        .bind(total_records)
        .bind(now)
        .bind(path)
        .execute(pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(MergePathResult::Skipped);
        }
        merge_samples(pool, path, &stat.samples, cfg.catalog_sample_cap).await?;
        return Ok(MergePathResult::Updated);
    }

    let occurrence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO field_records
            (path, data_types, samples_json, match_count, record_count, frequency,
             is_nested, parent_path, occurrence_count, status, first_seen_at, last_seen_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 'discovered', ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            data_types = field_records.data_types | excluded.data_types,
            match_count = field_records.match_count + excluded.match_count,
            record_count = field_records.record_count + excluded.record_count,
            frequency = CAST(field_records.match_count + excluded.match_count AS REAL)
                        / (field_records.record_count + excluded.record_count),
            occurrence_count = field_records.occurrence_count + 1,
            last_seen_at = excluded.last_seen_at
        RETURNING occurrence_count
        "#,
    )
    .bind(path)
    .bind(stat.types.bits())
    .bind(serde_json::to_string(&stat.samples)?)
    .bind(stat.count)
    .bind(total_records)
    .bind(run_freq)
    .bind(stat.is_nested)
    .bind(stat.parent_path.as_deref())
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    if occurrence == 1 {
        Ok(MergePathResult::Inserted)
    } else {
        merge_samples(pool, path, &stat.samples, cfg.catalog_sample_cap).await?;
        Ok(MergePathResult::Updated)
    }
}

/// Append run samples not already present, up to the catalog cap. Once the
/// cap is reached new samples are refused; existing ones are never evicted.
///
/// Compare-and-swap on the serialized list: the UPDATE only applies if the
/// row still holds the list we read. Three attempts, then give up — samples
/// are best-effort and losing a few under contention is acceptable.
async fn merge_samples(
    pool: &SqlitePool,
    path: &str,
    run_samples: &[Value],
    cap: usize,
) -> Result<()> {
    if run_samples.is_empty() {
        return Ok(());
    }

    for _ in 0..3 {
        let current: Option<String> =
            sqlx::query_scalar("SELECT samples_json FROM field_records WHERE path = ?")
                .bind(path)
                .fetch_optional(pool)
                .await?;
        let Some(current) = current else {
            return Ok(());
        };

        let mut samples: Vec<Value> = serde_json::from_str(&current).unwrap_or_default();
        let before = samples.len();
        for sample in run_samples {
            if samples.len() >= cap {
                break;
            }
            if !samples.contains(sample) {
                samples.push(sample.clone());
            }
        }
        if samples.len() == before {
            return Ok(());
        }

        let res = sqlx::query(
            "UPDATE field_records SET samples_json = ? WHERE path = ? AND samples_json = ?",
        )
        .bind(serde_json::to_string(&samples)?)
        .bind(path)
        .bind(&current)
        .execute(pool)
        .await?;

        if res.rows_affected() == 1 {
            return Ok(());
        }
    }

    Ok(())
}

// ============ Query surface ============

#[derive(Debug, Default, Clone)]
pub struct FieldFilter {
    pub status: Option<FieldStatus>,
    pub min_frequency: Option<f64>,
    pub limit: Option<i64>,
}

pub async fn list_fields(pool: &SqlitePool, filter: &FieldFilter) -> Result<Vec<FieldRecord>> {
    let status = filter.status.map(|s| s.as_str());
    let rows = sqlx::query(
        r#"
        SELECT path, data_types, samples_json, match_count, record_count, frequency,
               is_nested, parent_path, occurrence_count, status, first_seen_at, last_seen_at
        FROM field_records
        WHERE (? IS NULL OR status = ?)
          AND (? IS NULL OR frequency >= ?)
        ORDER BY frequency DESC, path
        LIMIT ?
        "#,
    )
    .bind(status)
    .bind(status)
    .bind(filter.min_frequency)
    .bind(filter.min_frequency)
    .bind(filter.limit.unwrap_or(200))
    .fetch_all(pool)
    .await?;

    rows.iter().map(field_from_row).collect()
}

pub async fn get_field(pool: &SqlitePool, path: &str) -> Result<Option<FieldRecord>> {
    let row = sqlx::query(
        r#"
        SELECT path, data_types, samples_json, match_count, record_count, frequency,
               is_nested, parent_path, occurrence_count, status, first_seen_at, last_seen_at
        FROM field_records WHERE path = ?
        "#,
    )
    .bind(path)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(field_from_row).transpose()
}

pub async fn list_runs(pool: &SqlitePool, limit: Option<i64>) -> Result<Vec<DiscoveryRunLog>> {
    let rows = sqlx::query(
        r#"
        SELECT id, source_id, company_name, record_count, fields_discovered,
               new_fields, updated_fields, duration_ms, summary_json, created_at
        FROM discovery_runs
        ORDER BY created_at DESC, id
        LIMIT ?
        "#,
    )
    .bind(limit.unwrap_or(50))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| DiscoveryRunLog {
            id: row.get("id"),
            source_id: row.get("source_id"),
            company_name: row.get("company_name"),
            record_count: row.get("record_count"),
            fields_discovered: row.get("fields_discovered"),
            new_fields: row.get("new_fields"),
            updated_fields: row.get("updated_fields"),
            duration_ms: row.get("duration_ms"),
            summary: serde_json::from_str(&row.get::<String, _>("summary_json"))
                .unwrap_or(Value::Null),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Select the scoring batch: fields at or above the frequency threshold,
/// frequency-descending, capped. `only_new` restricts to fields no scoring
/// pass has consumed yet. Reviewer-resolved fields (approved/ignored) are
/// never resubmitted.
pub async fn fields_for_scoring(
    pool: &SqlitePool,
    min_frequency: f64,
    only_new: bool,
    batch_limit: i64,
) -> Result<Vec<FieldSubmission>> {
    let sql = if only_new {
        r#"
        SELECT path, data_types, samples_json, frequency, occurrence_count
        FROM field_records
        WHERE frequency >= ? AND status = 'discovered'
        ORDER BY frequency DESC, path
        LIMIT ?
        "#
    } else {
        r#"
        SELECT path, data_types, samples_json, frequency, occurrence_count
        FROM field_records
        WHERE frequency >= ? AND status IN ('discovered', 'reviewed')
        ORDER BY frequency DESC, path
        LIMIT ?
        "#
    };

    let rows = sqlx::query(sql)
        .bind(min_frequency)
        .bind(batch_limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let mut samples: Vec<Value> =
                serde_json::from_str(&row.get::<String, _>("samples_json")).unwrap_or_default();
            samples.truncate(3);
            FieldSubmission {
                path: row.get("path"),
                data_types: TypeSet::from_bits(row.get("data_types")).tags(),
                frequency: row.get("frequency"),
                samples,
                occurrence_count: row.get("occurrence_count"),
            }
        })
        .collect())
}

/// Advance every submitted field from `discovered` to `reviewed` in one
/// set-based update. Idempotent, and never touches reviewer-set terminal
/// statuses.
pub async fn mark_fields_reviewed(pool: &SqlitePool, paths: &[&str]) -> Result<u64> {
    if paths.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; paths.len()].join(", ");
    let sql = format!(
        "UPDATE field_records SET status = 'reviewed' \
         WHERE status = 'discovered' AND path IN ({})",
        placeholders
    );
    let mut query = sqlx::query(&sql);
    for path in paths {
        query = query.bind(*path);
    }
    Ok(query.execute(pool).await?.rows_affected())
}

/// Reviewer-set terminal transition for a field. Only `approved` and
/// `ignored` are valid targets, and only from a non-terminal status.
pub async fn set_field_status(pool: &SqlitePool, path: &str, status: FieldStatus) -> Result<()> {
    if !matches!(status, FieldStatus::Approved | FieldStatus::Ignored) {
        anyhow::bail!("field status can only be set to approved or ignored");
    }

    let res = sqlx::query(
        "UPDATE field_records SET status = ? \
         WHERE path = ? AND status IN ('discovered', 'reviewed')",
    )
    .bind(status.as_str())
    .bind(path)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM field_records WHERE path = ?")
                .bind(path)
                .fetch_optional(pool)
                .await?;
        match current {
            None => anyhow::bail!("field not found: {}", path),
            Some(s) => anyhow::bail!("field {} already resolved (status: {})", path, s),
        }
    }

    Ok(())
}

fn field_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FieldRecord> {
    let status_str: String = row.get("status");
    Ok(FieldRecord {
        path: row.get("path"),
        data_types: TypeSet::from_bits(row.get("data_types")).tags(),
        samples: serde_json::from_str(&row.get::<String, _>("samples_json")).unwrap_or_default(),
        match_count: row.get("match_count"),
        record_count: row.get("record_count"),
        frequency: row.get("frequency"),
        is_nested: row.get("is_nested"),
        parent_path: row.get("parent_path"),
        occurrence_count: row.get("occurrence_count"),
        status: FieldStatus::parse(&status_str).unwrap_or(FieldStatus::Discovered),
        first_seen_at: row.get("first_seen_at"),
        last_seen_at: row.get("last_seen_at"),
    })
}
