//! Database statistics and health overview.
//!
//! Quick summary of the catalog: field counts by status, suggestion counts
//! by status, run history. Used by `fsc stats` to give confidence that
//! discovery runs and scoring passes are doing what they should.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;

    let total_fields: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM field_records")
        .fetch_one(&pool)
        .await?;
    let total_suggestions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM extractor_suggestions")
            .fetch_one(&pool)
            .await?;
    let total_runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discovery_runs")
        .fetch_one(&pool)
        .await?;
    let last_run: Option<i64> =
        sqlx::query_scalar("SELECT MAX(created_at) FROM discovery_runs")
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Field Scout — Database Stats");
    println!("============================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Fields:       {}", total_fields);
    println!("  Suggestions:  {}", total_suggestions);
    println!("  Runs:         {}", total_runs);
    println!(
        "  Last run:     {}",
        last_run.map(format_ts).unwrap_or_else(|| "never".to_string())
    );

    let field_rows =
        sqlx::query("SELECT status, COUNT(*) AS n FROM field_records GROUP BY status ORDER BY n DESC")
            .fetch_all(&pool)
            .await?;
    if !field_rows.is_empty() {
        println!();
        println!("  Fields by status:");
        for row in &field_rows {
            println!(
                "    {:<12} {:>6}",
                row.get::<String, _>("status"),
                row.get::<i64, _>("n")
            );
        }
    }

    let suggestion_rows = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM extractor_suggestions GROUP BY status ORDER BY n DESC",
    )
    .fetch_all(&pool)
    .await?;
    if !suggestion_rows.is_empty() {
        println!();
        println!("  Suggestions by status:");
        for row in &suggestion_rows {
            println!(
                "    {:<12} {:>6}",
                row.get::<String, _>("status"),
                row.get::<i64, _>("n")
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
