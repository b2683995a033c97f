//! Export approved extractors as JSON.
//!
//! Projects every approved or modified suggestion into the shape consumed by
//! the downstream extraction runtime. Writes to a file when given a path,
//! otherwise to stdout for piping.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::config::Config;
use crate::db;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedExtractor {
    pub name: String,
    pub path: String,
    pub aggregation: String,
    pub conditions: Value,
    pub description: String,
    pub confidence: f64,
}

pub async fn export_extractors(pool: &SqlitePool) -> Result<Vec<ExportedExtractor>> {
    let rows = sqlx::query(
        r#"
        SELECT suggested_name, field_path, aggregation_type, conditions_json,
               description, confidence
        FROM extractor_suggestions
        WHERE status IN ('approved', 'modified')
        ORDER BY field_path
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ExportedExtractor {
            name: row.get("suggested_name"),
            path: row.get("field_path"),
            aggregation: row.get("aggregation_type"),
            conditions: serde_json::from_str(&row.get::<String, _>("conditions_json"))
                .unwrap_or(Value::String("always".to_string())),
            description: row.get("description"),
            confidence: row.get("confidence"),
        })
        .collect())
}

pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    let extractors = export_extractors(&pool).await?;
    let count = extractors.len();
    let json = serde_json::to_string_pretty(&extractors)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!("Exported {} extractors to {}", count, path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    pool.close().await;
    Ok(())
}
