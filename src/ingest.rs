//! Discovery-run orchestration.
//!
//! Coordinates the full flow for one ingestion event: read records → walk →
//! aggregate → merge into the persistent catalog → write the run log. The
//! scoring pass is deliberately separate (`fsc suggest generate`) so that
//! collaborator trouble can never interfere with ingestion.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::aggregate;
use crate::catalog;
use crate::config::Config;
use crate::db;

pub async fn run_discover(
    config: &Config,
    input: &Path,
    source: Option<String>,
    company: Option<String>,
) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Input file is not valid JSON: {}", input.display()))?;

    let (records, source_id, company_name) = match parsed {
        Value::Array(items) => {
            let source_id =
                source.context("--source is required when the input is a bare JSON array")?;
            (items, source_id, company)
        }
        Value::Object(map) => {
            let records = map
                .get("records")
                .and_then(Value::as_array)
                .cloned()
                .context("input object must contain a \"records\" array")?;
            let source_id = source
                .or_else(|| {
                    map.get("sourceId")
                        .and_then(Value::as_str)
                        .map(String::from)
                })
                .context("no source id: pass --source or include \"sourceId\" in the input")?;
            let company_name = company.or_else(|| {
                map.get("companyName")
                    .and_then(Value::as_str)
                    .map(String::from)
            });
            (records, source_id, company_name)
        }
        _ => bail!("input must be a JSON array of records or an object with a \"records\" array"),
    };

    let started = std::time::Instant::now();
    let stats = aggregate::aggregate_run(&records, &config.discovery);

    if stats.truncated_branches > 0 {
        eprintln!(
            "warning: {} branch(es) exceeded the depth cap of {} and were truncated",
            stats.truncated_branches, config.discovery.max_depth
        );
    }

    let pool = db::connect(&config.db).await?;
    let summary = catalog::merge_run(
        &pool,
        &stats,
        &config.discovery,
        &source_id,
        company_name.as_deref(),
        started.elapsed().as_millis() as i64,
    )
    .await?;

    println!("discover {}", source_id);
    println!("  records: {}", summary.record_count);
    println!("  fields discovered: {}", summary.fields_discovered);
    println!("  new fields: {}", summary.new_fields);
    println!("  updated fields: {}", summary.updated_fields);
    println!("  skipped (noise): {}", summary.skipped_low_frequency);
    if summary.truncated_branches > 0 {
        println!("  truncated branches: {}", summary.truncated_branches);
    }
    if summary.failed_paths > 0 {
        println!("  failed paths: {}", summary.failed_paths);
    }
    println!("  run id: {}", summary.run_id);
    println!("ok");

    pool.close().await;
    Ok(())
}
