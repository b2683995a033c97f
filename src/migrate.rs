use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent; also used directly by tests
/// against in-memory databases.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Field catalog: one row per distinct path ever persisted.
    // data_types is a TypeTag bitmask so concurrent merges can union it
    // with a plain `|` inside the upsert.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS field_records (
            path TEXT PRIMARY KEY,
            data_types INTEGER NOT NULL DEFAULT 0,
            samples_json TEXT NOT NULL DEFAULT '[]',
            match_count INTEGER NOT NULL,
            record_count INTEGER NOT NULL,
            frequency REAL NOT NULL,
            is_nested INTEGER NOT NULL,
            parent_path TEXT,
            occurrence_count INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'discovered',
            first_seen_at INTEGER NOT NULL,
            last_seen_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Immutable run log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS discovery_runs (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            company_name TEXT,
            record_count INTEGER NOT NULL,
            fields_discovered INTEGER NOT NULL,
            new_fields INTEGER NOT NULL,
            updated_fields INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            summary_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Suggestions, kept forever as an audit trail
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extractor_suggestions (
            id TEXT PRIMARY KEY,
            field_path TEXT NOT NULL,
            suggested_name TEXT NOT NULL,
            aggregation_type TEXT NOT NULL,
            conditions_json TEXT NOT NULL DEFAULT '"always"',
            description TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL,
            is_new INTEGER NOT NULL DEFAULT 1,
            existing_match TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            reviewed_by TEXT,
            reviewed_at INTEGER,
            source_run_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one pending suggestion per path, enforced by the database so
    // concurrent generate passes cannot duplicate a row. The suggestion
    // merge upsert targets this index.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_suggestions_pending_path
        ON extractor_suggestions(field_path) WHERE status = 'pending'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_field_records_frequency ON field_records(frequency DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_field_records_status ON field_records(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_suggestions_status ON extractor_suggestions(status)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_suggestions_field_path ON extractor_suggestions(field_path)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_discovery_runs_created_at ON discovery_runs(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
