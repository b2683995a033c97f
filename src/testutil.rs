//! Shared helpers for unit tests that need a database.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::config::{Config, DbConfig, ServerConfig};

/// Config with all defaults and the scoring provider disabled.
pub(crate) fn test_config() -> Config {
    Config {
        db: DbConfig {
            path: ":memory:".into(),
        },
        discovery: Default::default(),
        scoring: Default::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
    }
}

/// A validated proposal as the scoring adapter would produce it.
pub(crate) fn proposal(path: &str, confidence: f64) -> crate::scoring::Proposal {
    crate::scoring::Proposal {
        field_path: path.to_string(),
        relevance_score: confidence * 10.0,
        confidence,
        suggested_name: "budget_total".to_string(),
        aggregation_type: crate::models::AggregationType::Sum,
        conditions: serde_json::Value::String("always".to_string()),
        description: "Total campaign budget".to_string(),
        category: Some("financial".to_string()),
    }
}

/// In-memory SQLite pool with the full schema applied.
///
/// Pinned to a single connection that never recycles: each connection to
/// `:memory:` is its own database.
pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    crate::migrate::apply_schema(&pool).await.unwrap();
    pool
}
