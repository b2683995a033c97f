//! # Field Scout CLI (`fsc`)
//!
//! The `fsc` binary is the primary interface for Field Scout. It provides
//! commands for database initialization, discovery runs over JSON record
//! batches, field catalog inspection, suggestion generation and review, and
//! starting the HTTP review server.
//!
//! ## Usage
//!
//! ```bash
//! fsc --config ./config/fsc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fsc init` | Create the SQLite database and run schema migrations |
//! | `fsc discover <file>` | Walk a batch of JSON records and merge into the catalog |
//! | `fsc fields` | List cataloged fields with statistics |
//! | `fsc fields mark <path>` | Set a field's status to approved or ignored |
//! | `fsc runs` | List discovery run logs |
//! | `fsc suggest generate` | Run one scoring pass over the catalog |
//! | `fsc suggest list` | List extractor suggestions |
//! | `fsc suggest approve <id>` | Approve a pending suggestion |
//! | `fsc suggest reject <id>` | Reject a pending suggestion |
//! | `fsc suggest bulk-approve` | Approve all pending above a confidence |
//! | `fsc suggest export` | Export approved extractors as JSON |
//! | `fsc stats` | Database statistics overview |
//! | `fsc serve` | Start the HTTP review server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use field_scout::catalog::{self, FieldFilter};
use field_scout::config::{self, Config};
use field_scout::db;
use field_scout::export;
use field_scout::ingest;
use field_scout::migrate;
use field_scout::models::{AggregationType, FieldStatus, SuggestionStatus};
use field_scout::review::{self, Modifications, SuggestionFilter};
use field_scout::server;
use field_scout::stats;
use field_scout::suggest;

/// Field Scout CLI — a field discovery and extractor suggestion engine for
/// JSON ingestion pipelines.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/fsc.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "fsc",
    about = "Field Scout — a field discovery and extractor suggestion engine for JSON ingestion pipelines",
    version,
    long_about = "Field Scout walks batches of raw JSON records, catalogs every distinct field \
    path with cumulative statistics (types, frequency, sample values), asks an AI scoring \
    collaborator which fields are worth extracting, and runs the resulting suggestions through \
    a human review lifecycle before exporting approved extractor definitions."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/fsc.toml`. Database, discovery, scoring, and
    /// server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/fsc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (field_records, discovery_runs, extractor_suggestions).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Run field discovery over a batch of JSON records.
    ///
    /// Reads the input file (a JSON array of records, or an object with a
    /// "records" array), walks every record structurally, aggregates per-run
    /// statistics, and merges them into the persistent catalog.
    Discover {
        /// Path to the JSON input file.
        input: PathBuf,

        /// Source identifier for the batch. Required for bare-array inputs;
        /// overrides the input's own sourceId otherwise.
        #[arg(long)]
        source: Option<String>,

        /// Company name attached to the run log.
        #[arg(long)]
        company: Option<String>,
    },

    /// Inspect the field catalog.
    Fields {
        #[command(subcommand)]
        action: Option<FieldsAction>,

        /// Filter by status: discovered, reviewed, approved, ignored.
        #[arg(long)]
        status: Option<String>,

        /// Only show fields at or above this cumulative frequency.
        #[arg(long)]
        min_frequency: Option<f64>,

        /// Maximum number of fields to show.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// List discovery run logs, newest first.
    Runs {
        /// Maximum number of runs to show.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Generate and review extractor suggestions.
    Suggest {
        #[command(subcommand)]
        action: SuggestAction,
    },

    /// Database statistics overview.
    Stats,

    /// Start the HTTP review server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// field catalog and suggestion review API.
    Serve,
}

/// Field catalog subcommands.
#[derive(Subcommand)]
enum FieldsAction {
    /// Set a field's status to approved or ignored.
    ///
    /// Terminal: a field marked this way is excluded from future scoring
    /// batches and cannot be re-marked.
    Mark {
        /// The field path (e.g. `budget.total` or `lines[*].cost`).
        path: String,

        /// Target status: `approved` or `ignored`.
        status: String,
    },
}

/// Suggestion subcommands.
#[derive(Subcommand)]
enum SuggestAction {
    /// Run one scoring pass: select high-frequency fields, submit them to
    /// the scoring collaborator, and merge the returned proposals.
    Generate {
        /// Override the configured minimum catalog frequency for the batch.
        #[arg(long)]
        min_frequency: Option<f64>,

        /// Only submit fields no scoring pass has consumed yet.
        #[arg(long)]
        only_new: bool,
    },

    /// List extractor suggestions.
    List {
        /// Filter by status: pending, approved, rejected, modified.
        #[arg(long)]
        status: Option<String>,

        /// Only show suggestions at or above this confidence.
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Maximum number of suggestions to show.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Approve a pending suggestion, optionally with overrides.
    ///
    /// Any override (name, aggregation, conditions, description) records the
    /// suggestion as `modified` instead of `approved`.
    Approve {
        /// Suggestion id.
        id: String,

        /// Override the suggested extractor name.
        #[arg(long)]
        name: Option<String>,

        /// Override the aggregation type: sum, avg, first, last, concat,
        /// unique, count.
        #[arg(long)]
        aggregation: Option<String>,

        /// Override the conditions as a JSON value.
        #[arg(long)]
        conditions: Option<String>,

        /// Override the description.
        #[arg(long)]
        description: Option<String>,

        /// Reviewer identity recorded on the suggestion.
        #[arg(long = "by")]
        reviewed_by: Option<String>,
    },

    /// Reject a pending suggestion.
    Reject {
        /// Suggestion id.
        id: String,

        /// Reviewer identity recorded on the suggestion.
        #[arg(long = "by")]
        reviewed_by: Option<String>,
    },

    /// Approve every pending suggestion at or above a confidence threshold.
    BulkApprove {
        /// Confidence threshold in [0.0, 1.0].
        #[arg(long, default_value_t = 0.8)]
        min_confidence: f64,
    },

    /// Export approved and modified suggestions as extractor definitions.
    Export {
        /// Output file. Prints to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Discover {
            input,
            source,
            company,
        } => {
            ingest::run_discover(&cfg, &input, source, company).await?;
        }
        Commands::Fields {
            action: Some(FieldsAction::Mark { path, status }),
            ..
        } => {
            let status = FieldStatus::parse(&status)
                .ok_or_else(|| anyhow::anyhow!("invalid field status: {}", status))?;
            let pool = db::connect(&cfg.db).await?;
            catalog::set_field_status(&pool, &path, status).await?;
            println!("{} -> {}", path, status.as_str());
            pool.close().await;
        }
        Commands::Fields {
            action: None,
            status,
            min_frequency,
            limit,
        } => {
            run_list_fields(&cfg, status, min_frequency, limit).await?;
        }
        Commands::Runs { limit } => {
            run_list_runs(&cfg, limit).await?;
        }
        Commands::Suggest { action } => match action {
            SuggestAction::Generate {
                min_frequency,
                only_new,
            } => {
                run_suggest_generate(&cfg, min_frequency, only_new).await?;
            }
            SuggestAction::List {
                status,
                min_confidence,
                limit,
            } => {
                run_list_suggestions(&cfg, status, min_confidence, limit).await?;
            }
            SuggestAction::Approve {
                id,
                name,
                aggregation,
                conditions,
                description,
                reviewed_by,
            } => {
                run_approve(&cfg, &id, name, aggregation, conditions, description, reviewed_by)
                    .await?;
            }
            SuggestAction::Reject { id, reviewed_by } => {
                let pool = db::connect(&cfg.db).await?;
                let s = review::reject(&pool, &id, reviewed_by.as_deref()).await?;
                println!("{} {} -> rejected", s.id, s.field_path);
                pool.close().await;
            }
            SuggestAction::BulkApprove { min_confidence } => {
                if !(0.0..=1.0).contains(&min_confidence) {
                    anyhow::bail!("--min-confidence must be in [0.0, 1.0]");
                }
                let pool = db::connect(&cfg.db).await?;
                let outcome = review::bulk_approve(&pool, min_confidence).await?;
                println!(
                    "approved {} of {} pending suggestions (confidence >= {})",
                    outcome.approved, outcome.total_considered, min_confidence
                );
                pool.close().await;
            }
            SuggestAction::Export { output } => {
                export::run_export(&cfg, output.as_deref()).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_list_fields(
    cfg: &Config,
    status: Option<String>,
    min_frequency: Option<f64>,
    limit: Option<i64>,
) -> anyhow::Result<()> {
    let status = status
        .as_deref()
        .map(|s| {
            FieldStatus::parse(s).ok_or_else(|| anyhow::anyhow!("invalid field status: {}", s))
        })
        .transpose()?;

    let pool = db::connect(&cfg.db).await?;
    let fields = catalog::list_fields(
        &pool,
        &FieldFilter {
            status,
            min_frequency,
            limit,
        },
    )
    .await?;

    if fields.is_empty() {
        println!("No fields in the catalog.");
    } else {
        println!(
            "{:<40} {:>6} {:>6} {:<12} {}",
            "PATH", "FREQ", "RUNS", "STATUS", "TYPES"
        );
        for f in &fields {
            let types: Vec<&str> = f.data_types.iter().map(|t| t.as_str()).collect();
            println!(
                "{:<40} {:>6.3} {:>6} {:<12} {}",
                f.path,
                f.frequency,
                f.occurrence_count,
                f.status.as_str(),
                types.join(",")
            );
        }
        println!();
        println!("{} field(s)", fields.len());
    }

    pool.close().await;
    Ok(())
}

async fn run_list_runs(cfg: &Config, limit: Option<i64>) -> anyhow::Result<()> {
    let pool = db::connect(&cfg.db).await?;
    let runs = catalog::list_runs(&pool, limit).await?;

    if runs.is_empty() {
        println!("No discovery runs recorded.");
    } else {
        println!(
            "{:<36} {:<20} {:>8} {:>6} {:>8} {:>8}",
            "RUN ID", "SOURCE", "RECORDS", "NEW", "UPDATED", "MS"
        );
        for r in &runs {
            println!(
                "{:<36} {:<20} {:>8} {:>6} {:>8} {:>8}",
                r.id, r.source_id, r.record_count, r.new_fields, r.updated_fields, r.duration_ms
            );
        }
    }

    pool.close().await;
    Ok(())
}

async fn run_suggest_generate(
    cfg: &Config,
    min_frequency: Option<f64>,
    only_new: bool,
) -> anyhow::Result<()> {
    if let Some(f) = min_frequency {
        if !(0.0..=1.0).contains(&f) {
            anyhow::bail!("--min-frequency must be in [0.0, 1.0]");
        }
    }

    let pool = db::connect(&cfg.db).await?;
    let summary = suggest::run_generate(&pool, cfg, min_frequency, only_new).await?;

    println!("suggest generate");
    println!("  fields submitted: {}", summary.fields_submitted);
    println!("  suggestions: {}", summary.suggestions_generated);
    println!("  inserted: {}", summary.inserted);
    println!("  updated: {}", summary.updated);
    println!("  unchanged: {}", summary.unchanged);
    if summary.failed > 0 {
        println!("  failed: {}", summary.failed);
    }
    if let Some(failure) = &summary.failure {
        eprintln!("warning: scoring collaborator failed: {}", failure);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

async fn run_list_suggestions(
    cfg: &Config,
    status: Option<String>,
    min_confidence: Option<f64>,
    limit: Option<i64>,
) -> anyhow::Result<()> {
    let status = status
        .as_deref()
        .map(|s| {
            SuggestionStatus::parse(s)
                .ok_or_else(|| anyhow::anyhow!("invalid suggestion status: {}", s))
        })
        .transpose()?;

    let pool = db::connect(&cfg.db).await?;
    let suggestions = review::list_suggestions(
        &pool,
        &SuggestionFilter {
            status,
            min_confidence,
            limit,
        },
    )
    .await?;

    if suggestions.is_empty() {
        println!("No suggestions.");
    } else {
        for s in &suggestions {
            println!(
                "{}  {:<30} {:<24} {:<8} conf {:.2}  [{}]",
                s.id,
                s.field_path,
                s.suggested_name,
                s.aggregation_type.as_str(),
                s.confidence,
                s.status.as_str()
            );
            if let Some(existing) = &s.existing_match {
                println!("    matches existing extractor: {}", existing);
            }
        }
        println!();
        println!("{} suggestion(s)", suggestions.len());
    }

    pool.close().await;
    Ok(())
}

async fn run_approve(
    cfg: &Config,
    id: &str,
    name: Option<String>,
    aggregation: Option<String>,
    conditions: Option<String>,
    description: Option<String>,
    reviewed_by: Option<String>,
) -> anyhow::Result<()> {
    let aggregation_type = aggregation
        .as_deref()
        .map(|s| {
            AggregationType::parse(s)
                .ok_or_else(|| anyhow::anyhow!("invalid aggregation type: {}", s))
        })
        .transpose()?;
    let conditions = conditions
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| anyhow::anyhow!("--conditions must be valid JSON: {}", e))?;

    let mods = Modifications {
        suggested_name: name,
        aggregation_type,
        conditions,
        description,
    };

    let pool = db::connect(&cfg.db).await?;
    let s = review::approve(&pool, id, Some(&mods), reviewed_by.as_deref()).await?;
    println!("{} {} -> {}", s.id, s.field_path, s.status.as_str());
    pool.close().await;
    Ok(())
}
