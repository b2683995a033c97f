//! # Field Scout
//!
//! A field discovery and extractor suggestion engine for semi-structured
//! JSON ingestion pipelines.
//!
//! Field Scout walks batches of raw JSON records, catalogs every distinct
//! field path with cumulative statistics (types, frequency, samples), asks an
//! AI scoring collaborator which fields are worth extracting, and runs the
//! resulting suggestions through a human review lifecycle before exporting
//! them as extractor definitions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │ JSON records │──▶│ Walk + Agg  │──▶│  SQLite    │
//! │  (per run)   │   │  per run    │   │  catalog   │
//! └──────────────┘   └─────────────┘   └─────┬─────┘
//!                                            │
//!                    ┌───────────────────────┤
//!                    ▼                       ▼
//!               ┌──────────┐          ┌───────────┐
//!               │ Scoring  │──merge──▶│  Review    │
//!               │ (OpenAI) │          │ CLI / HTTP │
//!               └──────────┘          └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fsc init                                  # create database
//! fsc discover records.json --source acme   # ingest one batch
//! fsc fields                                # inspect the catalog
//! fsc suggest generate                      # run a scoring pass
//! fsc suggest list                          # review pending suggestions
//! fsc suggest export -o extractors.json     # export approved extractors
//! fsc serve                                 # start the review server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`walker`] | Structural JSON walker |
//! | [`aggregate`] | Per-run field statistics |
//! | [`catalog`] | Persistent field catalog and run merge |
//! | [`scoring`] | AI scoring collaborator adapter |
//! | [`suggest`] | Suggestion merge and the generate pass |
//! | [`review`] | Suggestion review lifecycle |
//! | [`export`] | Approved-extractor export |
//! | [`server`] | HTTP review server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod db;
pub mod export;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod review;
pub mod scoring;
pub mod server;
pub mod stats;
pub mod suggest;
pub mod walker;

#[cfg(test)]
pub(crate) mod testutil;
