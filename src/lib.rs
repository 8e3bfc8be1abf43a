//! # Groundwork
//!
//! A hybrid retrieval engine for grounded document question answering.
//!
//! Groundwork ingests plain-text documents (local uploads and externally
//! synced files), splits them into overlapping chunks, embeds them, and
//! answers queries by fusing dense vector similarity with sparse keyword
//! matching. Ranked, source-attributed chunks are what an outer answer
//! generation layer consumes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────────────┐   ┌───────────┐
//! │ Uploads /    │──▶│  Ingestion Pipeline         │──▶│  SQLite    │
//! │ Sync events  │   │ fingerprint→chunk→embed    │   │ FTS5+Vec  │
//! └──────────────┘   └────────────────────────────┘   └────┬──────┘
//!                                                          │
//!                                      ┌───────────────────┤
//!                                      ▼                   ▼
//!                                 ┌──────────┐       ┌──────────┐
//!                                 │   CLI    │       │   HTTP   │
//!                                 │  (gnd)   │       │ /search  │
//!                                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gnd init                      # create database
//! gnd ingest                    # index the uploads directory
//! gnd search "refund policy"    # hybrid retrieval
//! gnd serve                     # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunker`] | Overlapping, boundary-preferring chunking |
//! | [`fingerprint`] | Content fingerprints and the reindex decision |
//! | [`embedding`] | Embedding client trait, OpenAI impl, batching gateway |
//! | [`store`] | Index store trait with SQLite and in-memory backends |
//! | [`retriever`] | Hybrid vector + keyword fusion |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`sources`] | Uploads directory scanning |
//! | [`server`] | HTTP query/sync API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retriever;
pub mod server;
pub mod sources;
pub mod stats;
pub mod store;
