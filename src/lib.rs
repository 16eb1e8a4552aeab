//! # Case Recall
//!
//! The semantic retrieval engine behind a case-management application.
//! Free-text case messages and document chunks are embedded through an
//! external vector provider, persisted in SQLite, and served back through
//! brute-force cosine-similarity searches merged into one ranked list.
//!
//! ## Architecture
//!
//! ```text
//! write:  text ──▶ normalize ──▶ provider ──▶ embedding store
//!
//! read:   query ──▶ provider ──┬▶ message scan ──┐
//!                              └▶ document scan ─┴▶ merge ──▶ ranked results
//! ```
//!
//! The scans are deliberately simple: a recency-bounded candidate window is
//! fetched from the store, scored in Rust, threshold-filtered, and ranked.
//! There is no vector index; the window size is the only throughput
//! control, so content older than the window is never scored.
//!
//! All public read and write surfaces degrade rather than fail: a provider
//! outage, a corrupt row, or a store error yields `None` or an empty list,
//! with the cause visible only in the logs.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and search tunables |
//! | [`normalize`] | Pre-embedding text cleanup |
//! | [`embedding`] | Provider adapter, cosine scorer, BLOB codecs |
//! | [`store`] | Embedding persistence and candidate windows |
//! | [`search`] | Similarity searches and the unified merge |
//! | [`models`] | Caller-facing result shapes |
//! | [`backfill`] | Catch-up embedding for missed messages |
//! | [`stats`] | Embedding coverage counts |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod backfill;
pub mod config;
pub mod db;
pub mod embedding;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod search;
pub mod stats;
pub mod store;
