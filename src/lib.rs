//! # reviewdesk
//!
//! A small review-management backend: CSV bulk import, a filtered and
//! paginated listing, fixed aggregation reports and a keyword-based
//! critical-review finder, served over HTTP next to a static dashboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐
//! │ CSV file │──▶│   ingest   │──▶│    Store     │
//! │ / upload │   │ parse+cast │   │ SQLite / mem │
//! └──────────┘   └────────────┘   └──────┬───────┘
//!                                        │
//!                ┌───────────────┬───────┴───────┐
//!                ▼               ▼               ▼
//!           ┌─────────┐    ┌──────────┐    ┌──────────┐
//!           │  query  │    │ reports  │    │ analysis │
//!           └────┬────┘    └────┬─────┘    └────┬─────┘
//!                └──────────────┼───────────────┘
//!                        ┌──────┴──────┐
//!                        │ server / CLI│
//!                        └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Record kinds and their schemas |
//! | [`cast`] | Lenient value coercion used by the schemas |
//! | [`query`] | List-query parameters → filter, sort, window |
//! | [`store`] | Storage trait with SQLite and in-memory backends |
//! | [`ingest`] | CSV bulk import |
//! | [`reports`] | Summary stats and histograms |
//! | [`analysis`] | Join-on-read, critical reviews, data dump |
//! | [`server`] | HTTP API |
//! | [`error`] | HTTP and import error types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |
//! | [`logging`] | `tracing` subscriber setup |

pub mod analysis;
pub mod cast;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod query;
pub mod reports;
pub mod server;
pub mod store;
