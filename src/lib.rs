//! Chainstore Event Store
//!
//! The durable storage core of an EVM blockchain indexing engine: it
//! records, merges, and replays chain events (logs, transactions,
//! containing blocks) for user-defined event sources, and serves a
//! read-through cache for contract-call results.
//!
//! Chain artifacts are stored once under their chain-native identifiers
//! but exposed through multiple logical lenses: direct log filters and
//! dynamically discovered factory-child contracts. Per-source coverage
//! intervals carry set-algebraic semantics, so a backfill never
//! re-fetches an already-indexed range and narrower filters transparently
//! reuse broader filters' coverage.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      backfill / realtime fetchers               │
//! │                              │ writes                          │
//! │                              ▼                                  │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │                  PostgresEventStore                       │  │
//! │  │  artifacts │ interval ledger │ reorg rollback │ reads    │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! │            │ replay pages                │ child addresses      │
//! │            ▼                             ▼                      │
//! │   event processing pipeline      factory discovery              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`] - domain types (artifacts, filters, intervals, codecs)
//! - [`error`] - layered error types
//! - [`config`] - configuration loading and validation
//! - [`ports`] - storage port traits
//! - [`store`] - the Postgres adapter and the in-memory read cache
//!
//! # Getting Started
//!
//! ```ignore
//! use chainstore::config::Settings;
//! use chainstore::store::PostgresEventStore;
//!
//! let settings = Settings::load("development")?;
//! let pool = settings.database.connect().await?;
//! let store = PostgresEventStore::new(pool);
//! store.run_migrations().await?;
//! ```

pub mod config;
pub mod error;
pub mod ports;
pub mod store;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}
