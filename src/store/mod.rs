//! Data persistence layer (adapters for the storage ports).
//!
//! The primary adapter is [`PostgresEventStore`]: one facade owning the
//! SQLx connection pool and implementing every port defined in
//! [`crate::ports`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     PostgresEventStore                          │
//! │                                                                 │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌─────────────┐  │
//! │  │  Interval  │ │  Factory   │ │   Replay   │ │  Realtime/  │  │
//! │  │   Ledger   │ │  Children  │ │  Iterator  │ │    Reorg    │  │
//! │  └────────────┘ └────────────┘ └────────────┘ └─────────────┘  │
//! │                          │                                      │
//! │                          ▼                                      │
//! │              ┌──────────────────────────┐                       │
//! │              │   SQLx Connection Pool   │                       │
//! │              └──────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`ReadThroughCache`] optionally decorates the contract-read port with
//! an in-memory moka layer.
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and run via
//! [`PostgresEventStore::run_migrations`].

mod cache;
mod children;
mod postgres;
mod replay;
mod rows;

pub use cache::{ReadCacheStats, ReadThroughCache};
pub use postgres::PostgresEventStore;

// Re-export commonly used types for convenience
pub use sqlx::postgres::PgPool;
