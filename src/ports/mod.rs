//! Port definitions for dependency injection and testability.
//!
//! Ports are trait definitions that describe what the indexing pipeline
//! needs from durable storage. Following hexagonal architecture, adapters
//! implement these traits over concrete backends; the primary adapter is
//! [`crate::store::PostgresEventStore`], which implements every port over
//! one connection pool.
//!
//! | Port | Concern |
//! |------|---------|
//! | [`IntervalStore`] | coverage interval tracking with subsumption |
//! | [`FactoryStore`] | factory child-address discovery |
//! | [`ReplayStore`] | ordered, paginated event replay |
//! | [`RealtimeStore`] | realtime ingestion and reorg rollback |
//! | [`ContractReadStore`] | contract-call read cache |

mod store;

pub use store::{
    ContractReadStore, DEFAULT_CHILD_ADDRESS_PAGE_SIZE, DEFAULT_EVENT_PAGE_SIZE, FactoryStore,
    IntervalStore, LogEventRequest, RealtimeStore, ReplayStore,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ports_are_send_sync() {
        // Compile-time check that all port traits require Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}

        // These would fail to compile if traits don't require Send + Sync
        fn check_interval_store<T: IntervalStore>() {
            assert_send_sync::<T>();
        }
        fn check_factory_store<T: FactoryStore>() {
            assert_send_sync::<T>();
        }
        fn check_replay_store<T: ReplayStore>() {
            assert_send_sync::<T>();
        }
        fn check_realtime_store<T: RealtimeStore>() {
            assert_send_sync::<T>();
        }
        fn check_contract_read_store<T: ContractReadStore>() {
            assert_send_sync::<T>();
        }
    }
}
