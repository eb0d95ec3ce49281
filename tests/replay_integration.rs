//! Integration tests for factory child-address discovery and the event
//! replay iterator against a real PostgreSQL instance in Docker.

mod common;

use alloy::primitives::{Address, Bytes, U256};
use futures::TryStreamExt;

use chainstore::ports::{FactoryStore, LogEventRequest, RealtimeStore, ReplayStore};
use chainstore::types::entities::LogEvent;
use chainstore::types::filter::{
    AddressFilter, ChildAddressLocation, Factory, FactorySource, LogFilterCriteria,
    LogFilterSource, TopicFilter, Topics,
};

use common::fixtures::{
    TestDb, address, pad_address_topic, parent_emission_log, test_block, test_log,
    test_transaction, topic,
};

fn pool_factory(location: ChildAddressLocation) -> Factory {
    Factory {
        address: address(0xfa),
        event_selector: topic(0x5e),
        child_address_location: location,
    }
}

fn wildcard_source(name: &str, chain_id: u64) -> LogFilterSource {
    LogFilterSource {
        name: name.into(),
        chain_id,
        criteria: LogFilterCriteria::default(),
        from_block: None,
        include_event_selectors: None,
    }
}

async fn collect_events(db: &TestDb, request: LogEventRequest) -> Vec<LogEvent> {
    let pages: Vec<_> = db
        .store
        .get_log_events(request)
        .try_collect()
        .await
        .unwrap();
    pages.into_iter().flat_map(|page| page.events).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACTORY CHILD-ADDRESS TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn children_extracted_from_topic1() {
    let db = TestDb::new().await;
    let factory = pool_factory(ChildAddressLocation::Topic1);
    let (child1, child3, child9) = (address(0xc1), address(0xc3), address(0xc9));

    let logs = vec![
        parent_emission_log(
            1,
            100,
            0,
            factory.address,
            vec![factory.event_selector, pad_address_topic(child1)],
            Bytes::new(),
        ),
        parent_emission_log(
            1,
            100,
            1,
            factory.address,
            vec![factory.event_selector, pad_address_topic(child3)],
            Bytes::new(),
        ),
        // Past the query bound; must not appear.
        parent_emission_log(
            1,
            200,
            0,
            factory.address,
            vec![factory.event_selector, pad_address_topic(child9)],
            Bytes::new(),
        ),
    ];
    db.store
        .insert_factory_child_address_logs(1, &logs)
        .await
        .unwrap();

    let pages: Vec<Vec<Address>> = db
        .store
        .get_factory_child_addresses(1, factory, U256::from(150u64), 500)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(pages, vec![vec![child1, child3]]);
}

#[tokio::test]
async fn children_extracted_from_data_offset() {
    let db = TestDb::new().await;
    let factory = pool_factory(ChildAddressLocation::Offset(32));
    let (child1, child2) = (address(0xc1), address(0xc2));

    let emission_data = |child: Address| {
        // Two 32-byte words; the child sits right-aligned in the second.
        let mut data = vec![0u8; 64];
        data[44..64].copy_from_slice(child.as_slice());
        Bytes::from(data)
    };

    let logs = vec![
        parent_emission_log(
            1,
            100,
            0,
            factory.address,
            vec![factory.event_selector],
            emission_data(child1),
        ),
        parent_emission_log(
            1,
            101,
            0,
            factory.address,
            vec![factory.event_selector],
            emission_data(child2),
        ),
    ];
    db.store
        .insert_factory_child_address_logs(1, &logs)
        .await
        .unwrap();

    let pages: Vec<Vec<Address>> = db
        .store
        .get_factory_child_addresses(1, factory, U256::from(150u64), 500)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(pages, vec![vec![child1, child2]]);
}

#[tokio::test]
async fn child_pages_are_bounded_and_never_empty() {
    let db = TestDb::new().await;
    let factory = pool_factory(ChildAddressLocation::Topic1);

    let logs: Vec<_> = (0..3u8)
        .map(|i| {
            parent_emission_log(
                1,
                100 + u64::from(i),
                0,
                factory.address,
                vec![
                    factory.event_selector,
                    pad_address_topic(address(0xc1 + i)),
                ],
                Bytes::new(),
            )
        })
        .collect();
    db.store
        .insert_factory_child_address_logs(1, &logs)
        .await
        .unwrap();

    let pages: Vec<Vec<Address>> = db
        .store
        .get_factory_child_addresses(1, factory, U256::from(1_000u64), 2)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(
        pages,
        vec![
            vec![address(0xc1), address(0xc2)],
            vec![address(0xc3)],
        ]
    );
    assert!(pages.iter().all(|page| !page.is_empty()));
}

#[tokio::test]
async fn unrelated_emissions_are_ignored() {
    let db = TestDb::new().await;
    let factory = pool_factory(ChildAddressLocation::Topic1);

    let logs = vec![
        // Wrong selector.
        parent_emission_log(
            1,
            100,
            0,
            factory.address,
            vec![topic(0x99), pad_address_topic(address(0xc1))],
            Bytes::new(),
        ),
        // Wrong emitter.
        parent_emission_log(
            1,
            100,
            1,
            address(0x01),
            vec![factory.event_selector, pad_address_topic(address(0xc2))],
            Bytes::new(),
        ),
    ];
    db.store
        .insert_factory_child_address_logs(1, &logs)
        .await
        .unwrap();

    let pages: Vec<Vec<Address>> = db
        .store
        .get_factory_child_addresses(1, factory, U256::from(1_000u64), 500)
        .try_collect()
        .await
        .unwrap();
    assert!(pages.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT REPLAY TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn replay_matches_single_topic_filter() {
    let db = TestDb::new().await;
    let wanted = topic(0x0a);
    let other = topic(0x0b);

    let block_one = test_block(1, 15_495_110, 100);
    let tx_one = test_transaction(&block_one, 0);
    let logs_one = vec![
        test_log(&block_one, &tx_one, 0, address(0xaa), vec![wanted], Bytes::new()),
        test_log(&block_one, &tx_one, 1, address(0xab), vec![other], Bytes::new()),
    ];
    db.store
        .insert_realtime_block(1, &block_one, &[tx_one], &logs_one)
        .await
        .unwrap();

    let block_two = test_block(1, 15_495_111, 200);
    let tx_two = test_transaction(&block_two, 0);
    let logs_two = vec![test_log(
        &block_two,
        &tx_two,
        0,
        address(0xac),
        vec![wanted, topic(0x33)],
        Bytes::new(),
    )];
    db.store
        .insert_realtime_block(1, &block_two, &[tx_two], &logs_two)
        .await
        .unwrap();

    let request = LogEventRequest {
        log_filters: vec![LogFilterSource {
            name: "singleTopic".into(),
            chain_id: 1,
            criteria: LogFilterCriteria {
                address: AddressFilter::Any,
                topics: Topics::try_from(vec![TopicFilter::Exact(wanted)]).unwrap(),
            },
            from_block: None,
            include_event_selectors: None,
        }],
        ..LogEventRequest::default()
    };
    let events = collect_events(&db, request).await;

    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.event_source_name == "singleTopic"));
    assert!(events.iter().all(|e| e.log.topic(0) == Some(&wanted)));
    assert_eq!(
        events[0].log.event_id(),
        format!("{}-0x0", chainstore::types::primitives::hex_b256(&block_one.hash))
    );
    // The enrichment carries the containing block and transaction.
    assert_eq!(events[1].block.number, U256::from(15_495_111u64));
    assert_eq!(events[1].transaction.block_hash, block_two.hash);
}

#[tokio::test]
async fn empty_include_selectors_match_nothing() {
    let db = TestDb::new().await;

    let block = test_block(1, 100, 100);
    let tx = test_transaction(&block, 0);
    let log = test_log(&block, &tx, 0, address(0xaa), vec![topic(0x0a)], Bytes::new());
    db.store
        .insert_realtime_block(1, &block, &[tx], &[log])
        .await
        .unwrap();

    let request = LogEventRequest {
        log_filters: vec![LogFilterSource {
            include_event_selectors: Some(vec![]),
            ..wildcard_source("muted", 1)
        }],
        ..LogEventRequest::default()
    };
    let events = collect_events(&db, request).await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn replay_orders_across_chains_and_paginates() {
    let db = TestDb::new().await;

    // Interleave timestamps across two chains, three logs per block.
    for (chain_id, number, timestamp) in [
        (1u64, 100u64, 100u64),
        (10, 100, 100),
        (1, 101, 150),
        (10, 101, 200),
    ] {
        let block = test_block(chain_id, number, timestamp);
        let tx = test_transaction(&block, 0);
        let logs: Vec<_> = (0..3u64)
            .map(|i| {
                test_log(&block, &tx, i, address(0xaa), vec![topic(0x0a)], Bytes::new())
            })
            .collect();
        db.store
            .insert_realtime_block(chain_id, &block, &[tx], &logs)
            .await
            .unwrap();
    }

    let request = LogEventRequest {
        log_filters: vec![wildcard_source("one", 1), wildcard_source("ten", 10)],
        page_size: Some(2),
        ..LogEventRequest::default()
    };
    let events = collect_events(&db, request).await;
    assert_eq!(events.len(), 12);

    let keys: Vec<_> = events
        .iter()
        .map(|e| {
            (
                e.block.timestamp,
                e.chain_id,
                e.block.number,
                e.log.log_index,
            )
        })
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);

    // Same timestamp orders by chain id.
    assert_eq!(events[0].chain_id, 1);
    assert_eq!(events[3].chain_id, 10);
}

#[tokio::test]
async fn replay_honors_time_window_and_from_block() {
    let db = TestDb::new().await;

    for (number, timestamp) in [(100u64, 100u64), (101, 200), (102, 300)] {
        let block = test_block(1, number, timestamp);
        let tx = test_transaction(&block, 0);
        let log = test_log(&block, &tx, 0, address(0xaa), vec![topic(0x0a)], Bytes::new());
        db.store
            .insert_realtime_block(1, &block, &[tx], &[log])
            .await
            .unwrap();
    }

    // Inclusive window keeps the boundary blocks.
    let request = LogEventRequest {
        from_timestamp: 100,
        to_timestamp: 200,
        log_filters: vec![wildcard_source("windowed", 1)],
        ..LogEventRequest::default()
    };
    let events = collect_events(&db, request).await;
    assert_eq!(events.len(), 2);

    // A source-level from_block trims the older log.
    let request = LogEventRequest {
        log_filters: vec![LogFilterSource {
            from_block: Some(U256::from(101u64)),
            ..wildcard_source("recent", 1)
        }],
        ..LogEventRequest::default()
    };
    let events = collect_events(&db, request).await;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.block.number >= U256::from(101u64)));
}

#[tokio::test]
async fn log_matching_several_sources_is_tagged_per_source() {
    let db = TestDb::new().await;
    let usdc = address(0x55);

    let block = test_block(1, 100, 100);
    let tx = test_transaction(&block, 0);
    let logs = vec![
        test_log(&block, &tx, 0, usdc, vec![topic(0x0a)], Bytes::new()),
        test_log(&block, &tx, 1, address(0xab), vec![topic(0x0a)], Bytes::new()),
    ];
    db.store
        .insert_realtime_block(1, &block, &[tx], &logs)
        .await
        .unwrap();

    let request = LogEventRequest {
        log_filters: vec![
            wildcard_source("all", 1),
            LogFilterSource {
                criteria: LogFilterCriteria {
                    address: AddressFilter::Exact(usdc),
                    topics: Topics::default(),
                },
                ..wildcard_source("usdc", 1)
            },
        ],
        ..LogEventRequest::default()
    };
    let events = collect_events(&db, request).await;

    let names: Vec<_> = events
        .iter()
        .map(|e| (e.log.log_index, e.event_source_name.as_str()))
        .collect();
    // The usdc log appears once per matching source, source order first.
    assert_eq!(names, vec![(0, "all"), (0, "usdc"), (1, "all")]);
}

#[tokio::test]
async fn factory_source_requires_prior_discovery() {
    let db = TestDb::new().await;
    let factory = pool_factory(ChildAddressLocation::Topic1);
    let child = address(0xc1);

    // The child is discovered at block 100.
    let emission = parent_emission_log(
        1,
        100,
        0,
        factory.address,
        vec![factory.event_selector, pad_address_topic(child)],
        Bytes::new(),
    );
    db.store
        .insert_factory_child_address_logs(1, &[emission])
        .await
        .unwrap();

    // The child emits before and after its discovery block.
    for (number, timestamp) in [(90u64, 90u64), (150, 150)] {
        let block = test_block(1, number, timestamp);
        let tx = test_transaction(&block, 0);
        let log = test_log(&block, &tx, 0, child, vec![topic(0x77)], Bytes::new());
        db.store
            .insert_realtime_block(1, &block, &[tx], &[log])
            .await
            .unwrap();
    }

    let request = LogEventRequest {
        factories: vec![FactorySource {
            name: "pools".into(),
            chain_id: 1,
            criteria: factory,
        }],
        ..LogEventRequest::default()
    };
    let events = collect_events(&db, request).await;

    // Only the emission at or past the discovery block matches.
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_source_name, "pools");
    assert_eq!(events[0].block.number, U256::from(150u64));
    assert_eq!(events[0].log.address, child);
}

#[tokio::test]
async fn replay_with_no_matching_source_is_empty() {
    let db = TestDb::new().await;

    let block = test_block(1, 100, 100);
    let tx = test_transaction(&block, 0);
    let log = test_log(&block, &tx, 0, address(0xaa), vec![topic(0x0a)], Bytes::new());
    db.store
        .insert_realtime_block(1, &block, &[tx], &[log])
        .await
        .unwrap();

    // Wrong chain: nothing matches, the stream just ends.
    let request = LogEventRequest {
        log_filters: vec![wildcard_source("elsewhere", 10)],
        ..LogEventRequest::default()
    };
    let events = collect_events(&db, request).await;
    assert!(events.is_empty());

    // Reorged data no longer replays.
    db.store.delete_realtime_data(1, U256::from(100u64)).await.unwrap();
    let request = LogEventRequest {
        log_filters: vec![wildcard_source("all", 1)],
        ..LogEventRequest::default()
    };
    let events = collect_events(&db, request).await;
    assert!(events.is_empty());
}
