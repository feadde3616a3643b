/// Registry tests
///
/// Insertion order, numbering, session lookup, removal and change events
/// Run with: cargo test --test registry_tests

use pipetable::{
    ChangeListener, RecordHandle, RegistryChange, RegistryConfig, RegistryError, SessionId,
    TransactionRecord, TransactionRegistry,
};
use std::sync::{Arc, Mutex};

fn record(session: u64) -> RecordHandle {
    TransactionRecord::builder(SessionId(session))
        .host(format!("host{}", session))
        .build()
}

fn record_events(registry: &TransactionRegistry) -> Arc<Mutex<Vec<RegistryChange>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    registry.subscribe(move |change: &RegistryChange| {
        sink.lock().unwrap().push(change.clone());
    });
    events
}

#[test]
fn test_rows_follow_insertion_order() {
    let registry = TransactionRegistry::new();
    let added: Vec<RecordHandle> = (0..10).map(|i| record(i % 3)).collect();

    for record in &added {
        registry.add(Arc::clone(record)).unwrap();
    }

    assert_eq!(registry.count(), added.len());
    for (row, expected) in added.iter().enumerate() {
        let actual = registry.record_at(row).unwrap();
        assert!(Arc::ptr_eq(&actual, expected), "row {} out of order", row);
        assert_eq!(actual.sequence_number(), Some(row as u64 + 1));
    }
}

#[test]
fn test_record_at_out_of_range_is_absent() {
    let registry = TransactionRegistry::new();
    assert!(registry.record_at(0).is_none());

    registry.add(record(1)).unwrap();
    assert!(registry.record_at(1).is_none());
    assert!(registry.record_at(usize::MAX).is_none());
}

#[test]
fn test_lookup_returns_latest_for_session() {
    let registry = TransactionRegistry::new();
    let first = record(7);
    let second = record(7);

    registry.add(Arc::clone(&first)).unwrap();
    assert!(Arc::ptr_eq(&registry.lookup_by_session(SessionId(7)).unwrap(), &first));

    registry.add(Arc::clone(&second)).unwrap();
    assert!(Arc::ptr_eq(&registry.lookup_by_session(SessionId(7)).unwrap(), &second));

    assert!(registry.lookup_by_session(SessionId(8)).is_none());
}

#[test]
fn test_insert_event_row_matches_post_add_count() {
    let registry = TransactionRegistry::new();
    let events = record_events(&registry);

    for _ in 0..5 {
        let sequence = registry.add(record(1)).unwrap();
        let last = events.lock().unwrap().last().cloned().unwrap();
        assert_eq!(
            last,
            RegistryChange::Inserted {
                row: registry.count() - 1,
                sequence
            }
        );
    }
}

#[test]
fn test_listener_reads_post_insert_state() {
    let registry = Arc::new(TransactionRegistry::new());
    let observed = Arc::new(Mutex::new(Vec::new()));

    {
        let reader = Arc::downgrade(&registry);
        let observed = Arc::clone(&observed);
        registry.subscribe(move |change: &RegistryChange| {
            if let (RegistryChange::Inserted { row, .. }, Some(registry)) =
                (change, reader.upgrade())
            {
                let visible = registry.record_at(*row).map(|r| r.session_id());
                observed.lock().unwrap().push((registry.count(), visible));
            }
        });
    }

    registry.add(record(4)).unwrap();
    registry.add(record(5)).unwrap();

    assert_eq!(
        *observed.lock().unwrap(),
        vec![(1, Some(SessionId(4))), (2, Some(SessionId(5)))]
    );
}

#[test]
fn test_duplicate_add_rejected() {
    let registry = TransactionRegistry::new();
    let once = record(1);
    registry.add(Arc::clone(&once)).unwrap();

    match registry.add(Arc::clone(&once)) {
        Err(RegistryError::DuplicateRecord { sequence }) => assert_eq!(sequence, 1),
        other => panic!("expected duplicate rejection, got {:?}", other),
    }

    // Still rejected after the record has been removed.
    registry.remove_all().unwrap();
    assert!(registry.add(once).is_err());
    assert_eq!(registry.count(), 0);
}

#[test]
fn test_remove_all_behaves_like_fresh_registry() {
    let registry = TransactionRegistry::new();
    for session in 0..4 {
        registry.add(record(session)).unwrap();
    }
    let events = record_events(&registry);

    assert_eq!(registry.remove_all().unwrap(), 4);

    assert_eq!(registry.count(), 0);
    assert!(registry.is_empty());
    assert!(registry.record_at(0).is_none());
    for session in 0..4 {
        assert!(registry.lookup_by_session(SessionId(session)).is_none());
    }
    assert_eq!(*events.lock().unwrap(), vec![RegistryChange::Reset]);
}

#[test]
fn test_sequence_not_reused_after_reset() {
    let registry = TransactionRegistry::new();
    registry.add(record(1)).unwrap();
    registry.add(record(2)).unwrap();
    registry.remove_all().unwrap();

    assert_eq!(registry.add(record(3)).unwrap(), 3);
    assert_eq!(registry.record_at(0).unwrap().sequence_number(), Some(3));
}

#[test]
fn test_remove_items_reports_coalesced_ranges() {
    let registry = TransactionRegistry::new();
    // rows: 0:s1 1:s2 2:s2 3:s3 4:s1 5:s4
    for session in [1, 2, 2, 3, 1, 4] {
        registry.add(record(session)).unwrap();
    }
    let events = record_events(&registry);

    let removed = registry
        .remove_items([SessionId(2), SessionId(4)])
        .unwrap();

    assert_eq!(removed, 3);
    assert_eq!(registry.count(), 3);
    assert!(registry.lookup_by_session(SessionId(2)).is_none());
    assert!(registry.lookup_by_session(SessionId(4)).is_none());

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![RegistryChange::Removed {
            ranges: vec![1..3, 5..6]
        }]
    );

    // Observer-side remapping of the old rows that survived.
    let change = &events[0];
    let survivors: Vec<Option<usize>> = (0..6).map(|row| change.remap_row(row)).collect();
    assert_eq!(
        survivors,
        vec![Some(0), None, None, Some(1), Some(2), None]
    );
    for (old_row, new_row) in [(0, 0), (3, 1), (4, 2)] {
        let record = registry.record_at(new_row).unwrap();
        assert_eq!(record.sequence_number(), Some(old_row as u64 + 1));
    }
}

#[test]
fn test_remove_items_keeps_other_sessions_indexed() {
    let registry = TransactionRegistry::new();
    let keeper = record(10);
    registry.add(record(11)).unwrap();
    registry.add(Arc::clone(&keeper)).unwrap();
    registry.add(record(11)).unwrap();

    registry.remove_items([SessionId(11)]).unwrap();

    assert_eq!(registry.count(), 1);
    assert!(Arc::ptr_eq(
        &registry.lookup_by_session(SessionId(10)).unwrap(),
        &keeper
    ));
}

#[test]
fn test_events_follow_mutation_order() {
    let registry = TransactionRegistry::new();
    let events = record_events(&registry);

    registry.add(record(1)).unwrap();
    registry.add(record(2)).unwrap();
    registry.remove_items([SessionId(1)]).unwrap();
    registry.add(record(3)).unwrap();
    registry.remove_all().unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            RegistryChange::Inserted { row: 0, sequence: 1 },
            RegistryChange::Inserted { row: 1, sequence: 2 },
            RegistryChange::Removed { ranges: vec![0..1] },
            RegistryChange::Inserted { row: 1, sequence: 3 },
            RegistryChange::Reset,
        ]
    );
}

#[test]
fn test_unsubscribed_listener_stops_receiving() {
    let registry = TransactionRegistry::new();
    let hits = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&hits);
    let id = registry.subscribe(move |_: &RegistryChange| {
        *counter.lock().unwrap() += 1;
    });

    registry.add(record(1)).unwrap();
    assert!(registry.unsubscribe(id));
    registry.add(record(2)).unwrap();

    assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn test_field_updates_visible_after_insert() {
    let registry = TransactionRegistry::new();
    let pending = record(3);
    registry.add(Arc::clone(&pending)).unwrap();

    assert_eq!(registry.record_at(0).unwrap().result_code(), None);
    pending.set_result_code(502);
    assert_eq!(registry.record_at(0).unwrap().result_code(), Some(502));
    assert_eq!(
        registry.lookup_by_session(SessionId(3)).unwrap().result_code(),
        Some(502)
    );
}

#[tokio::test]
async fn test_feed_delivers_events_in_order() {
    let registry = TransactionRegistry::new();
    let mut feed = registry.feed();

    registry.add(record(1)).unwrap();
    registry.remove_items([SessionId(1)]).unwrap();
    registry.remove_all().unwrap();

    assert_eq!(
        feed.recv().await.unwrap(),
        RegistryChange::Inserted { row: 0, sequence: 1 }
    );
    assert_eq!(
        feed.recv().await.unwrap(),
        RegistryChange::Removed { ranges: vec![0..1] }
    );
    assert_eq!(feed.recv().await.unwrap(), RegistryChange::Reset);
}

struct PanicsOnInsert;

impl ChangeListener for PanicsOnInsert {
    fn on_change(&self, change: &RegistryChange) {
        if let RegistryChange::Inserted { .. } = change {
            panic!("observer failure");
        }
    }
}

#[test]
fn test_panicking_listener_keeps_registry_writable() {
    let registry = TransactionRegistry::new();
    registry.subscribe(PanicsOnInsert);
    let events = record_events(&registry);
    let mut feed = registry.feed();

    assert_eq!(registry.add(record(1)).unwrap(), 1);
    assert_eq!(registry.add(record(2)).unwrap(), 2);
    assert_eq!(registry.remove_items([SessionId(1)]).unwrap(), 1);
    assert_eq!(registry.remove_all().unwrap(), 1);

    assert_eq!(events.lock().unwrap().len(), 4);
    assert_eq!(
        feed.try_recv().unwrap(),
        RegistryChange::Inserted { row: 0, sequence: 1 }
    );
}

#[test]
fn test_eviction_and_insert_are_one_step() {
    let registry =
        Arc::new(TransactionRegistry::with_config(RegistryConfig::new().max_records(3)).unwrap());
    let sizes = Arc::new(Mutex::new(Vec::new()));

    {
        let reader = Arc::downgrade(&registry);
        let sizes = Arc::clone(&sizes);
        registry.subscribe(move |change: &RegistryChange| {
            if let (RegistryChange::Removed { .. }, Some(registry)) = (change, reader.upgrade()) {
                sizes.lock().unwrap().push(registry.count());
            }
        });
    }

    for session in 0..6 {
        registry.add(record(session)).unwrap();
    }

    // The eviction event already observes the appended row.
    assert_eq!(*sizes.lock().unwrap(), vec![3, 3, 3]);
    assert_eq!(registry.record_at(0).unwrap().session_id(), SessionId(3));
}
