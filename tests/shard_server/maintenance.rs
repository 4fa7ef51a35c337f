//! Maintenance lock: exclusivity, draining, reload, and schema revisions.

use crate::common::*;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn one_of_two_racing_clients_gets_the_lock() {
    let shard = TestShard::start();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let mut client = shard.connect();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let id = client_id(&mut client);
                barrier.wait();
                let result = client.execute(Command::MaintBegin);
                (id, client, result)
            })
        })
        .collect();
    let mut outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = outcomes.iter().filter(|(_, _, r)| r.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    let winner_id = winners[0].0;
    assert_eq!(shard.server.maintenance_owner(), winner_id);

    for (_, _, result) in outcomes.iter_mut() {
        if let Err(e) = result {
            assert_eq!(e.code(), ErrorCode::MaintenanceInProgress);
            assert!(e.is_retryable());
            assert!(e.to_string().contains(&winner_id.to_string()));
        }
    }

    // Once the winner releases, the loser can claim
    for (id, client, _) in outcomes.iter_mut() {
        if *id == winner_id {
            client.execute(Command::MaintEnd).unwrap();
        }
    }
    for (id, client, _) in outcomes.iter_mut() {
        if *id != winner_id {
            client.execute(Command::MaintBegin).unwrap();
            assert_eq!(shard.server.maintenance_owner(), *id);
        }
    }
}

#[test]
fn maintenance_waits_for_pending_transaction() {
    let shard = TestShard::start();
    let mut txn = shard.connect();
    let mut maint = shard.connect();
    let mut late = shard.connect();
    let maint_id = client_id(&mut maint);
    let before = revision(&mut txn);

    txn.execute(Command::TxnBegin).unwrap();

    let reload = thread::spawn(move || {
        let result = maint.execute(Command::CollectionCreate {
            name: "users".into(),
        });
        (maint, result)
    });

    // The maintenance client claims the lock, then blocks on the open transaction
    assert!(wait_until(Duration::from_secs(5), || {
        shard.server.maintenance_owner() == maint_id
    }));
    thread::sleep(Duration::from_millis(50));
    assert!(!reload.is_finished());
    assert_eq!(shard.server.schema().revision(), before);

    // New transactions are refused while it waits
    assert_eq!(
        remote_code(late.execute(Command::TxnBegin)),
        ErrorCode::MaintenanceInProgress
    );

    txn.execute(Command::TxnEnd).unwrap();
    let (_, result) = reload.join().unwrap();
    assert_eq!(result.unwrap(), Output::Revision(before + 1));
    assert_eq!(shard.server.maintenance_owner(), 0);

    late.execute(Command::TxnBegin).unwrap();
    late.execute(Command::TxnEnd).unwrap();
}

#[test]
fn drain_timeout_is_retryable_and_releases_lock() {
    let shard = TestShard::start_with(ShardConfig {
        drain_timeout_ms: 50,
        ..ShardConfig::default()
    });
    let mut txn = shard.connect();
    let mut maint = shard.connect();

    txn.execute(Command::TxnBegin).unwrap();
    let err = maint
        .execute(Command::CollectionCreate { name: "c".into() })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Busy);
    assert!(err.is_retryable());
    assert_eq!(shard.server.maintenance_owner(), 0);
    assert_eq!(shard.server.schema().revision(), 1);

    // Same outcome for an explicit session
    assert_eq!(remote_code(maint.execute(Command::MaintBegin)), ErrorCode::Busy);
    assert_eq!(shard.server.maintenance_owner(), 0);

    txn.execute(Command::TxnEnd).unwrap();
    assert_eq!(create_collection(&mut maint, "c"), 2);
}

#[test]
fn every_reload_bumps_revision_and_stales_clients() {
    let shard = TestShard::start();
    let mut reader = shard.connect();
    let mut admin = shard.connect();

    let seen = revision(&mut reader);
    assert_eq!(
        reader.execute_at(seen, Command::Ping).unwrap(),
        Output::Pong
    );

    assert_eq!(create_collection(&mut admin, "users"), seen + 1);

    let err = reader.execute_at(seen, Command::DocCount { collection: "users".into() }).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SchemaChanged);
    assert!(err.is_retryable());

    // Refresh and retry
    let current = revision(&mut reader);
    assert_eq!(current, seen + 1);
    assert_eq!(
        reader
            .execute_at(current, Command::DocCount { collection: "users".into() })
            .unwrap(),
        Output::Count(0)
    );
}

#[test]
fn failed_maintenance_still_reloads() {
    let shard = TestShard::start();
    let mut admin = shard.connect();
    let before = revision(&mut admin);

    assert_eq!(
        remote_code(admin.execute(Command::CollectionDrop { name: "missing".into() })),
        ErrorCode::CollectionNotFound
    );
    assert_eq!(revision(&mut admin), before + 1);
    assert_eq!(shard.server.maintenance_owner(), 0);
}

#[test]
fn maintenance_session_runs_schema_and_data_commands() {
    let shard = TestShard::start();
    let mut admin = shard.connect();
    let mut other = shard.connect();
    let admin_id = client_id(&mut admin);

    admin.execute(Command::MaintBegin).unwrap();
    // Idempotent
    admin.execute(Command::MaintBegin).unwrap();
    assert_eq!(
        remote_code(admin.execute(Command::TxnBegin)),
        ErrorCode::MaintenanceInProgress
    );

    create_collection(&mut admin, "users");
    admin
        .execute(Command::IndexCreate {
            collection: "users".into(),
            path: "address.city".into(),
        })
        .unwrap();
    let id = insert(&mut admin, "users", json!({"address": {"city": "Oslo"}})).unwrap();
    assert_eq!(shard.server.pending_transactions(), 0);
    assert_eq!(shard.server.maintenance_owner(), admin_id);

    // Everyone else waits, including implicit transactions
    assert_eq!(
        remote_code(insert(&mut other, "users", json!({}))),
        ErrorCode::MaintenanceInProgress
    );
    assert_eq!(
        remote_code(other.execute(Command::CollectionCreate { name: "x".into() })),
        ErrorCode::MaintenanceInProgress
    );

    admin.execute(Command::MaintEnd).unwrap();
    assert_eq!(
        remote_code(admin.execute(Command::MaintEnd)),
        ErrorCode::MaintenanceNotHeld
    );

    assert_eq!(
        other
            .execute(Command::IndexLookup {
                collection: "users".into(),
                path: "address.city".into(),
                value: json!("Oslo"),
            })
            .unwrap(),
        Output::DocIds(vec![id])
    );
    match other.execute(Command::Schema).unwrap() {
        Output::Schema(info) => {
            assert_eq!(info.collections.get("users"), Some(&vec!["address.city".to_string()]));
        }
        other => panic!("unexpected output: {:?}", other),
    }
}

#[test]
fn rename_and_drop_are_visible_after_reload() {
    let shard = TestShard::start();
    let mut admin = shard.connect();
    create_collection(&mut admin, "a");
    insert(&mut admin, "a", json!({"k": 1})).unwrap();

    admin
        .execute(Command::CollectionRename {
            from: "a".into(),
            to: "b".into(),
        })
        .unwrap();
    assert_eq!(count(&mut admin, "b"), 1);
    assert_eq!(
        remote_code(admin.execute(Command::DocCount { collection: "a".into() })),
        ErrorCode::CollectionNotFound
    );

    admin
        .execute(Command::CollectionDrop { name: "b".into() })
        .unwrap();
    assert!(!shard.server.schema().has_collection("b"));
}

#[test]
fn concurrent_writers_and_reloads_lose_nothing() {
    let shard = TestShard::start();
    let mut admin = shard.connect();
    create_collection(&mut admin, "events");

    const WRITERS: usize = 4;
    const PER_WRITER: usize = 50;

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let mut client = shard.connect();
            thread::spawn(move || {
                let mut written = 0;
                while written < PER_WRITER {
                    match insert(&mut client, "events", json!({"w": w, "i": written})) {
                        Ok(_) => written += 1,
                        Err(e) if e.is_retryable() => thread::yield_now(),
                        Err(e) => panic!("insert failed: {}", e),
                    }
                }
            })
        })
        .collect();

    for i in 0..10 {
        loop {
            match admin.execute(Command::IndexCreate {
                collection: "events".into(),
                path: format!("f{}", i),
            }) {
                Ok(_) => break,
                Err(e) if e.is_retryable() => thread::yield_now(),
                Err(e) => panic!("index create failed: {}", e),
            }
        }
    }

    for w in writers {
        w.join().unwrap();
    }
    assert_eq!(count(&mut admin, "events"), (WRITERS * PER_WRITER) as u64);
    assert_eq!(shard.server.pending_transactions(), 0);
    assert_eq!(shard.server.schema().index_paths("events").map(|p| p.len()), Some(10));
}
