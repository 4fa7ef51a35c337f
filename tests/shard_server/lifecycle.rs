//! Server lifecycle: startup, stale sockets, shutdown, worker accounting.

use crate::common::*;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::time::Duration;
use strata_shard::socket_path_for;
use tempfile::TempDir;

#[test]
fn run_then_shutdown_returns_ok_and_removes_socket() {
    let mut shard = TestShard::start();
    let socket = shard.socket_path();
    assert!(socket.exists());

    assert!(shard.stop().is_ok());
    assert!(!socket.exists());
    assert!(shard.server.is_shutting_down());
}

#[test]
fn stale_socket_file_is_replaced() {
    let dir = TempDir::new().unwrap();
    let stale = socket_path_for(dir.path(), 0);

    // A previous instance that died without cleaning up leaves its socket
    // file behind with nobody listening
    drop(UnixListener::bind(&stale).unwrap());
    assert!(std::fs::metadata(&stale).unwrap().file_type().is_socket());
    assert!(UnixStream::connect(&stale).is_err());

    let shard = TestShard::start_in(dir, 0, 1, ShardConfig::default());
    let mut client = shard.connect();
    assert_eq!(client.execute(Command::Ping).unwrap(), Output::Pong);
}

#[test]
fn open_failure_is_returned_from_run() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("0"), b"not a directory").unwrap();
    let server = Arc::new(ShardServer::new(0, 1, dir.path()));

    assert!(matches!(server.run(), Err(ShardError::Open { .. })));
    assert!(!server.socket_path().exists());
}

#[test]
fn shutdown_keeps_serving_existing_connections() {
    let mut shard = TestShard::start();
    let mut client = shard.connect();
    create_collection(&mut client, "users");

    assert!(shard.stop().is_ok());

    // New connections are refused
    assert!(ShardClient::connect(shard.socket_path()).is_err());

    // The connected client is still served
    assert_eq!(client.execute(Command::Ping).unwrap(), Output::Pong);
    insert(&mut client, "users", serde_json::json!({"name": "ada"})).unwrap();
    assert_eq!(count(&mut client, "users"), 1);

    assert!(!shard.server.wait_for_workers(Duration::from_millis(20)));
    drop(client);
    assert!(shard.server.wait_for_workers(Duration::from_secs(5)));
}

#[test]
fn second_shutdown_is_harmless() {
    let mut shard = TestShard::start();
    assert!(shard.stop().is_ok());
    shard.server.shutdown();
    assert!(shard.server.is_shutting_down());
}

#[test]
fn client_can_request_shutdown() {
    let mut shard = TestShard::start();
    let mut client = shard.connect();

    assert_eq!(client.execute(Command::Shutdown).unwrap(), Output::Unit);
    assert!(shard.join().is_ok());
    assert!(!shard.socket_path().exists());
}

#[test]
fn hello_hands_out_increasing_ids() {
    let dir = TempDir::new().unwrap();
    let shard = TestShard::start_in(dir, 2, 4, ShardConfig::default());

    let mut first = shard.connect();
    let mut second = shard.connect();
    let first_id = client_id(&mut first);
    let second_id = client_id(&mut second);
    assert!(first_id > 0);
    assert!(second_id > first_id);

    match first.execute(Command::Hello).unwrap() {
        Output::Hello {
            rank,
            total_shards,
            protocol_version,
            client_id,
        } => {
            assert_eq!((rank, total_shards), (2, 4));
            assert_eq!(protocol_version, strata_wire::PROTOCOL_VERSION);
            assert_eq!(client_id, first_id);
        }
        other => panic!("unexpected output: {:?}", other),
    }
}

#[test]
fn status_tracks_live_workers() {
    let shard = TestShard::start();
    let mut a = shard.connect();
    let mut b = shard.connect();
    b.execute(Command::Ping).unwrap();

    match a.execute(Command::Status).unwrap() {
        Output::Status(status) => {
            assert_eq!(status.live_workers, 2);
            assert_eq!(status.pending_transactions, 0);
            assert_eq!(status.maintenance_owner, 0);
            assert_eq!(status.revision, 1);
            assert!(!status.shutting_down);
        }
        other => panic!("unexpected output: {:?}", other),
    }

    drop(b);
    assert!(wait_until(Duration::from_secs(5), || shard.server.live_workers() == 1));
}

#[test]
fn data_survives_restart() {
    let shard = TestShard::start();
    let mut client = shard.connect();
    create_collection(&mut client, "users");
    let id = insert(&mut client, "users", serde_json::json!({"n": 1})).unwrap();
    drop(client);

    let dir = shard.into_workspace();

    let restarted = TestShard::start_in(dir, 0, 1, ShardConfig::default());
    let mut client = restarted.connect();
    assert_eq!(
        client
            .execute(Command::DocRead {
                collection: "users".into(),
                id
            })
            .unwrap(),
        Output::Document(serde_json::json!({"n": 1}))
    );
}

#[test]
fn committed_writes_survive_clean_shutdown_without_reload() {
    let mut shard = TestShard::start();
    let mut client = shard.connect();
    create_collection(&mut client, "users");
    let revision_after_setup = shard.server.schema().revision();

    // Implicit transactions
    for n in 0..3 {
        insert(&mut client, "users", serde_json::json!({"n": n})).unwrap();
    }
    // Explicit transaction
    client.execute(Command::TxnBegin).unwrap();
    insert(&mut client, "users", serde_json::json!({"n": 3})).unwrap();
    client.execute(Command::TxnEnd).unwrap();
    drop(client);

    assert!(shard.stop().is_ok());
    assert!(shard.server.wait_for_workers(Duration::from_secs(5)));
    assert_eq!(shard.server.schema().revision(), revision_after_setup);

    // The server (like the binary's signal thread) still holds its handle
    let on_disk = strata_docstore::DocDb::open(shard.server.database_path()).unwrap();
    assert_eq!(on_disk.count("users").unwrap(), 4);
}
