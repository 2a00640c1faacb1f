//! Test harness: a client wired to an in-memory gateway.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::client::{Client, ClientOptions};
use crate::session::Session;
use crate::transport::{MemoryPeer, MemoryServer, MemoryTransport};

// ============================================================================
// Setup
// ============================================================================

/// Installs a test subscriber honouring `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default options for memory-backed clients.
pub(crate) fn options() -> ClientOptions {
    ClientOptions::new("ws://janus.test:8188")
}

/// Builds a disconnected client over a memory transport.
pub(crate) fn memory_client(options: ClientOptions) -> (Client, Arc<MemoryTransport>, MemoryServer) {
    init_tracing();
    let (transport, server) = MemoryTransport::pair();
    let client = Client::builder()
        .options(options)
        .transport(Arc::clone(&transport))
        .build()
        .expect("client");
    (client, transport, server)
}

/// Builds a connected client and returns the gateway side of its link.
pub(crate) async fn connected(
    options: ClientOptions,
) -> (Client, MemoryPeer, Arc<MemoryTransport>, MemoryServer) {
    let (client, transport, mut server) = memory_client(options);
    client.connect().await.expect("connect");
    let peer = server.accept().await.expect("peer");
    (client, peer, transport, server)
}

// ============================================================================
// Gateway Helpers
// ============================================================================

/// Answers `request` with a frame of `kind`, merging `extra` into it.
pub(crate) fn reply(peer: &MemoryPeer, request: &Value, kind: &str, extra: Value) {
    let mut frame = json!({ "janus": kind, "transaction": request["transaction"] });
    if let (Some(frame), Some(extra)) = (frame.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            frame.insert(key.clone(), value.clone());
        }
    }
    assert!(peer.send(frame));
}

/// Answers a plugin message with an `ack` followed by an `event` carrying
/// `data` (and `jsep`, if any).
pub(crate) fn reply_plugin(peer: &MemoryPeer, request: &Value, plugin: &str, data: Value, jsep: Option<Value>) {
    reply(peer, request, "ack", json!({ "session_id": request["session_id"] }));

    let mut extra = json!({
        "session_id": request["session_id"],
        "sender": request["handle_id"],
        "plugindata": { "plugin": plugin, "data": data }
    });
    if let (Some(jsep), Some(extra)) = (jsep, extra.as_object_mut()) {
        extra.insert("jsep".into(), jsep);
    }
    reply(peer, request, "event", extra);
}

/// Creates a session with the given ID through the gateway.
pub(crate) async fn create_session(client: &Client, peer: &mut MemoryPeer, id: u64) -> Session {
    let (session, ()) = tokio::join!(client.create_session(), async {
        let request = peer.recv().await.expect("create request");
        assert_eq!(request["janus"], "create");
        reply(peer, &request, "success", json!({ "data": { "id": id } }));
    });
    session.expect("session")
}

/// Polls `condition` until it holds.
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
