//! Packet handling specs
//!
//! Every packet is answered exactly once under its own token.

use crate::prelude::*;
use std::sync::Mutex;
use strand_daemon::{ErrorKind, PacketHandler, Response, ResponseSink};

#[derive(Default)]
struct Outbox(Mutex<Vec<(u64, Vec<u8>)>>);

impl ResponseSink for Outbox {
    fn respond(&self, token: u64, buf: Vec<u8>) {
        self.0.lock().unwrap().push((token, buf));
    }
}

fn send(handler: &PacketHandler, outbox: &Outbox, token: u64, request: serde_json::Value) -> Option<Response> {
    handler.handle_packet(&serde_json::to_vec(&request).unwrap(), token, outbox);
    let (got, buf) = outbox.0.lock().unwrap().pop().unwrap();
    assert_eq!(got, token);
    if buf.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&buf).unwrap())
    }
}

#[test]
fn json_clients_drive_the_registry() {
    let node = Node::new();
    let handler = PacketHandler::new(Arc::new(node.boot()), Address::new("10.0.0.9:2882"));
    let outbox = Outbox::default();
    let key = serde_json::json!({ "cluster_id": 5, "tenant_id": 1001 });

    let created = send(&handler, &outbox, 1, serde_json::json!({ "type": "create_env", "key": key }));
    assert_eq!(created, Some(Response::Ok));

    let meta = send(&handler, &outbox, 2, serde_json::json!({ "type": "get_cluster_meta", "cluster_id": 5 }));
    match meta {
        Some(Response::ClusterMeta { info }) => assert_eq!(info.tenant_count, 1),
        other => panic!("unexpected {:?}", other),
    }

    let arb = send(
        &handler,
        &outbox,
        3,
        serde_json::json!({ "type": "create_arbitration", "key": key, "instance_id": 2, "role": "primary" }),
    );
    assert_eq!(arb, Some(Response::Ok));

    let removed = send(&handler, &outbox, 4, serde_json::json!({ "type": "remove_env", "key": key }));
    assert_eq!(removed, Some(Response::Ok));

    let missing = send(&handler, &outbox, 5, serde_json::json!({ "type": "remove_env", "key": key }));
    assert!(matches!(
        missing,
        Some(Response::Error {
            kind: ErrorKind::EntryNotExist,
            ..
        })
    ));
}

#[test]
fn malformed_packets_get_an_empty_reply() {
    let node = Node::new();
    let handler = PacketHandler::new(Arc::new(node.boot()), Address::new("10.0.0.9:2882"));
    let outbox = Outbox::default();

    let reply = send(&handler, &outbox, 9, serde_json::json!({ "type": "create_env" }));
    assert_eq!(reply, None);

    let ping = send(&handler, &outbox, 10, serde_json::json!({ "type": "ping" }));
    assert_eq!(ping, Some(Response::Pong));
}
