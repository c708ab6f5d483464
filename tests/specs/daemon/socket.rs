//! Daemon socket specs
//!
//! A started daemon answers framed requests on its Unix socket and leaves
//! nothing behind after shutdown.

use crate::prelude::*;
use strand_daemon::protocol::{decode, encode, read_message, write_message};
use strand_daemon::{handle_connection, startup, DaemonConfig, Request, Response};
use tokio::net::UnixStream;

#[tokio::test]
async fn daemon_serves_requests_over_its_socket() {
    let node = Node::new();
    let config = DaemonConfig::for_base_dir(node.path());
    let mut daemon = startup(&config).await.unwrap();

    let handler = Arc::clone(&daemon.handler);
    let listener = &daemon.listener;
    let client = async {
        let stream = UnixStream::connect(config.socket_path()).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        for (request, expected) in [
            (
                Request::CreateEnv {
                    key: EnvKey::new(1, 1001),
                },
                Response::Ok,
            ),
            (Request::Ping, Response::Pong),
        ] {
            let bytes = encode(&request).unwrap();
            write_message(&mut writer, &bytes).await.unwrap();
            let reply = read_message(&mut reader).await.unwrap();
            assert_eq!(decode::<Response>(&reply).unwrap(), expected);
        }
    };
    let server = async {
        let (stream, _) = listener.accept().await.unwrap();
        handle_connection(handler, stream).await.unwrap();
    };
    tokio::join!(client, server);

    assert!(daemon.registry.get(EnvKey::new(1, 1001)).is_ok());
    daemon.shutdown().unwrap();
    assert!(!config.socket_path().exists());
}
