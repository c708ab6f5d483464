// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Strand daemon: configuration, wire protocol, packet dispatch and process lifecycle

pub mod config;
pub mod handler;
pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use config::{ConfigError, DaemonConfig, BASE_DIR_ENV};
pub use handler::{PacketHandler, ResponseSink};
pub use lifecycle::{startup, Daemon, LifecycleError};
pub use protocol::{ErrorKind, ProtocolError, Request, Response};
pub use server::{handle_connection, ServerError};
