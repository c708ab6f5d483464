// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! strand-core: shared vocabulary of the replicated-log core
//!
//! This crate provides:
//! - Identifiers for clusters, tenants, log streams and arbitration instances
//! - Fencing epochs and the per-cluster metadata record
//! - The chained checksum accumulator consulted on every log entry
//! - A clock abstraction for time-driven maintenance

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod checksum;
pub mod clock;
pub mod epoch;
pub mod id;
pub mod member;

pub use checksum::{combine, ChecksumChain, ChecksumError};
pub use clock::{Clock, FakeClock, SystemClock};
pub use epoch::{ClusterMetaInfo, Epoch};
pub use id::{Address, ClusterId, EnvKey, InstanceId, StreamId, TenantId, TenantRole};
pub use member::{MemberList, MAX_REPLICA_NUM};
