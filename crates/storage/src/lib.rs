// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! strand-storage: persisted per-tenant directories
//!
//! ## Layout
//!
//! ```text
//! base_dir/
//! ├── tmp/                               staging for create, trash for remove
//! ├── cluster_1.epoch.json               fencing epoch stamped for cluster 1
//! └── cluster_1_tenant_1001/
//!     ├── meta.json                      tenant record
//!     └── arb_7.json                     arbitration instance 7
//! ```
//!
//! Every record is checksummed JSON. Directories only ever appear or
//! disappear through a rename, so recovery never observes a half-built
//! directory and never resurrects one whose removal had started.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod record;
pub mod tenant_dir;

pub use record::{read_record, write_record};
pub use tenant_dir::{
    ArbitrationRecord, DirError, InitialMembers, Recovered, RecoveredTenant, TenantDirStore,
    TenantMeta,
};
