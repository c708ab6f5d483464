// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Log-stream environments, their registry, and the background maintenance loop

mod arbitration;
mod config;
mod environment;
mod error;
mod maintenance;
mod registry;
mod stream;

pub use arbitration::ArbitrationInstance;
pub use config::{MaintenanceConfig, StreamConfig};
pub use environment::{AdmissionMode, LogStreamEnvironment};
pub use error::EnvError;
pub use maintenance::{
    pacing_sleep, DueWork, LoopError, LoopState, LoopStats, Maintained, MaintenanceLoop,
    MaintenanceSchedule,
};
pub use registry::{EnvGuard, EnvironmentRegistry};
pub use stream::{LogStream, StreamRole};
