// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunables for maintenance cadences and log-block sealing

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the maintenance loop
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Target spacing between loop iterations
    #[serde(with = "humantime_serde")]
    pub target_period: Duration,
    /// Minimum spacing between state-transition sweeps
    #[serde(with = "humantime_serde")]
    pub state_switch_interval: Duration,
    /// Minimum spacing between freeze-mode checks
    #[serde(with = "humantime_serde")]
    pub freeze_mode_interval: Duration,
    /// How often iteration cost is summarised in the log
    #[serde(with = "humantime_serde")]
    pub summary_log_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            target_period: Duration::from_millis(5),
            state_switch_interval: Duration::from_millis(10),
            freeze_mode_interval: Duration::from_millis(1000),
            summary_log_interval: Duration::from_secs(5),
        }
    }
}

impl MaintenanceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_period(mut self, period: Duration) -> Self {
        self.target_period = period;
        self
    }

    pub fn with_state_switch_interval(mut self, interval: Duration) -> Self {
        self.state_switch_interval = interval;
        self
    }

    pub fn with_freeze_mode_interval(mut self, interval: Duration) -> Self {
        self.freeze_mode_interval = interval;
        self
    }

    pub fn with_summary_log_interval(mut self, interval: Duration) -> Self {
        self.summary_log_interval = interval;
        self
    }
}

/// Thresholds at which an open log block is frozen
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub max_block_bytes: u64,
    #[serde(with = "humantime_serde")]
    pub max_block_age: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_block_bytes: 64 * 1024 * 1024,
            max_block_age: Duration::from_secs(1),
        }
    }
}

impl StreamConfig {
    pub fn with_max_block_bytes(mut self, bytes: u64) -> Self {
        self.max_block_bytes = bytes;
        self
    }

    pub fn with_max_block_age(mut self, age: Duration) -> Self {
        self.max_block_age = age;
        self
    }
}
