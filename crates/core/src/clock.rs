// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monotonic time source for maintenance cadences and log-block ageing

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A source of monotonic instants
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    fn since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Wall clock backed by [`Instant::now`]
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock; clones share the same instant
#[derive(Clone, Debug)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    /// Advance in milliseconds, the unit most cadences are expressed in
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
