// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing epochs and per-cluster metadata

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic `(term, counter)` pair used to fence stale metadata updates
///
/// Ordering is lexicographic: a higher term always wins, and within a term
/// the counter decides.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Epoch {
    pub term: u64,
    pub counter: u64,
}

impl Epoch {
    pub fn new(term: u64, counter: u64) -> Self {
        Self { term, counter }
    }

    /// Same term, next counter
    pub fn next_counter(self) -> Self {
        Self {
            term: self.term,
            counter: self.counter.saturating_add(1),
        }
    }

    /// Next term, counter restarts at zero
    pub fn next_term(self) -> Self {
        Self {
            term: self.term.saturating_add(1),
            counter: 0,
        }
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.term, self.counter)
    }
}

/// Aggregate state of one cluster as seen by the environment registry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetaInfo {
    /// Number of live environments registered for the cluster
    pub tenant_count: u64,
    pub epoch: Epoch,
}

impl ClusterMetaInfo {
    /// Record one more environment and advance the epoch
    pub fn tenant_added(self) -> Self {
        Self {
            tenant_count: self.tenant_count.saturating_add(1),
            epoch: self.epoch.next_counter(),
        }
    }

    /// Record one fewer environment and advance the epoch
    pub fn tenant_removed(self) -> Self {
        Self {
            tenant_count: self.tenant_count.saturating_sub(1),
            epoch: self.epoch.next_counter(),
        }
    }

    pub fn with_epoch(self, epoch: Epoch) -> Self {
        Self { epoch, ..self }
    }
}

#[cfg(test)]
#[path = "epoch_tests.rs"]
mod tests;
