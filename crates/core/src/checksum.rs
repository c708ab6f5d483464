// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chained checksum accumulator for log entries
//!
//! Every entry appended to a log stream carries its own checksum. The chain
//! folds those into a running accumulator so that each entry is verified
//! against everything before it:
//!
//! ```text
//! accum_n = combine(accum_{n-1}, entry_checksum_n)
//! ```
//!
//! Two accumulators advance independently over the same combining function:
//! - `accum` on the write path, producing the value stamped on each entry
//! - `verify` on the replication path, checking values stamped elsewhere
//!
//! A replica detects divergence between what it generated and what it
//! received as soon as the two disagree.

use crate::id::StreamId;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Fold one entry checksum into a running accumulator.
///
/// XXH3-64 over the little-endian entry checksum, seeded with the previous
/// accumulator. Order-sensitive: `combine(combine(a, x), y)` differs from
/// `combine(combine(a, y), x)`.
pub fn combine(accum: u64, entry_checksum: u64) -> u64 {
    xxh3_64_with_seed(&entry_checksum.to_le_bytes(), accum)
}

/// Errors raised by the checksum chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChecksumError {
    #[error("checksum chain already initialized for stream {0}")]
    AlreadyInitialized(StreamId),

    #[error("checksum chain not initialized")]
    NotInitialized,

    #[error(
        "checksum mismatch on stream {stream_id}: entry {entry_checksum:#018x}, \
         expected accum {expected:#018x}, computed {computed:#018x}"
    )]
    ChecksumMismatch {
        stream_id: StreamId,
        entry_checksum: u64,
        expected: u64,
        computed: u64,
    },

    #[error("rollback on stream {stream_id} expected accum {expected:#018x}, live is {live:#018x}")]
    StateMismatch {
        stream_id: StreamId,
        expected: u64,
        live: u64,
    },

    #[error("no rollback pending on stream {0}")]
    NothingToRollback(StreamId),
}

/// Rolling checksum state of one log stream
#[derive(Clone, Debug, Default)]
pub struct ChecksumChain {
    stream_id: Option<StreamId>,
    accum: u64,
    verify: u64,
    /// One-deep rollback snapshot of `accum`, consumed by `rollback`
    prev_accum: Option<u64>,
}

impl ChecksumChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a stream, starting both accumulators at `starting_checksum`
    pub fn init(&mut self, stream_id: StreamId, starting_checksum: u64) -> Result<(), ChecksumError> {
        if let Some(bound) = self.stream_id {
            return Err(ChecksumError::AlreadyInitialized(bound));
        }
        self.stream_id = Some(stream_id);
        self.accum = starting_checksum;
        self.verify = starting_checksum;
        self.prev_accum = None;
        tracing::debug!(stream_id = %stream_id, accum = starting_checksum, "checksum chain initialized");
        Ok(())
    }

    /// Return to the uninitialized state
    pub fn destroy(&mut self) {
        *self = Self::default();
    }

    pub fn is_initialized(&self) -> bool {
        self.stream_id.is_some()
    }

    pub fn stream_id(&self) -> Option<StreamId> {
        self.stream_id
    }

    pub fn accum(&self) -> u64 {
        self.accum
    }

    pub fn verify_checksum(&self) -> u64 {
        self.verify
    }

    /// Whether a `rollback` would currently succeed for the live accumulator
    pub fn can_rollback(&self) -> bool {
        self.prev_accum.is_some()
    }

    /// Write path: fold `entry_checksum` into `accum` and return the new value
    pub fn accumulate(&mut self, entry_checksum: u64) -> Result<u64, ChecksumError> {
        self.bound()?;
        let next = combine(self.accum, entry_checksum);
        self.prev_accum = Some(self.accum);
        self.accum = next;
        Ok(next)
    }

    /// Replication path: fold `entry_checksum` into `verify` and check it
    /// against the accumulator the producer stamped on the entry.
    ///
    /// On mismatch `verify` is left at its last good value.
    pub fn verify(&mut self, entry_checksum: u64, expected_accum: u64) -> Result<(), ChecksumError> {
        let stream_id = self.bound()?;
        let computed = combine(self.verify, entry_checksum);
        if computed != expected_accum {
            tracing::error!(
                stream_id = %stream_id,
                entry_checksum,
                expected = expected_accum,
                computed,
                verify = self.verify,
                "log entry checksum mismatch"
            );
            return Err(ChecksumError::ChecksumMismatch {
                stream_id,
                entry_checksum,
                expected: expected_accum,
                computed,
            });
        }
        self.verify = computed;
        Ok(())
    }

    /// Undo the most recent `accumulate`.
    ///
    /// `expected_current_accum` must equal the live accumulator. Only one
    /// level is retained; a second rollback without an intervening
    /// `accumulate` fails with [`ChecksumError::NothingToRollback`].
    pub fn rollback(&mut self, expected_current_accum: u64) -> Result<(), ChecksumError> {
        let stream_id = self.bound()?;
        if expected_current_accum != self.accum {
            return Err(ChecksumError::StateMismatch {
                stream_id,
                expected: expected_current_accum,
                live: self.accum,
            });
        }
        let prev = self
            .prev_accum
            .take()
            .ok_or(ChecksumError::NothingToRollback(stream_id))?;
        tracing::debug!(stream_id = %stream_id, from = self.accum, to = prev, "checksum chain rolled back");
        self.accum = prev;
        Ok(())
    }

    /// Overwrite `accum` with externally known state, e.g. after snapshot restore
    pub fn set_accum(&mut self, accum: u64) {
        self.accum = accum;
        self.prev_accum = None;
    }

    /// Overwrite `verify` with externally known state
    pub fn set_verify(&mut self, verify: u64) {
        self.verify = verify;
    }

    fn bound(&self) -> Result<StreamId, ChecksumError> {
        self.stream_id.ok_or(ChecksumError::NotInitialized)
    }
}

#[cfg(test)]
#[path = "checksum_tests.rs"]
mod tests;
