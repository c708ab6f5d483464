// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One log stream: its checksum chain, role, and open log block

use crate::config::StreamConfig;
use crate::error::EnvError;
use strand_core::{ChecksumChain, StreamId};
use std::time::{Duration, Instant};

/// Local role of a stream in its consensus group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamRole {
    /// Created, not yet attached to the group
    Pending,
    Follower,
    Leader,
}

#[derive(Clone, Debug)]
struct OpenBlock {
    bytes: u64,
    entries: u64,
    opened_at: Instant,
}

impl OpenBlock {
    fn new(now: Instant) -> Self {
        Self {
            bytes: 0,
            entries: 0,
            opened_at: now,
        }
    }
}

/// A log stream owned by an environment
#[derive(Debug)]
pub struct LogStream {
    id: StreamId,
    chain: ChecksumChain,
    role: StreamRole,
    ready: bool,
    wants_leadership: bool,
    block: OpenBlock,
    sealed_blocks: u64,
    config: StreamConfig,
}

impl LogStream {
    pub(crate) fn new(
        id: StreamId,
        starting_checksum: u64,
        config: StreamConfig,
        now: Instant,
    ) -> Result<Self, EnvError> {
        let mut chain = ChecksumChain::new();
        chain.init(id, starting_checksum)?;
        Ok(Self {
            id,
            chain,
            role: StreamRole::Pending,
            ready: false,
            wants_leadership: false,
            block: OpenBlock::new(now),
            sealed_blocks: 0,
            config,
        })
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    pub fn chain(&self) -> &ChecksumChain {
        &self.chain
    }

    pub fn sealed_blocks(&self) -> u64 {
        self.sealed_blocks
    }

    pub fn open_block_bytes(&self) -> u64 {
        self.block.bytes
    }

    pub fn open_block_entries(&self) -> u64 {
        self.block.entries
    }

    /// Allow the next state sweep to attach the stream to its group
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    /// Ask for promotion to leader on a later state sweep
    pub fn request_leadership(&mut self) {
        self.wants_leadership = true;
    }

    /// Give up leadership on the next state sweep
    pub fn step_down(&mut self) {
        self.wants_leadership = false;
    }

    /// Advance the role state machine by at most one step.
    ///
    /// Returns whether the role changed. A follower is only promoted once
    /// its verified position has caught up with its own accumulator.
    pub fn try_switch_state(&mut self) -> Result<bool, EnvError> {
        let next = match self.role {
            StreamRole::Pending if self.ready => StreamRole::Follower,
            StreamRole::Follower
                if self.wants_leadership
                    && self.chain.verify_checksum() == self.chain.accum() =>
            {
                StreamRole::Leader
            }
            StreamRole::Leader if !self.wants_leadership => StreamRole::Follower,
            _ => return Ok(false),
        };
        tracing::info!(stream_id = %self.id, from = ?self.role, to = ?next, "stream role switched");
        self.role = next;
        Ok(true)
    }

    /// Leader write path: stamp an entry with the next accumulated checksum
    pub fn append(&mut self, entry_checksum: u64, len: u64) -> Result<u64, EnvError> {
        if self.role != StreamRole::Leader {
            return Err(EnvError::invalid(format!(
                "stream {} cannot append as {:?}",
                self.id, self.role
            )));
        }
        let accum = self.chain.accumulate(entry_checksum)?;
        // The leader's own entries count as verified
        self.chain.set_verify(accum);
        self.grow(len);
        Ok(accum)
    }

    /// Follower path: verify an entry stamped by the leader
    pub fn replicate(&mut self, entry_checksum: u64, expected_accum: u64, len: u64) -> Result<(), EnvError> {
        if self.role != StreamRole::Follower {
            return Err(EnvError::invalid(format!(
                "stream {} cannot replicate as {:?}",
                self.id, self.role
            )));
        }
        self.chain.verify(entry_checksum, expected_accum)?;
        self.chain.set_accum(expected_accum);
        self.grow(len);
        Ok(())
    }

    /// Undo the last appended entry, which must have produced `expected_accum`
    pub fn truncate_last(&mut self, expected_accum: u64, len: u64) -> Result<(), EnvError> {
        self.chain.rollback(expected_accum)?;
        self.chain.set_verify(self.chain.accum());
        self.block.bytes = self.block.bytes.saturating_sub(len);
        self.block.entries = self.block.entries.saturating_sub(1);
        Ok(())
    }

    /// Freeze the open block if it reached its size or age threshold.
    ///
    /// Empty blocks are never frozen. Returns whether a block was sealed.
    pub fn try_freeze_log(&mut self, now: Instant) -> Result<bool, EnvError> {
        if self.block.entries == 0 {
            return Ok(false);
        }
        let age = now.saturating_duration_since(self.block.opened_at);
        let full = self.block.bytes >= self.config.max_block_bytes;
        let stale = age >= self.config.max_block_age;
        if !full && !stale {
            return Ok(false);
        }
        tracing::debug!(
            stream_id = %self.id,
            bytes = self.block.bytes,
            entries = self.block.entries,
            age_ms = age.as_millis() as u64,
            "freezing log block"
        );
        self.sealed_blocks += 1;
        self.block = OpenBlock::new(now);
        Ok(true)
    }

    /// Age of the open block relative to `now`
    pub fn open_block_age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.block.opened_at)
    }

    fn grow(&mut self, len: u64) {
        self.block.bytes = self.block.bytes.saturating_add(len);
        self.block.entries += 1;
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
