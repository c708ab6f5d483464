// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consensus member lists

use crate::id::Address;
use serde::{Deserialize, Serialize};

/// Largest replica count a consensus group may declare
pub const MAX_REPLICA_NUM: usize = 7;

/// Ordered list of data-replica addresses in a consensus group
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberList {
    members: Vec<Address>,
}

impl MemberList {
    pub fn new(members: Vec<Address>) -> Self {
        Self { members }
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.members.iter().any(|m| m == addr)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }

    /// True when an address appears more than once
    pub fn has_duplicates(&self) -> bool {
        self.members
            .iter()
            .enumerate()
            .any(|(i, a)| self.members[i + 1..].contains(a))
    }

    /// Non-empty, duplicate-free, every address usable, within the replica cap
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
            && self.len() <= MAX_REPLICA_NUM
            && !self.has_duplicates()
            && self.members.iter().all(Address::is_valid)
    }
}

impl FromIterator<Address> for MemberList {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
