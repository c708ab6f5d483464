// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Arbitration instances: vote-only members that keep a quorum available

use crate::error::EnvError;
use strand_core::{Address, EnvKey, InstanceId, MemberList, TenantRole, MAX_REPLICA_NUM};
use strand_storage::{ArbitrationRecord, InitialMembers};

/// A vote-only consensus participant hosted for one environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArbitrationInstance {
    key: EnvKey,
    address: Address,
    instance_id: InstanceId,
    role: TenantRole,
    initial_members: Option<InitialMembers>,
}

impl ArbitrationInstance {
    pub(crate) fn new(key: EnvKey, address: Address, instance_id: InstanceId, role: TenantRole) -> Self {
        Self {
            key,
            address,
            instance_id,
            role,
            initial_members: None,
        }
    }

    pub(crate) fn from_record(key: EnvKey, record: ArbitrationRecord) -> Self {
        Self {
            key,
            address: record.address,
            instance_id: record.instance_id,
            role: record.role,
            initial_members: record.initial_members,
        }
    }

    pub(crate) fn to_record(&self) -> ArbitrationRecord {
        ArbitrationRecord {
            instance_id: self.instance_id,
            address: self.address.clone(),
            role: self.role,
            initial_members: self.initial_members.clone(),
        }
    }

    pub fn key(&self) -> EnvKey {
        self.key
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn role(&self) -> TenantRole {
        self.role
    }

    pub fn initial_members(&self) -> Option<&InitialMembers> {
        self.initial_members.as_ref()
    }

    /// Whether a repeated create with these arguments describes this instance
    pub(crate) fn matches(&self, address: &Address, role: TenantRole) -> bool {
        &self.address == address && self.role == role
    }

    /// Fix the initial member list. Allowed exactly once.
    ///
    /// The arbitration node must not appear among the data replicas, and
    /// `replica_num` must cover the listed members.
    pub(crate) fn set_initial_member_list(
        &mut self,
        members: MemberList,
        arb_member: Address,
        replica_num: usize,
    ) -> Result<(), EnvError> {
        if self.initial_members.is_some() {
            return Err(EnvError::invalid(format!(
                "arbitration instance {} of {} already has an initial member list",
                self.instance_id, self.key
            )));
        }
        if members.contains(&self.address) || members.contains(&arb_member) {
            return Err(EnvError::invalid(format!(
                "member list of arbitration instance {} contains the arbitration node {}",
                self.instance_id, self.address
            )));
        }
        if !members.is_valid() || !arb_member.is_valid() {
            return Err(EnvError::invalid(format!(
                "malformed member list for arbitration instance {}",
                self.instance_id
            )));
        }
        if replica_num < members.len() || replica_num > MAX_REPLICA_NUM {
            return Err(EnvError::invalid(format!(
                "replica_num {} does not fit {} members",
                replica_num,
                members.len()
            )));
        }
        self.initial_members = Some(InitialMembers {
            members,
            arb_member,
            replica_num,
        });
        Ok(())
    }
}
