// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers for clusters, tenants, log streams and arbitration instances

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a cluster sharing this log service
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub u64);

impl ClusterId {
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a tenant within a cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub u64);

impl TenantId {
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a log-stream environment: one tenant in one cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvKey {
    pub cluster_id: ClusterId,
    pub tenant_id: TenantId,
}

impl EnvKey {
    pub fn new(cluster_id: u64, tenant_id: u64) -> Self {
        Self {
            cluster_id: ClusterId(cluster_id),
            tenant_id: TenantId(tenant_id),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.cluster_id.is_valid() && self.tenant_id.is_valid()
    }
}

impl fmt::Display for EnvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster {}/tenant {}", self.cluster_id, self.tenant_id)
    }
}

/// Identifier of one log stream (one consensus group)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub i64);

impl StreamId {
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical identifier of an arbitration instance
///
/// An arbitration instance stands in for one consensus group, so its id is
/// drawn from the same space as [`StreamId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub i64);

impl InstanceId {
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network address of a consensus member (`host:port`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A usable address has a non-empty host and a numeric port
    pub fn is_valid(&self) -> bool {
        match self.0.rsplit_once(':') {
            Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
            None => false,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a tenant in a primary/standby deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    Primary,
    Standby,
}

impl fmt::Display for TenantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantRole::Primary => f.write_str("primary"),
            TenantRole::Standby => f.write_str("standby"),
        }
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
