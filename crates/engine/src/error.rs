// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for environments and the registry

use strand_core::{ChecksumError, EnvKey};
use strand_storage::DirError;
use thiserror::Error;

/// Errors from environment, stream, arbitration and registry operations
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("entry does not exist: {0}")]
    EntryNotExist(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("environment {0} is in freeze mode")]
    Frozen(EnvKey),

    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    #[error("directory error: {0}")]
    Dir(#[from] DirError),
}

impl EnvError {
    /// Probing outcome that callers routinely treat as success-equivalent
    pub fn is_not_found(&self) -> bool {
        match self {
            EnvError::EntryNotExist(_) => true,
            EnvError::Dir(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub(crate) fn not_exist(what: impl std::fmt::Display) -> Self {
        EnvError::EntryNotExist(what.to_string())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EnvError::InvalidArgument(msg.into())
    }
}
