// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checksummed JSON records
//!
//! Each record file holds an envelope with the payload and a CRC32 of the
//! payload's serialized form. Writes go to a sibling `.tmp` file that is
//! fsynced and renamed over the target, so a reader sees either the old or
//! the new record, never a torn one.

use crate::tenant_dir::DirError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    checksum: u32,
    payload: T,
}

fn checksum_of<T: Serialize>(payload: &T) -> Result<u32, DirError> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(crc32fast::hash(&bytes))
}

/// Atomically replace `path` with a checksummed record of `payload`
pub fn write_record<T: Serialize>(path: &Path, payload: &T) -> Result<(), DirError> {
    let envelope = Envelope {
        checksum: checksum_of(payload)?,
        payload,
    };
    let json = serde_json::to_vec_pretty(&envelope)?;

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Read a record, failing with [`DirError::Corrupt`] when the checksum disagrees
pub fn read_record<T: Serialize + DeserializeOwned>(path: &Path) -> Result<T, DirError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DirError::EntryNotExist(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
    let computed = checksum_of(&envelope.payload)?;
    if computed != envelope.checksum {
        return Err(DirError::Corrupt {
            path: path.to_path_buf(),
            stored: envelope.checksum,
            computed,
        });
    }
    Ok(envelope.payload)
}

/// Make a rename or unlink inside `dir` durable
pub(crate) fn sync_dir(dir: &Path) -> Result<(), DirError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}
