// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol: JSON messages in 4-byte big-endian length-prefixed frames

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strand_core::{ClusterId, ClusterMetaInfo, EnvKey, InstanceId, StreamId, TenantRole};
use strand_engine::EnvError;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: &str = "1";

/// Frames above this size are refused
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Hello {
        version: String,
    },
    Status,
    CreateEnv {
        key: EnvKey,
    },
    RemoveEnv {
        key: EnvKey,
    },
    GetClusterMeta {
        cluster_id: ClusterId,
    },
    CreateArbitration {
        key: EnvKey,
        instance_id: InstanceId,
        role: TenantRole,
    },
    DeleteArbitration {
        key: EnvKey,
        instance_id: InstanceId,
    },
    SetInitialMembers {
        key: EnvKey,
        instance_id: InstanceId,
        members: Vec<String>,
        arb_member: String,
        replica_num: usize,
    },
    CreateStream {
        key: EnvKey,
        stream_id: StreamId,
        #[serde(default)]
        starting_checksum: u64,
    },
    /// Let the maintenance loop promote the stream; `leader` also requests leadership
    MarkStreamReady {
        key: EnvKey,
        stream_id: StreamId,
        #[serde(default)]
        leader: bool,
    },
    Append {
        key: EnvKey,
        stream_id: StreamId,
        entry_checksum: u64,
        len: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Hello { version: String },
    Ok,
    Status { uptime_secs: u64, environments: usize },
    ClusterMeta { info: ClusterMetaInfo },
    Appended { accum: u64 },
    Error { kind: ErrorKind, message: String },
}

/// Failure class carried in [`Response::Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EntryNotExist,
    InvalidArgument,
    Frozen,
    Checksum,
    Internal,
}

impl Response {
    pub fn from_error(e: &EnvError) -> Self {
        let kind = match e {
            EnvError::EntryNotExist(_) => ErrorKind::EntryNotExist,
            EnvError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            EnvError::Frozen(_) => ErrorKind::Frozen,
            EnvError::Checksum(_) => ErrorKind::Checksum,
            EnvError::Dir(d) if d.is_not_found() => ErrorKind::EntryNotExist,
            EnvError::Dir(_) => ErrorKind::Internal,
        };
        Response::Error {
            kind,
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out")]
    Timeout,

    #[error("message of {0} bytes exceeds limit")]
    TooLarge(usize),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize a message as JSON, without framing
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(msg)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed frame
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed frame
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }
    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// [`read_message`] bounded by `timeout`
pub async fn read_frame_timeout<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Vec<u8>, ProtocolError> {
    tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// [`write_message`] bounded by `timeout`
pub async fn write_frame_timeout<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
    timeout: Duration,
) -> Result<(), ProtocolError> {
    tokio::time::timeout(timeout, write_message(writer, data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
