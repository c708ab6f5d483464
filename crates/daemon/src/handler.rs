// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Packet dispatch from the transport into the registry

use crate::protocol::{self, Request, Response, PROTOCOL_VERSION};
use std::sync::Arc;
use std::time::Instant;
use strand_core::{Address, MemberList};
use strand_engine::{EnvError, EnvironmentRegistry};
use tracing::{debug, warn};

/// Where encoded responses go, keyed by the token the packet arrived with
pub trait ResponseSink {
    fn respond(&self, token: u64, buf: Vec<u8>);
}

/// Decodes one packet, runs it against the registry and hands back the
/// encoded response
pub struct PacketHandler {
    registry: Arc<EnvironmentRegistry>,
    self_address: Address,
    start_time: Instant,
}

impl PacketHandler {
    pub fn new(registry: Arc<EnvironmentRegistry>, self_address: Address) -> Self {
        Self {
            registry,
            self_address,
            start_time: Instant::now(),
        }
    }

    pub fn registry(&self) -> &Arc<EnvironmentRegistry> {
        &self.registry
    }

    /// Handle one inbound packet. A packet that does not decode is answered
    /// with an empty buffer.
    pub fn handle_packet(&self, packet: &[u8], token: u64, sink: &impl ResponseSink) {
        let request: Request = match protocol::decode(packet) {
            Ok(request) => request,
            Err(e) => {
                warn!(token, len = packet.len(), error = %e, "failed to decode packet");
                sink.respond(token, Vec::new());
                return;
            }
        };
        debug!(token, ?request, "received request");

        let response = self.handle_request(request);
        let buf = match protocol::encode(&response) {
            Ok(buf) => buf,
            Err(e) => {
                warn!(token, error = %e, "failed to encode response");
                Vec::new()
            }
        };
        sink.respond(token, buf);
    }

    pub fn handle_request(&self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "request failed");
                Response::from_error(&e)
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response, EnvError> {
        let registry = &self.registry;
        let response = match request {
            Request::Ping => Response::Pong,

            Request::Hello { version: _ } => Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            },

            Request::Status => Response::Status {
                uptime_secs: self.start_time.elapsed().as_secs(),
                environments: registry.len(),
            },

            Request::CreateEnv { key } => {
                registry.create(key)?;
                Response::Ok
            }

            Request::RemoveEnv { key } => {
                registry.remove(key)?;
                Response::Ok
            }

            Request::GetClusterMeta { cluster_id } => Response::ClusterMeta {
                info: registry.get_cluster_meta_info(cluster_id)?,
            },

            Request::CreateArbitration {
                key,
                instance_id,
                role,
            } => {
                registry.create_arbitration_instance(key, self.self_address.clone(), instance_id, role)?;
                Response::Ok
            }

            Request::DeleteArbitration { key, instance_id } => {
                registry.delete_arbitration_instance(key, &self.self_address, instance_id)?;
                Response::Ok
            }

            Request::SetInitialMembers {
                key,
                instance_id,
                members,
                arb_member,
                replica_num,
            } => {
                let members: MemberList = members.into_iter().map(Address::new).collect();
                registry.set_initial_member_list(
                    key,
                    &self.self_address,
                    instance_id,
                    members,
                    Address::new(arb_member),
                    replica_num,
                )?;
                Response::Ok
            }

            Request::CreateStream {
                key,
                stream_id,
                starting_checksum,
            } => {
                registry.get(key)?.create_stream(stream_id, starting_checksum)?;
                Response::Ok
            }

            Request::MarkStreamReady {
                key,
                stream_id,
                leader,
            } => {
                registry.get(key)?.with_stream(stream_id, |s| {
                    s.mark_ready();
                    if leader {
                        s.request_leadership();
                    }
                })?;
                Response::Ok
            }

            Request::Append {
                key,
                stream_id,
                entry_checksum,
                len,
            } => Response::Appended {
                accum: registry.get(key)?.append(stream_id, entry_checksum, len)?,
            },
        };
        Ok(response)
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
