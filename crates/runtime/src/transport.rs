//! In-process transport for the prediction protocol.
//!
//! Both ends share one pair of queues. Every message is encoded with bincode
//! on send and decoded on receive, so anything that would not survive a real
//! wire fails here too.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, trace, warn};

use combat_core::{NetMessage, NetRole, Transport};

use crate::api::{Result, RuntimeError};

#[derive(Debug, Clone)]
struct Frame {
    reliable: bool,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Queues {
    to_server: VecDeque<Frame>,
    to_client: VecDeque<Frame>,
    drop_unreliable: bool,
}

impl Queues {
    fn inbox(&mut self, role: NetRole) -> &mut VecDeque<Frame> {
        match role {
            NetRole::Server => &mut self.to_server,
            NetRole::OwningClient => &mut self.to_client,
        }
    }
}

/// One end of a client/server link.
///
/// Sends addressed to the end itself are dropped with a warning; a client
/// never talks to another client.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    role: NetRole,
    queues: Arc<Mutex<Queues>>,
}

impl LoopbackTransport {
    /// Returns `(client end, server end)`.
    pub fn pair() -> (Self, Self) {
        let queues = Arc::new(Mutex::new(Queues::default()));
        let client = Self {
            role: NetRole::OwningClient,
            queues: Arc::clone(&queues),
        };
        let server = Self {
            role: NetRole::Server,
            queues,
        };
        (client, server)
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    /// Frames waiting for this end.
    pub fn pending(&self) -> usize {
        self.lock()
            .map_or(0, |mut queues| queues.inbox(self.role).len())
    }

    /// Loses every unreliable frame sent from now on, in both directions.
    pub fn set_drop_unreliable(&self, drop: bool) {
        if let Ok(mut queues) = self.lock() {
            queues.drop_unreliable = drop;
        }
    }

    /// Takes and decodes every frame addressed to this end.
    ///
    /// A frame that fails to decode is logged and skipped like a corrupt
    /// packet. The rest of the batch is still delivered.
    pub fn receive(&self) -> Result<Vec<NetMessage>> {
        let mut queues = self.lock()?;
        let inbox = queues.inbox(self.role);
        let mut messages = Vec::with_capacity(inbox.len());
        while let Some(frame) = inbox.pop_front() {
            let message = match decode(&frame.bytes) {
                Ok(message) => message,
                Err(err) => {
                    warn!(
                        target: "runtime::transport",
                        to = %self.role,
                        reliable = frame.reliable,
                        bytes = frame.bytes.len(),
                        error = %err,
                        "undecodable frame skipped"
                    );
                    continue;
                }
            };
            trace!(
                target: "runtime::transport",
                to = %self.role,
                kind = message.kind(),
                reliable = frame.reliable,
                bytes = frame.bytes.len(),
                "frame received"
            );
            messages.push(message);
        }
        Ok(messages)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Queues>> {
        self.queues.lock().map_err(|_| RuntimeError::PoisonedLock)
    }

    fn send(&self, to: NetRole, message: &NetMessage, reliable: bool) {
        if to == self.role {
            warn!(
                target: "runtime::transport",
                role = %self.role,
                kind = message.kind(),
                "message addressed to its own sender dropped"
            );
            return;
        }
        let bytes = match encode(message) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(
                    target: "runtime::transport",
                    kind = message.kind(),
                    error = %err,
                    "message dropped"
                );
                return;
            }
        };
        let Ok(mut queues) = self.lock() else {
            error!(target: "runtime::transport", kind = message.kind(), "link poisoned, message dropped");
            return;
        };
        if !reliable && queues.drop_unreliable {
            trace!(target: "runtime::transport", kind = message.kind(), "unreliable frame lost");
            return;
        }
        queues.inbox(to).push_back(Frame { reliable, bytes });
    }
}

fn encode(message: &NetMessage) -> Result<Vec<u8>> {
    bincode::serialize(message).map_err(RuntimeError::Encode)
}

fn decode(bytes: &[u8]) -> Result<NetMessage> {
    bincode::deserialize(bytes).map_err(RuntimeError::Decode)
}

impl Transport for LoopbackTransport {
    fn send_reliable(&mut self, to: NetRole, message: NetMessage) {
        self.send(to, &message, true);
    }

    fn send_unreliable(&mut self, to: NetRole, message: NetMessage) {
        self.send(to, &message, false);
    }
}
