//! Send side of the message layer.
//!
//! The core only needs to hand a message to someone. Framing, retries and
//! delivery live in the runtime's implementation of [`Transport`].

use super::NetMessage;

/// Recipient of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum NetRole {
    Server,
    OwningClient,
}

/// Fire-and-forget message sink. Neither method guarantees ordering.
pub trait Transport {
    fn send_reliable(&mut self, to: NetRole, message: NetMessage);

    fn send_unreliable(&mut self, to: NetRole, message: NetMessage);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_reliable(&mut self, to: NetRole, message: NetMessage) {
        (**self).send_reliable(to, message);
    }

    fn send_unreliable(&mut self, to: NetRole, message: NetMessage) {
        (**self).send_unreliable(to, message);
    }
}

/// One captured send.
#[derive(Clone, Debug, PartialEq)]
pub struct SentMessage {
    pub to: NetRole,
    pub reliable: bool,
    pub message: NetMessage,
}

/// Transport that keeps every message it is given.
#[derive(Clone, Debug, Default)]
pub struct RecordingTransport {
    sent: Vec<SentMessage>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[SentMessage] {
        &self.sent
    }

    /// Takes the captured messages, oldest first.
    pub fn drain(&mut self) -> Vec<SentMessage> {
        std::mem::take(&mut self.sent)
    }

    pub fn messages_to(&self, to: NetRole) -> impl Iterator<Item = &NetMessage> {
        self.sent
            .iter()
            .filter(move |sent| sent.to == to)
            .map(|sent| &sent.message)
    }
}

impl Transport for RecordingTransport {
    fn send_reliable(&mut self, to: NetRole, message: NetMessage) {
        self.sent.push(SentMessage {
            to,
            reliable: true,
            message,
        });
    }

    fn send_unreliable(&mut self, to: NetRole, message: NetMessage) {
        self.sent.push(SentMessage {
            to,
            reliable: false,
            message,
        });
    }
}
