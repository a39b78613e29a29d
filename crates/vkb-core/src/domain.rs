/// VK user id (numeric).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Conversation id: a user, a community (negative) or a chat (2000000000+).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PeerId(pub i64);

/// Message id within a conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

/// A `message_new` update, decoded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewMessage {
    pub id: MessageId,
    pub from_id: UserId,
    pub peer_id: PeerId,
    pub text: String,
    /// Unix seconds, as stamped by the server.
    pub date: u64,
}

/// One long poll update after decoding.
///
/// Kinds other than `message_new` are kept as `Unknown` so new server event
/// types never break a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateEvent {
    NewMessage(NewMessage),
    Unknown { kind: String },
}

impl UpdateEvent {
    pub fn kind(&self) -> &str {
        match self {
            UpdateEvent::NewMessage(_) => "message_new",
            UpdateEvent::Unknown { kind } => kind,
        }
    }
}
