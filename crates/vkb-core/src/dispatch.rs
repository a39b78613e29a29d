use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::{
    domain::{MessageId, NewMessage, PeerId, UpdateEvent, UserId},
    utils::truncate_text,
    Result,
};

const MESSAGE_NEW: &str = "message_new";

/// Callback invoked once per decoded `message_new`.
pub type Consumer = Box<dyn FnMut(&NewMessage) -> Result<()> + Send>;

/// Decodes raw updates and hands new messages to the single consumer.
#[derive(Default)]
pub struct EventDispatcher {
    consumer: Option<Consumer>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("has_consumer", &self.has_consumer())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the consumer, replacing any previous one.
    pub fn attach(&mut self, consumer: impl FnMut(&NewMessage) -> Result<()> + Send + 'static) {
        self.consumer = Some(Box::new(consumer));
    }

    pub fn detach(&mut self) {
        self.consumer = None;
    }

    pub fn has_consumer(&self) -> bool {
        self.consumer.is_some()
    }

    /// Decode one update and, for a new message, run the consumer to completion.
    ///
    /// A consumer error is returned as-is and is not retried.
    pub fn dispatch(&mut self, raw: &Value) -> Result<UpdateEvent> {
        let event = decode_update(raw);
        match &event {
            UpdateEvent::NewMessage(msg) => {
                debug!(
                    id = msg.id.0,
                    peer_id = msg.peer_id.0,
                    text = %truncate_text(&msg.text, 64),
                    "message_new"
                );
                if let Some(consumer) = self.consumer.as_mut() {
                    consumer(msg)?;
                }
            }
            UpdateEvent::Unknown { kind } => {
                debug!(kind = %kind, "ignoring update");
            }
        }
        Ok(event)
    }
}

/// Map a raw `{type, object}` update to an [`UpdateEvent`].
///
/// Missing or mistyped message fields fall back to zero/empty values.
pub fn decode_update(raw: &Value) -> UpdateEvent {
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();
    if kind != MESSAGE_NEW {
        return UpdateEvent::Unknown {
            kind: kind.to_string(),
        };
    }

    let msg = raw.pointer("/object/message").unwrap_or(&Value::Null);
    UpdateEvent::NewMessage(NewMessage {
        id: MessageId(int_field(msg, "id")),
        from_id: UserId(int_field(msg, "from_id")),
        peer_id: PeerId(int_field(msg, "peer_id")),
        text: msg
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        date: msg.get("date").and_then(Value::as_u64).unwrap_or(0),
    })
}

fn int_field(obj: &Value, key: &str) -> i64 {
    obj.get(key).and_then(Value::as_i64).unwrap_or(0)
}
