use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::{
    api::VkApi,
    domain::{MessageId, NewMessage, PeerId},
    errors::SendError,
};

/// One-shot `messages.send` calls, outside the poll loop.
///
/// Gated on the "started" flag only: a stale poll session does not block
/// sending.
pub struct OutboundSender {
    api: Arc<VkApi>,
    started: bool,
}

impl OutboundSender {
    pub fn new(api: Arc<VkApi>) -> Self {
        Self {
            api,
            started: false,
        }
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub async fn send(&self, text: &str, peer_id: PeerId) -> Result<MessageId, SendError> {
        if !self.started {
            return Err(SendError::NotStarted);
        }

        let url = self.api.send_url(peer_id, text, random_id());
        match self.api.call::<i64>(&url).await {
            Ok(id) => {
                info!(peer_id = peer_id.0, message_id = id, "message sent");
                Ok(MessageId(id))
            }
            Err(e) => {
                let err = SendError::from(e);
                warn!(peer_id = peer_id.0, error = %err, "message send failed");
                Err(err)
            }
        }
    }

    /// Send `text` into the conversation `msg` came from.
    pub async fn reply(&self, msg: &NewMessage, text: &str) -> Result<MessageId, SendError> {
        self.send(text, msg.peer_id).await
    }
}

/// Per-request idempotency value for `random_id`.
fn random_id() -> i32 {
    rand::thread_rng().gen_range(1..i32::MAX)
}
