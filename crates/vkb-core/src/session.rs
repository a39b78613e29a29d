use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    api::{LongPollServer, VkApi},
    errors::SessionError,
    utils::redact_token,
};

/// Endpoint triple of a live long poll subscription.
///
/// Only [`SessionManager`] creates these; the engine reads them and moves the
/// cursor through the manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollSession {
    server: String,
    key: String,
    cursor: String,
}

impl PollSession {
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    fn acquired(lp: LongPollServer) -> Self {
        Self {
            server: lp.server,
            key: lp.key,
            cursor: lp.ts,
        }
    }
}

/// Owns the poll session and the `groups.getLongPollServer` renewal protocol.
pub struct SessionManager {
    api: Arc<VkApi>,
    session: Option<PollSession>,
    renewals: u64,
}

impl SessionManager {
    pub fn new(api: Arc<VkApi>) -> Self {
        Self {
            api,
            session: None,
            renewals: 0,
        }
    }

    /// Acquire a fresh endpoint, replacing the whole triple on success.
    ///
    /// On failure the previous session (if any) is kept; callers that want it
    /// gone call [`SessionManager::invalidate`] first.
    pub async fn renew(&mut self) -> Result<PollSession, SessionError> {
        let url = self.api.long_poll_server_url();
        match self.api.call::<LongPollServer>(&url).await {
            Ok(lp) => {
                let session = PollSession::acquired(lp);
                info!(
                    server = %redact_token(session.server()),
                    ts = %session.cursor(),
                    "long poll server acquired"
                );
                self.session = Some(session.clone());
                self.renewals += 1;
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "failed to acquire long poll server");
                Err(SessionError::Unavailable(e.to_string()))
            }
        }
    }

    pub fn current(&self) -> Option<&PollSession> {
        self.session.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.session = None;
    }

    /// Move the cursor of the live session. Returns false when there is none.
    pub fn set_cursor(&mut self, cursor: String) -> bool {
        match self.session.as_mut() {
            Some(s) => {
                s.cursor = cursor;
                true
            }
            None => false,
        }
    }

    /// Successful renewals since construction.
    pub fn renewals(&self) -> u64 {
        self.renewals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{long_poll_server, test_api, ScriptedTransport};
    use serde_json::json;

    #[tokio::test]
    async fn renew_populates_triple() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, long_poll_server("S", "K", "1"));
        let mut sessions = SessionManager::new(test_api(transport.clone()));
        assert!(sessions.current().is_none());

        let s = sessions.renew().await.unwrap();
        assert_eq!((s.server(), s.key(), s.cursor()), ("S", "K", "1"));
        assert_eq!(sessions.current(), Some(&s));
        assert_eq!(sessions.renewals(), 1);
        assert!(transport.urls()[0].contains("groups.getLongPollServer"));
        assert!(transport.urls()[0].contains("group_id=123"));
    }

    #[tokio::test]
    async fn failed_renewal_keeps_previous_session() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, long_poll_server("S", "K", "1"));
        transport.push_json(
            200,
            json!({"error": {"error_code": 5, "error_msg": "User authorization failed"}}),
        );
        transport.push_body(500, "");
        transport.push_body(200, "not json");
        let mut sessions = SessionManager::new(test_api(transport));

        let first = sessions.renew().await.unwrap();
        for _ in 0..3 {
            let err = sessions.renew().await.unwrap_err();
            assert!(matches!(err, SessionError::Unavailable(_)));
            assert_eq!(sessions.current(), Some(&first));
        }
        assert_eq!(sessions.renewals(), 1);
    }

    #[tokio::test]
    async fn renewal_replaces_whole_triple() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, long_poll_server("S1", "K1", "10"));
        transport.push_json(200, long_poll_server("S2", "K2", "20"));
        let mut sessions = SessionManager::new(test_api(transport));

        sessions.renew().await.unwrap();
        assert!(sessions.set_cursor("11".to_string()));
        let s = sessions.renew().await.unwrap();
        assert_eq!((s.server(), s.key(), s.cursor()), ("S2", "K2", "20"));
    }

    #[tokio::test]
    async fn invalidate_clears_and_blocks_cursor_updates() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, long_poll_server("S", "K", "1"));
        let mut sessions = SessionManager::new(test_api(transport));
        sessions.renew().await.unwrap();

        sessions.invalidate();
        assert!(sessions.current().is_none());
        assert!(!sessions.set_cursor("2".to_string()));
    }
}
