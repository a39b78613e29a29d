//! Long poll engine.
//!
//! One call to [`PollEngine::tick`] performs at most one poll plus, when the
//! session is lost, one renewal. Every poll-loop failure is recovered here:
//! the caller only sees how many messages were delivered, or an error raised
//! by its own consumer.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    api::{poll_url, PollResponse, VkApi},
    config::Config,
    dispatch::EventDispatcher,
    domain::UpdateEvent,
    errors::{HardDesync, PollError, TransportError},
    ports::HttpResponse,
    session::{PollSession, SessionManager},
    utils::truncate_text,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    /// `wait` sent to the server: how long it may hold the request open.
    pub wait: Duration,
    /// Transport deadline for one poll. Must exceed `wait`.
    pub timeout: Duration,
    /// Pause before renewing after a transport failure.
    pub error_backoff: Duration,
    /// Renew after this many timeouts in a row. `None` never does.
    pub max_idle_timeouts: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PollSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            wait: cfg.longpoll_wait,
            timeout: cfg.poll_timeout,
            error_backoff: cfg.error_backoff,
            max_idle_timeouts: cfg.max_idle_timeouts,
        }
    }
}

/// Updates carried by one poll that needs no recovery.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollBatch {
    /// New cursor. `None` when the transport timed out.
    pub cursor: Option<String>,
    pub updates: Vec<Value>,
}

impl PollBatch {
    pub fn timed_out() -> Self {
        Self::default()
    }

    pub fn is_timeout(&self) -> bool {
        self.cursor.is_none()
    }
}

/// What the engine must do after one poll.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    Continue(PollBatch),
    NeedsCursorOnly { cursor: String },
    NeedsRenewal(PollError),
}

impl PollOutcome {
    /// Classify the transport result of one `a_check`.
    pub fn classify(result: std::result::Result<HttpResponse, TransportError>) -> Self {
        let resp = match result {
            Ok(resp) => resp,
            Err(TransportError::Timeout) => return PollOutcome::Continue(PollBatch::timed_out()),
            Err(e) => return PollOutcome::NeedsRenewal(PollError::Transport(e)),
        };
        if !resp.is_ok() {
            return PollOutcome::NeedsRenewal(PollError::Transport(TransportError::Status(
                resp.status,
            )));
        }

        let parsed = match PollResponse::parse(&resp.body) {
            Ok(p) => p,
            Err(e) => {
                return PollOutcome::NeedsRenewal(PollError::Malformed(format!(
                    "{e}: {}",
                    truncate_text(&resp.body, 120)
                )))
            }
        };

        match (parsed.failed, parsed.ts) {
            (Some(1), Some(cursor)) => PollOutcome::NeedsCursorOnly { cursor },
            (Some(1), None) => {
                PollOutcome::NeedsRenewal(PollError::Malformed("failed=1 without ts".to_string()))
            }
            (Some(code), _) => PollOutcome::NeedsRenewal(PollError::HardDesync(
                HardDesync::from_code(code),
            )),
            (None, Some(cursor)) => PollOutcome::Continue(PollBatch {
                cursor: Some(cursor),
                updates: parsed.updates.unwrap_or_default(),
            }),
            (None, None) => {
                PollOutcome::NeedsRenewal(PollError::Malformed("response without ts".to_string()))
            }
        }
    }
}

/// What a tick did. Informational; none of these is a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Setup has not succeeded yet; nothing was sent.
    NotStarted,
    /// There was no session and renewal failed. The next tick retries.
    SessionUnavailable,
    /// There was no session and one was acquired.
    SessionRenewed,
    /// A poll completed; `dispatched` new messages were delivered.
    Polled { dispatched: usize },
    /// The server asked for a cursor refresh (`failed=1`).
    CursorRefreshed,
    /// The session was dropped and a renewal attempted.
    Resynced { renewed: bool },
}

pub struct PollEngine {
    api: Arc<VkApi>,
    settings: PollSettings,
    sessions: SessionManager,
    dispatcher: EventDispatcher,
    idle_timeouts: u32,
}

impl PollEngine {
    pub fn new(api: Arc<VkApi>, settings: PollSettings) -> Self {
        Self {
            sessions: SessionManager::new(api.clone()),
            api,
            settings,
            dispatcher: EventDispatcher::new(),
            idle_timeouts: 0,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
        &mut self.dispatcher
    }

    /// Run one poll cycle.
    ///
    /// Only a consumer error escapes; it aborts the rest of the batch, whose
    /// cursor has already been committed.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let Some(session) = self.sessions.current().cloned() else {
            return Ok(match self.sessions.renew().await {
                Ok(_) => TickOutcome::SessionRenewed,
                Err(_) => TickOutcome::SessionUnavailable,
            });
        };

        match self.poll_once(&session).await {
            PollOutcome::Continue(batch) if batch.is_timeout() => Ok(self.on_timeout().await),
            PollOutcome::Continue(batch) => self.deliver(batch),
            PollOutcome::NeedsCursorOnly { cursor } => {
                debug!(ts = %cursor, "long poll history out of date, refreshing cursor");
                self.idle_timeouts = 0;
                self.sessions.set_cursor(cursor);
                Ok(TickOutcome::CursorRefreshed)
            }
            PollOutcome::NeedsRenewal(reason) => Ok(self.resync(reason).await),
        }
    }

    async fn poll_once(&self, session: &PollSession) -> PollOutcome {
        let url = poll_url(
            session.server(),
            session.key(),
            session.cursor(),
            self.settings.wait,
        );
        let result = self.api.transport().get(&url, self.settings.timeout).await;
        PollOutcome::classify(result)
    }

    fn deliver(&mut self, batch: PollBatch) -> Result<TickOutcome> {
        self.idle_timeouts = 0;
        if let Some(cursor) = batch.cursor {
            self.sessions.set_cursor(cursor);
        }

        let mut dispatched = 0;
        for raw in &batch.updates {
            if let UpdateEvent::NewMessage(_) = self.dispatcher.dispatch(raw)? {
                dispatched += 1;
            }
        }
        if !batch.updates.is_empty() {
            debug!(
                updates = batch.updates.len(),
                dispatched, "long poll batch processed"
            );
        }
        Ok(TickOutcome::Polled { dispatched })
    }

    async fn on_timeout(&mut self) -> TickOutcome {
        self.idle_timeouts = self.idle_timeouts.saturating_add(1);
        debug!(consecutive = self.idle_timeouts, "long poll timed out");
        match self.settings.max_idle_timeouts {
            Some(limit) if self.idle_timeouts >= limit => {
                self.resync(PollError::Stalled(self.idle_timeouts)).await
            }
            _ => TickOutcome::Polled { dispatched: 0 },
        }
    }

    async fn resync(&mut self, reason: PollError) -> TickOutcome {
        warn!(error = %reason, "long poll session lost, reconnecting");
        self.sessions.invalidate();
        self.idle_timeouts = 0;

        if matches!(reason, PollError::Transport(_)) && !self.settings.error_backoff.is_zero() {
            sleep(self.settings.error_backoff).await;
        }

        let renewed = self.sessions.renew().await.is_ok();
        if renewed {
            info!("long poll session restored");
        }
        TickOutcome::Resynced { renewed }
    }
}
