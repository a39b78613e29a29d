//! `VkBot`: the surface a host application drives.
//!
//! Call [`VkBot::setup`] once, [`VkBot::attach`] a consumer, then call
//! [`VkBot::tick`] repeatedly from one task.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    api::VkApi,
    clock::{format_utc_offset, DriftClock},
    config::Config,
    domain::{MessageId, NewMessage, PeerId},
    errors::{ClockError, SendError},
    poll::{PollEngine, PollSettings, TickOutcome},
    ports::{MonotonicTicks, TickSource, Transport},
    sender::OutboundSender,
    session::PollSession,
    Result,
};

pub struct VkBot {
    api: Arc<VkApi>,
    engine: PollEngine,
    sender: OutboundSender,
    clock: DriftClock,
}

impl VkBot {
    pub fn new(cfg: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::with_tick_source(cfg, transport, Arc::new(MonotonicTicks::new()))
    }

    pub fn with_tick_source(
        cfg: &Config,
        transport: Arc<dyn Transport>,
        ticks: Arc<dyn TickSource>,
    ) -> Self {
        let api = Arc::new(VkApi::new(cfg, transport));
        let mut clock = DriftClock::new(ticks);
        if let Err(e) = clock.set_offset(i64::from(cfg.timezone_offset)) {
            warn!(error = %e, "ignoring configured timezone offset");
        }

        Self {
            engine: PollEngine::new(api.clone(), PollSettings::from(cfg)),
            sender: OutboundSender::new(api.clone()),
            api,
            clock,
        }
    }

    /// Check credentials and acquire the first long poll session.
    ///
    /// Missing credentials fail before any request is made.
    pub async fn setup(&mut self) -> Result<()> {
        self.api.credentials().validate()?;
        self.engine.sessions_mut().renew().await?;
        self.sender.mark_started();
        info!(
            group_id = %self.api.credentials().unsigned_group_id(),
            "bot started"
        );
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.sender.is_started()
    }

    pub fn attach(&mut self, consumer: impl FnMut(&NewMessage) -> Result<()> + Send + 'static) {
        self.engine.dispatcher_mut().attach(consumer);
    }

    pub fn detach(&mut self) {
        self.engine.dispatcher_mut().detach();
    }

    /// One poll cycle. Before setup this does nothing.
    ///
    /// Errors come only from the consumer.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        if !self.is_started() {
            return Ok(TickOutcome::NotStarted);
        }
        self.engine.tick().await
    }

    pub async fn send(
        &self,
        text: &str,
        peer_id: PeerId,
    ) -> std::result::Result<MessageId, SendError> {
        self.sender.send(text, peer_id).await
    }

    pub async fn reply(
        &self,
        msg: &NewMessage,
        text: &str,
    ) -> std::result::Result<MessageId, SendError> {
        self.sender.reply(msg, text).await
    }

    /// Timezone offset in seconds east of UTC.
    pub fn set_timezone_offset(&mut self, seconds: i64) -> std::result::Result<(), ClockError> {
        self.clock.set_offset(seconds)?;
        info!(offset = %format_utc_offset(self.clock.offset()), "timezone set");
        Ok(())
    }

    /// Timezone offset in whole hours, -12 to +14.
    pub fn set_timezone(&mut self, hours: i64) -> std::result::Result<(), ClockError> {
        self.clock.set_offset_hours(hours)?;
        info!(offset = %format_utc_offset(self.clock.offset()), "timezone set");
        Ok(())
    }

    pub fn timezone_offset(&self) -> i32 {
        self.clock.offset()
    }

    /// Fetch `utils.getServerTime` and anchor the clock to it.
    pub async fn sync_time(&mut self) -> std::result::Result<u64, ClockError> {
        if !self.is_started() {
            return Err(ClockError::NotStarted);
        }
        let server_time = self
            .api
            .server_time()
            .await
            .map_err(|e| ClockError::FetchFailed(e.to_string()))?;
        self.clock.sync(server_time)?;

        match self.clock.now_as_local_string() {
            Ok(local) => info!(
                server_time,
                local = %local,
                offset = %format_utc_offset(self.clock.offset()),
                "time synchronized"
            ),
            Err(e) => warn!(server_time, error = %e, "time synchronized to an implausible value"),
        }
        Ok(server_time)
    }

    pub fn is_time_synced(&self) -> bool {
        self.clock.is_synced()
    }

    /// Local epoch seconds, or 0 before the first sync.
    pub fn current_time(&self) -> i64 {
        self.clock.now()
    }

    pub fn current_time_string(&self) -> std::result::Result<String, ClockError> {
        self.clock.now_as_local_string()
    }

    pub fn seconds_since_midnight(&self) -> u32 {
        self.clock.seconds_since_local_midnight()
    }

    pub fn session(&self) -> Option<&PollSession> {
        self.engine.sessions().current()
    }

    pub fn clock(&self) -> &DriftClock {
        &self.clock
    }
}
