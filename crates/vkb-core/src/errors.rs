use thiserror::Error as ThisError;

/// Core error type for the bot client.
///
/// Component errors convert into this type so the binary edge can report any
/// failure uniformly. Poll-loop failures never reach it: they are recovered
/// inside the engine.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("send error: {0}")]
    Send(#[from] SendError),

    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum SessionError {
    /// Renewal failed. The previous session, if any, is left as it was.
    #[error("long poll server unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single GET at the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum TransportError {
    /// The deadline elapsed before the server answered.
    #[error("request timed out")]
    Timeout,

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Failure of a `method/*` API call, before it is mapped to a component error.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("envelope has neither response nor error")]
    Empty,
}

/// Which hard desync the long poll server reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardDesync {
    /// `failed=2`: the session key expired.
    KeyExpired,
    /// `failed=3`: the server lost the session information.
    InformationLost,
    /// Any `failed` code this client does not know.
    Other(i64),
}

impl HardDesync {
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => HardDesync::KeyExpired,
            3 => HardDesync::InformationLost,
            other => HardDesync::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            HardDesync::KeyExpired => 2,
            HardDesync::InformationLost => 3,
            HardDesync::Other(code) => code,
        }
    }
}

/// Reasons a poll did not produce a clean batch. Recovered inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum PollError {
    #[error("cursor out of date (failed=1)")]
    SoftDesync,

    #[error("session lost (failed={})", .0.code())]
    HardDesync(HardDesync),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed poll response: {0}")]
    Malformed(String),

    #[error("{0} consecutive poll timeouts")]
    Stalled(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum SendError {
    #[error("bot is not started")]
    NotStarted,

    #[error("message rejected: {message}")]
    Rejected { code: Option<i64>, message: String },
}

impl From<CallError> for SendError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Api { code, message } => SendError::Rejected {
                code: Some(code),
                message,
            },
            other => SendError::Rejected {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ClockError {
    #[error("bot is not started")]
    NotStarted,

    #[error("server time fetch failed: {0}")]
    FetchFailed(String),

    #[error("timezone offset {0} is out of range")]
    InvalidOffset(i64),

    #[error("time is not synchronized")]
    NotSynced,

    #[error("implausible local time for timestamp {0}")]
    ImplausibleTime(i64),
}
