use std::{env, fmt, fs, path::Path, time::Duration};

use crate::{
    api::{DEFAULT_API_BASE, DEFAULT_API_VERSION},
    clock::{MAX_OFFSET_SECONDS, MIN_OFFSET_SECONDS},
    errors::ConfigError,
    Result,
};

/// Community access token plus the community id it belongs to.
///
/// Both are checked at setup, not at load, so a bot can be constructed and
/// configured before credentials are known.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    /// Community id, with or without VK's leading `-`.
    pub group_id: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            group_id: group_id.into(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::Missing("VK_TOKEN"));
        }
        if self.unsigned_group_id().is_empty() {
            return Err(ConfigError::Missing("VK_GROUP_ID"));
        }
        Ok(())
    }

    /// Group id as `groups.getLongPollServer` expects it (no sign).
    pub fn unsigned_group_id(&self) -> &str {
        self.group_id.trim().trim_start_matches('-')
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("group_id", &self.group_id)
            .finish()
    }
}

/// Typed configuration for the bot client.
#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Credentials,

    // API
    pub api_base: String,
    pub api_version: String,
    pub request_timeout: Duration,

    // Long poll
    pub longpoll_wait: Duration,
    pub poll_timeout: Duration,
    pub error_backoff: Duration,
    pub max_idle_timeouts: Option<u32>,

    // Clock
    pub timezone_offset: i32,

    // Host loop
    pub tick_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout: Duration::from_millis(5_000),
            longpoll_wait: Duration::from_secs(25),
            poll_timeout: Duration::from_millis(30_000),
            error_backoff: Duration::from_millis(1_000),
            max_idle_timeouts: None,
            timezone_offset: 0,
            tick_interval: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Load from the process environment, after merging `.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).and_then(non_empty);

        let credentials = Credentials::new(
            get("VK_TOKEN").unwrap_or_default(),
            get("VK_GROUP_ID").unwrap_or_default(),
        );

        let api_base = get("VK_API_BASE")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);
        let api_version = get("VK_API_VERSION").unwrap_or(defaults.api_version);

        let request_timeout = parse_u64(&get, "VK_REQUEST_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);
        let longpoll_wait = parse_u64(&get, "VK_LONGPOLL_WAIT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.longpoll_wait);
        let poll_timeout = parse_u64(&get, "VK_POLL_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_timeout);
        let error_backoff = parse_u64(&get, "VK_ERROR_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.error_backoff);
        let max_idle_timeouts = parse_u64(&get, "VK_MAX_IDLE_TIMEOUTS")?
            .map(|n| n.min(u64::from(u32::MAX)) as u32)
            .filter(|n| *n > 0);
        let tick_interval = parse_u64(&get, "VK_TICK_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);

        let timezone_offset = match get("VK_TIMEZONE_OFFSET") {
            Some(raw) => raw.trim().parse::<i32>().map_err(|e| ConfigError::Invalid {
                key: "VK_TIMEZONE_OFFSET",
                reason: e.to_string(),
            })?,
            None => defaults.timezone_offset,
        };

        let cfg = Self {
            credentials,
            api_base,
            api_version,
            request_timeout,
            longpoll_wait,
            poll_timeout,
            error_backoff,
            max_idle_timeouts,
            timezone_offset,
            tick_interval,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.poll_timeout <= self.longpoll_wait {
            return Err(ConfigError::Invalid {
                key: "VK_POLL_TIMEOUT_MS",
                reason: format!(
                    "poll timeout {:?} must exceed the long poll wait window {:?}",
                    self.poll_timeout, self.longpoll_wait
                ),
            });
        }
        if !(MIN_OFFSET_SECONDS..=MAX_OFFSET_SECONDS).contains(&self.timezone_offset) {
            return Err(ConfigError::Invalid {
                key: "VK_TIMEZONE_OFFSET",
                reason: format!(
                    "{} is outside [{MIN_OFFSET_SECONDS}, {MAX_OFFSET_SECONDS}]",
                    self.timezone_offset
                ),
            });
        }
        Ok(())
    }
}

fn parse_u64(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> std::result::Result<Option<u64>, ConfigError> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
