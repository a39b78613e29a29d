//! VK API envelopes and request building.
//!
//! Every `method/*` call answers with either `{"response": ...}` or
//! `{"error": {"error_code", "error_msg"}}`. The long poll server answers
//! with its own shape (`ts`, `failed`, `updates`).

use std::{sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use tracing::debug;

use crate::{
    config::{Config, Credentials},
    domain::PeerId,
    errors::{CallError, TransportError},
    ports::Transport,
    utils::{redact_token, with_query},
};

pub const DEFAULT_API_BASE: &str = "https://api.vk.com/method";
pub const DEFAULT_API_VERSION: &str = "5.199";

/// `mode` flags for `a_check`: 2 asks for attachments.
pub const LONG_POLL_MODE: u32 = 2;
/// Long poll protocol version.
pub const LONG_POLL_VERSION: u32 = 3;

#[derive(Clone, Debug, Deserialize)]
pub struct Envelope<T> {
    pub response: Option<T>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

impl<T> Envelope<T> {
    pub fn into_result(self) -> Result<T, CallError> {
        if let Some(err) = self.error {
            return Err(CallError::Api {
                code: err.error_code,
                message: err.error_msg,
            });
        }
        self.response.ok_or(CallError::Empty)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

/// `groups.getLongPollServer` payload.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LongPollServer {
    pub server: String,
    pub key: String,
    #[serde(deserialize_with = "de_cursor")]
    pub ts: String,
}

/// Body returned by the long poll server for `act=a_check`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PollResponse {
    #[serde(default, deserialize_with = "de_opt_cursor")]
    pub ts: Option<String>,
    #[serde(default)]
    pub failed: Option<i64>,
    #[serde(default)]
    pub updates: Option<Vec<serde_json::Value>>,
}

impl PollResponse {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCursor {
    Text(String),
    Number(u64),
}

impl From<RawCursor> for String {
    fn from(raw: RawCursor) -> Self {
        match raw {
            RawCursor::Text(s) => s,
            RawCursor::Number(n) => n.to_string(),
        }
    }
}

// The cursor is a string in the Bots Long Poll API, but older servers send a number.
fn de_cursor<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawCursor::deserialize(d).map(String::from)
}

fn de_opt_cursor<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawCursor>::deserialize(d)?.map(String::from))
}

/// Request builder and caller for the `method/*` endpoints.
pub struct VkApi {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    base: String,
    version: String,
    request_timeout: Duration,
}

impl VkApi {
    pub fn new(cfg: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            credentials: cfg.credentials.clone(),
            base: cfg.api_base.trim_end_matches('/').to_string(),
            version: cfg.api_version.clone(),
            request_timeout: cfg.request_timeout,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    fn method_url(&self, method: &str, params: &[(&str, &str)]) -> String {
        let mut all: Vec<(&str, &str)> = vec![("access_token", self.credentials.token.as_str())];
        all.extend_from_slice(params);
        all.push(("v", self.version.as_str()));
        with_query(&format!("{}/{method}", self.base), &all)
    }

    pub fn long_poll_server_url(&self) -> String {
        self.method_url(
            "groups.getLongPollServer",
            &[("group_id", self.credentials.unsigned_group_id())],
        )
    }

    pub fn send_url(&self, peer_id: PeerId, text: &str, random_id: i32) -> String {
        let peer = peer_id.0.to_string();
        let random = random_id.to_string();
        self.method_url(
            "messages.send",
            &[
                ("peer_id", peer.as_str()),
                ("message", text),
                ("random_id", random.as_str()),
            ],
        )
    }

    pub fn server_time_url(&self) -> String {
        self.method_url("utils.getServerTime", &[])
    }

    /// GET a `method/*` URL and unwrap its envelope.
    pub async fn call<T: DeserializeOwned>(&self, url: &str) -> Result<T, CallError> {
        debug!(url = %redact_token(url), "api call");
        let resp = self.transport.get(url, self.request_timeout).await?;
        if !resp.is_ok() {
            return Err(CallError::Transport(TransportError::Status(resp.status)));
        }
        let envelope: Envelope<T> = serde_json::from_str(&resp.body)
            .map_err(|e| CallError::Malformed(e.to_string()))?;
        envelope.into_result()
    }

    /// `utils.getServerTime`: Unix seconds according to the server.
    pub async fn server_time(&self) -> Result<u64, CallError> {
        self.call::<u64>(&self.server_time_url()).await
    }
}

/// URL for one `a_check` on an acquired long poll server.
pub fn poll_url(server: &str, key: &str, cursor: &str, wait: Duration) -> String {
    let wait = wait.as_secs().to_string();
    let mode = LONG_POLL_MODE.to_string();
    let version = LONG_POLL_VERSION.to_string();
    with_query(
        server,
        &[
            ("act", "a_check"),
            ("key", key),
            ("ts", cursor),
            ("wait", wait.as_str()),
            ("mode", mode.as_str()),
            ("version", version.as_str()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_api, ScriptedTransport};
    use serde_json::json;

    #[test]
    fn long_poll_server_url_strips_group_sign() {
        let api = test_api(ScriptedTransport::new());
        assert_eq!(
            api.long_poll_server_url(),
            "https://api.test/method/groups.getLongPollServer?access_token=tok&group_id=123&v=5.199"
        );
    }

    #[test]
    fn send_url_encodes_message() {
        let api = test_api(ScriptedTransport::new());
        assert_eq!(
            api.send_url(PeerId(7), "a b&c", 42),
            "https://api.test/method/messages.send?access_token=tok&peer_id=7&message=a%20b%26c&random_id=42&v=5.199"
        );
    }

    #[test]
    fn poll_url_carries_cursor_and_wait() {
        assert_eq!(
            poll_url("https://lp.vk.com/wh1", "K", "17", Duration::from_secs(25)),
            "https://lp.vk.com/wh1?act=a_check&key=K&ts=17&wait=25&mode=2&version=3"
        );
    }

    #[test]
    fn cursor_accepts_string_or_number() {
        let a: LongPollServer =
            serde_json::from_value(json!({"server": "S", "key": "K", "ts": "1"})).unwrap();
        let b: LongPollServer =
            serde_json::from_value(json!({"server": "S", "key": "K", "ts": 1})).unwrap();
        assert_eq!(a, b);

        let p = PollResponse::parse(r#"{"ts": 5, "updates": []}"#).unwrap();
        assert_eq!(p.ts.as_deref(), Some("5"));
        let p = PollResponse::parse(r#"{"failed": 2}"#).unwrap();
        assert_eq!(p.ts, None);
        assert_eq!(p.failed, Some(2));
    }

    #[test]
    fn envelope_prefers_error_then_response() {
        let e: Envelope<i64> = serde_json::from_value(json!({
            "error": {"error_code": 901, "error_msg": "Can't send"}
        }))
        .unwrap();
        assert_eq!(
            e.into_result(),
            Err(CallError::Api {
                code: 901,
                message: "Can't send".to_string()
            })
        );

        let ok: Envelope<i64> = serde_json::from_value(json!({"response": 12})).unwrap();
        assert_eq!(ok.into_result(), Ok(12));

        let empty: Envelope<i64> = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.into_result(), Err(CallError::Empty));
    }

    #[tokio::test]
    async fn call_maps_status_and_garbage() {
        let transport = ScriptedTransport::new();
        transport.push_body(502, "bad gateway");
        transport.push_body(200, "<html>");
        let api = test_api(transport.clone());

        let err = api.server_time().await.unwrap_err();
        assert_eq!(err, CallError::Transport(TransportError::Status(502)));
        let err = api.server_time().await.unwrap_err();
        assert!(matches!(err, CallError::Malformed(_)));
    }

    #[tokio::test]
    async fn server_time_uses_request_timeout() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"response": 1_700_000_000u64}));
        let api = test_api(transport.clone());

        assert_eq!(api.server_time().await, Ok(1_700_000_000));
        let reqs = transport.requests();
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].0.contains("/utils.getServerTime?access_token=tok&v=5.199"));
        assert_eq!(reqs[0].1, Duration::from_secs(5));
    }
}
