//! Fakes shared by the unit tests of this crate.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    api::VkApi,
    config::{Config, Credentials},
    errors::TransportError,
    ports::{HttpResponse, Transport},
};

/// Transport that replays queued replies in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push_body(status, &body.to_string());
    }

    pub(crate) fn push_body(&self, status: u16, body: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, body)));
    }

    pub(crate) fn push_err(&self, err: TransportError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    /// Requested URLs with the timeout each was given.
    pub(crate) fn requests(&self) -> Vec<(String, Duration)> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|(url, _)| url).collect()
    }

    pub(crate) fn pending(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), timeout));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("no scripted reply".to_string())))
    }
}

pub(crate) fn test_config() -> Config {
    Config {
        api_base: "https://api.test/method".to_string(),
        error_backoff: Duration::ZERO,
        ..Config::default()
    }
    .with_credentials(Credentials::new("tok", "-123"))
}

pub(crate) fn test_api(transport: Arc<ScriptedTransport>) -> Arc<VkApi> {
    Arc::new(VkApi::new(&test_config(), transport))
}

pub(crate) fn long_poll_server(server: &str, key: &str, ts: &str) -> serde_json::Value {
    serde_json::json!({"response": {"server": server, "key": key, "ts": ts}})
}
