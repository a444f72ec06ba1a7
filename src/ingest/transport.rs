// src/ingest/transport.rs
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::ingest::error::TransportError;

/// Network collaborator: one GET, whole body in memory.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(user_agent.to_string())
            .build()
            .context("building reqwest client")?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> TransportError {
    if let Some(status) = err.status() {
        return TransportError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        };
    }
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_connect() || err.is_request() {
        TransportError::Connect {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else if err.is_decode() {
        TransportError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        TransportError::Body {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp.bytes().await.map_err(|e| map_reqwest_error(url, e))?;
        Ok(body.to_vec())
    }
}

/// In-memory transport with scripted responses per URL.
///
/// Each URL holds a queue; responses are popped in order and the last one repeats.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct StaticTransport {
    routes: Mutex<HashMap<String, VecDeque<Result<Vec<u8>, TransportError>>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.push(url, Ok(body.into()));
        self
    }

    pub fn with_error(self, url: &str, err: TransportError) -> Self {
        self.push(url, Err(err));
        self
    }

    /// Queue one more response for `url`.
    pub fn push(&self, url: &str, response: Result<Vec<u8>, TransportError>) {
        let mut routes = self.routes.lock().expect("transport routes poisoned");
        routes.entry(url.to_string()).or_default().push_back(response);
    }

    /// Replace everything queued for `url` with a single repeating response.
    pub fn set(&self, url: &str, response: Result<Vec<u8>, TransportError>) {
        let mut routes = self.routes.lock().expect("transport routes poisoned");
        routes.insert(url.to_string(), VecDeque::from([response]));
    }

    pub fn calls(&self, url: &str) -> usize {
        let calls = self.calls.lock().expect("transport calls poisoned");
        calls.get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for StaticTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        *self
            .calls
            .lock()
            .expect("transport calls poisoned")
            .entry(url.to_string())
            .or_default() += 1;

        let mut routes = self.routes.lock().expect("transport routes poisoned");
        let Some(queue) = routes.get_mut(url) else {
            return Err(TransportError::Status {
                status: 404,
                url: url.to_string(),
            });
        };

        if queue.len() > 1 {
            if let Some(next) = queue.pop_front() {
                return next;
            }
        }
        queue.front().cloned().unwrap_or(Err(TransportError::Status {
            status: 404,
            url: url.to_string(),
        }))
    }
}
