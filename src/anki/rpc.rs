//! AnkiConnect HTTP client with connection-reset retries.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::{FlashcardRpc, envelope};
use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Per-request timeout against the local endpoint.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Pacing and retry settings for AnkiConnect calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Wait before the first attempt of every call.
    pub initial_delay: Duration,
    /// Retry `n` sleeps `backoff_step * n`.
    pub backoff_step: Duration,
    /// Extra attempts allowed after a connection reset.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            backoff_step: Duration::from_millis(500),
            max_retries: 2,
        }
    }
}

/// Run `attempt` under `policy`.
///
/// Only [`Error::ConnectionReset`] is retried. A refused connection is
/// reported with setup hints and returned as is.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    action: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    tokio::time::sleep(policy.initial_delay).await;

    let mut retry = 0u32;
    loop {
        match attempt(retry).await {
            Ok(value) => {
                record_call(action, "ok");
                return Ok(value);
            }
            Err(e) if e.is_connection_reset() && retry < policy.max_retries => {
                retry += 1;
                let wait = policy.backoff_step * retry;
                warn!(
                    action,
                    attempt = retry,
                    max_attempts = policy.max_retries + 1,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "connection issue, retrying"
                );
                record_call(action, "retry");
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                if matches!(e, Error::ConnectionRefused(_)) {
                    error!("cannot connect to Anki; check that:");
                    error!("  1. Anki is running");
                    error!("  2. the AnkiConnect add-on is installed (code 2055492159)");
                    error!("  3. AnkiConnect allows connections from localhost");
                }
                error!(action, attempt = retry + 1, error = %e, "AnkiConnect error");
                record_call(action, "error");
                return Err(e);
            }
        }
    }
}

fn record_call(action: &str, result: &'static str) {
    metrics::anki_calls().add(
        1,
        &[
            KeyValue::new("action", action.to_string()),
            KeyValue::new("result", result),
        ],
    );
}

/// Map a transport failure onto the retry taxonomy.
pub fn classify(err: reqwest::Error) -> Error {
    use std::io::ErrorKind;

    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                ErrorKind::ConnectionRefused => return Error::ConnectionRefused(err.to_string()),
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => return Error::ConnectionReset(err.to_string()),
                _ => {}
            }
        }
        source = cause.source();
    }

    let detail = format!("{err:?}").to_lowercase();
    if detail.contains("connection reset")
        || detail.contains("hang up")
        || detail.contains("connection closed before message completed")
        || detail.contains("incompletemessage")
    {
        Error::ConnectionReset(err.to_string())
    } else if err.is_connect() {
        Error::ConnectionRefused(err.to_string())
    } else {
        Error::Http(err)
    }
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for a running AnkiConnect instance.
pub struct AnkiConnect {
    http: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl AnkiConnect {
    pub fn new(url: impl Into<String>, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            retry,
        })
    }

    async fn send_once(&self, action: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(classify)?;
        let reply: RpcReply = response.json().await.map_err(classify)?;

        if let Some(message) = reply.error {
            return Err(Error::Rpc {
                action: action.to_string(),
                message,
            });
        }
        debug!(action, "AnkiConnect call succeeded");
        Ok(reply.result)
    }
}

#[async_trait]
impl FlashcardRpc for AnkiConnect {
    async fn call(&self, action: &str, params: Value) -> Result<Value> {
        let body = envelope(action, params);
        call_with_retry(&self.retry, action, |_| self.send_once(action, &body)).await
    }
}
