//! JSON-RPC helpers shared by the chain provider and the explorer client.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

/// Build an HTTP client with a per-request timeout.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    /// Revert data, when the node reports an execution failure.
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Call `method` on `url` and deserialize its result.
///
/// A JSON-RPC error becomes an `anyhow` error carrying the node's code, message and
/// revert data, so gas simulation failures stay readable.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response: RpcResponse = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("{method} request failed"))?
        .json()
        .await
        .with_context(|| format!("Invalid {method} response"))?;

    if let Some(error) = response.error {
        match error.data {
            Some(data) => anyhow::bail!(
                "{method} returned error {}: {} ({data})",
                error.code,
                error.message
            ),
            None => anyhow::bail!("{method} returned error {}: {}", error.code, error.message),
        }
    }

    // `null` is a valid result, e.g. for a receipt that does not exist yet.
    let result = response.result.unwrap_or(Value::Null);
    serde_json::from_value(result).with_context(|| format!("Unexpected {method} result"))
}

/// A poll that did not produce a value in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("timed out waiting for {name} after {waited:?}{}", format_last_error(.last_error))]
pub struct PollTimeout {
    pub name: String,
    pub waited: Duration,
    /// The most recent poll error, if the last attempts failed rather than came back empty.
    pub last_error: Option<String>,
}

pub(crate) fn format_last_error(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last error: {e})"))
        .unwrap_or_default()
}

/// Poll `check_fn` until it yields a value.
///
/// `check_fn` returns `Ok(Some(_))` when done, `Ok(None)` to keep waiting. Errors are
/// treated as transient: they are logged and the latest one is reported if the wait
/// times out. A successful poll clears it. With `timeout` set to `None` the wait is
/// unbounded.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    interval: Duration,
    timeout: Option<Duration>,
    check_fn: F,
) -> Result<T, PollTimeout>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let mut last_error: Option<String> = None;

    loop {
        if let Some(max_duration) = timeout {
            let waited = start.elapsed();
            if waited > max_duration {
                return Err(PollTimeout {
                    name: name.to_string(),
                    waited,
                    last_error,
                });
            }
        }

        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                last_error = None;
                tracing::trace!(target_name = %name, "Condition not met yet, polling again...");
            }
            Err(e) => {
                let message = format!("{e:#}");
                // Warn once per outage, then keep quiet until it changes.
                if last_error.as_deref() != Some(message.as_str()) {
                    tracing::warn!(error = %message, target_name = %name, "Poll failed, retrying...");
                } else {
                    tracing::debug!(error = %message, target_name = %name, "Poll failed, retrying...");
                }
                last_error = Some(message);
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// Parse a hex quantity (`0x`-prefixed) into a u64.
pub fn parse_quantity(value: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {}", value))
}

/// Encode a u64 as a JSON-RPC hex quantity.
pub fn to_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}
