//! Named remote function invocation (`POST <base>/functions/v1/<name>`).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::config::Config;
use crate::retry::{self, RetryPolicy};
use crate::{AppError, AppResult};

pub const GUESTY_SYNC: &str = "guesty-sync";
pub const GUESTY_BOOKING_SYNC: &str = "guesty-booking-sync";
pub const GUESTY_HEALTH_CHECK: &str = "guesty-health-check";
pub const GOOGLE_SHEETS: &str = "google-sheets";

#[async_trait]
pub trait RemoteFunctions: Send + Sync {
    /// Invoke a named function with a JSON body and return its JSON response.
    async fn invoke(&self, name: &str, body: Value) -> AppResult<Value>;
}

#[derive(Debug, Clone)]
pub struct HttpFunctions {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpFunctions {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("villaops/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            retry,
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let (url, key) = config.require_functions()?;
        Self::new(url, key, config.http_timeout, RetryPolicy::default())
    }

    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, name)
    }

    async fn send(&self, name: &str, body: &Value) -> AppResult<Value> {
        let res = self
            .http
            .post(self.endpoint(name))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| AppError::from(err).with_context("function", name))?;

        let status = res.status();
        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            return res
                .json::<Value>()
                .await
                .map_err(|err| AppError::from(err).with_context("function", name));
        }

        let text = res.text().await.unwrap_or_default();
        Err(AppError::new("HTTP/STATUS", error_message(&text, status))
            .with_context("status", status.as_u16().to_string())
            .with_context("function", name))
    }
}

/// Prefer the `error`/`message` field of a JSON error body, else the raw text.
fn error_message(body: &str, status: StatusCode) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = parsed.as_ref().and_then(|v| {
        v.get("error")
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match field {
        Some(msg) => msg,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => format!("remote function returned {status}"),
    }
}

#[async_trait]
impl RemoteFunctions for HttpFunctions {
    async fn invoke(&self, name: &str, body: Value) -> AppResult<Value> {
        tracing::debug!(target: "villaops", event = "function_invoke", function = name);
        retry::with_retry(self.retry, name, || self.send(name, &body)).await
    }
}

/// Scripted stand-in for the remote side: returns queued responses in order
/// and records every call.
#[derive(Debug, Default)]
pub struct ScriptedFunctions {
    responses: Mutex<VecDeque<AppResult<Value>>>,
    fallback: Mutex<Option<Value>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: AppResult<Value>) -> &Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
        self
    }

    /// Response returned once the queue is exhausted.
    pub fn always(&self, response: Value) -> &Self {
        *self.fallback.lock().unwrap_or_else(|e| e.into_inner()) = Some(response);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl RemoteFunctions for ScriptedFunctions {
    async fn invoke(&self, name: &str, body: Value) -> AppResult<Value> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), body));
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(response) => response,
            None => self
                .fallback
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
                .ok_or_else(|| {
                    AppError::new("FUNCTIONS/UNSCRIPTED", "No scripted response left")
                        .with_context("function", name)
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_joins_base_and_name() {
        let client = HttpFunctions::new(
            "https://ops.example.test/",
            "key",
            Duration::from_secs(5),
            RetryPolicy::none(),
        )
        .expect("client");
        assert_eq!(
            client.endpoint(GUESTY_SYNC),
            "https://ops.example.test/functions/v1/guesty-sync"
        );
    }

    #[test]
    fn error_message_prefers_json_error_field() {
        assert_eq!(
            error_message(r#"{"error":"listing missing"}"#, StatusCode::NOT_FOUND),
            "listing missing"
        );
        assert_eq!(error_message("gateway down", StatusCode::BAD_GATEWAY), "gateway down");
        assert!(error_message("", StatusCode::BAD_GATEWAY).contains("502"));
    }

    #[tokio::test]
    async fn scripted_functions_replay_in_order() {
        let fake = ScriptedFunctions::new();
        fake.push(Ok(json!({"n": 1})))
            .push(Err(AppError::new("HTTP/STATUS", "nope")));
        assert_eq!(fake.invoke("a", json!({})).await.unwrap()["n"], 1);
        assert!(fake.invoke("b", json!({})).await.is_err());
        assert_eq!(
            fake.invoke("c", json!({})).await.unwrap_err().code(),
            "FUNCTIONS/UNSCRIPTED"
        );
        let names: Vec<String> = fake.calls().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
