//! Retrying HTTP transport shared by all backend adapters.
//!
//! Every attempt runs under its own timeout; an attempt that exceeds it is
//! dropped, which aborts the in-flight request. Network failures and 5xx
//! responses are retried with exponential backoff, everything else fails
//! on the first attempt.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{RelingoError, Result, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }
}

fn default_status_ok(status: u16) -> bool {
    (200..300).contains(&status)
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Timeout for a single attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub retries: u32,
    /// Base delay, doubled on every retry
    pub retry_delay: Duration,
    pub is_status_ok: fn(u16) -> bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: HttpMethod::Post,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            query: Vec::new(),
            body: None,
            timeout: Duration::from_secs(30),
            retries: 3,
            retry_delay: Duration::from_millis(1000),
            is_status_ok: default_status_ok,
        }
    }
}

impl RequestOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Parsed JSON body, or the raw text as a JSON string when it is not JSON
    pub data: Value,
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
}

/// Delay before retry number `attempt` (zero based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("relingo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelingoError::Unknown(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Send a request, retrying retryable failures up to `options.retries` times.
    pub async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let mut attempt = 0u32;

        loop {
            match self.attempt(url, options).await {
                Ok(response) => return Ok(response),
                Err(mut error) => {
                    error.attempts = attempt + 1;
                    if !error.is_retryable() || attempt >= options.retries {
                        return Err(error);
                    }

                    let delay = backoff_delay(options.retry_delay, attempt);
                    debug!(
                        "Attempt {} to {} failed: {}. Retrying in {:?}",
                        attempt + 1,
                        url,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let mut request = self.client.request(options.method.into(), url);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect::<HashMap<_, _>>();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, headers, text))
        };

        let (status, headers, text) = match tokio::time::timeout(options.timeout, exchange).await {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => {
                return Err(TransportError {
                    message: format!("Network error: {}", e),
                    status: None,
                    body: None,
                    attempts: 0,
                });
            }
            Err(_) => {
                return Err(TransportError {
                    message: format!("Request timed out after {:?}", options.timeout),
                    status: None,
                    body: None,
                    attempts: 0,
                });
            }
        };

        let code = status.as_u16();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();

        if !(options.is_status_ok)(code) {
            return Err(TransportError {
                message: format!("HTTP {} {}: {}", code, status_text, text),
                status: Some(code),
                body: Some(text),
                attempts: 0,
            });
        }

        let data = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) => Value::String(text),
            }
        };

        Ok(TransportResponse {
            data,
            status: code,
            status_text,
            headers,
        })
    }
}
