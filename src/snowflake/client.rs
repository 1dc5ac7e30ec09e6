//! Snowflake REST API client implementation.
//!
//! This module provides the HTTP client shared by the agent and grant
//! services. Retries for rate limiting and network failures happen here,
//! below the reconciliation logic.

use reqwest::{Client, Method, Url, header};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::error::{ApiError, HalldyllError, Result};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Token type header required for programmatic access tokens.
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";

/// Token type sent with every request.
const TOKEN_TYPE: &str = "PROGRAMMATIC_ACCESS_TOKEN";

/// Snowflake REST API client.
#[derive(Debug, Clone)]
pub struct SnowflakeClient {
    /// HTTP client.
    client: Client,
    /// Account base URL.
    base_url: Url,
    /// Programmatic access token.
    token: String,
    /// Base delay between retries.
    retry_delay: Duration,
}

impl SnowflakeClient {
    /// Creates a new client for the given account URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    pub fn new(account_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(account_url, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    pub fn with_timeout(account_url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let base_url = Url::parse(account_url.trim_end_matches('/')).map_err(|e| {
            ApiError::network(format!("Invalid account URL '{account_url}': {e}"))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("halldyll/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Creates a client from the connection section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn from_config(connection: &ConnectionConfig, token: &str) -> Result<Self> {
        Self::with_timeout(
            &connection.account_url,
            token,
            connection.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Sets the base delay between retries.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Builds a URL from path segments; each segment is percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the account URL cannot carry a path.
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::network(format!("Account URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a request, retrying transient failures.
    ///
    /// Returns the JSON body, or `Value::Null` for an empty body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retries.
    pub async fn execute(&self, method: Method, segments: &[&str], body: Option<&Value>) -> Result<Value> {
        let url = self.url(segments)?;
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for {method} {url}");
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match self.execute_once(method.clone(), url.clone(), body).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::network("Max retries exceeded").into()))
    }

    /// Sends a single request.
    async fn execute_once(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value> {
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(TOKEN_TYPE_HEADER, TOKEN_TYPE);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(HalldyllError::Api(ApiError::RateLimited {
                retry_after_secs: retry_after,
            }));
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(HalldyllError::Api(ApiError::AuthenticationFailed {
                message: error_message(&body).unwrap_or_else(|| String::from("Invalid token")),
            }));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response: {e}")))?;
        trace!("{status}: {text}");

        if !status.is_success() {
            if status.as_u16() == 422
                && let Some((code, message)) = statement_error(&text)
            {
                return Err(HalldyllError::Api(ApiError::StatementFailed { code, message }));
            }
            let message = error_message(&text).unwrap_or(text);
            return Err(HalldyllError::Api(ApiError::api_error(status.as_u16(), message)));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| ApiError::invalid_response(format!("Failed to parse response: {e}")).into())
    }
}

/// Extracts the `message` field of an error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(ToString::to_string)
}

/// Extracts `code` and `message` of a rejected SQL statement.
fn statement_error(body: &str) -> Option<(String, String)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let code = value.get("code")?.as_str()?.to_string();
    let message = value.get("message")?.as_str()?.to_string();
    Some((code, message))
}
