//! Schwab HTTP client.
//!
//! Network errors, 408, 429 and 5xx responses are retried on the
//! configured backoff schedule; a 429 `Retry-After` header overrides the
//! computed delay. Every other status fails immediately.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::api_types::SchwabErrorResponse;
use super::config::RetryConfig;
use super::error::SchwabError;
use crate::infrastructure::metrics::{Provider, record_provider_error, record_provider_request};

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP client for the Schwab API with retry logic.
#[derive(Debug, Clone)]
pub struct SchwabHttpClient {
    client: Client,
    base_url: String,
    retry_config: RetryConfig,
}

impl SchwabHttpClient {
    /// Create a client for `base_url`.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        retry_config: RetryConfig,
    ) -> Result<Self, SchwabError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchwabError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config,
        })
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with a bearer token.
    pub async fn get_bearer<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, &str)],
        access_token: &str,
    ) -> Result<T, SchwabError> {
        let url = format!("{}{path}", self.base_url);
        self.request(endpoint, || {
            self.client.get(&url).query(query).bearer_auth(access_token)
        })
        .await
    }

    /// POST a form to `path` with HTTP Basic credentials.
    pub async fn post_form_basic<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        form: &[(&str, &str)],
        username: &str,
        password: &str,
    ) -> Result<T, SchwabError> {
        let url = format!("{}{path}", self.base_url);
        self.request(endpoint, || {
            self.client
                .post(&url)
                .basic_auth(username, Some(password))
                .form(form)
        })
        .await
    }

    async fn request<T, F>(&self, endpoint: &'static str, build: F) -> Result<T, SchwabError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        record_provider_request(Provider::Schwab, endpoint);
        let result = self.send_with_retry(endpoint, build).await;
        if let Err(err) = &result {
            record_provider_error(Provider::Schwab, err.kind());
        }
        result
    }

    async fn send_with_retry<T, F>(&self, endpoint: &'static str, build: F) -> Result<T, SchwabError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut backoff = self.retry_config.backoff();

        loop {
            let failure = match build().send().await {
                Ok(response) if response.status().is_success() => return decode(response).await,
                Ok(response) => Failure::from_response(response).await,
                Err(e) => Failure::Network(e.to_string()),
            };

            let Some(hint) = failure.retry_hint() else {
                return Err(failure.into_error(backoff.attempts()));
            };
            let Some(computed) = backoff.next() else {
                return Err(failure.into_error(backoff.attempts()));
            };
            let delay = hint.unwrap_or(computed);

            tracing::warn!(
                endpoint,
                failure = %failure,
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis(),
                "Schwab request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SchwabError> {
    let body = response
        .text()
        .await
        .map_err(|e| SchwabError::Network(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| SchwabError::JsonParse(e.to_string()))
}

/// A failed attempt.
#[derive(Debug)]
enum Failure {
    Network(String),
    Status {
        status: StatusCode,
        message: String,
        retry_after: Option<u64>,
    },
}

impl Failure {
    async fn from_response(response: Response) -> Self {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<SchwabErrorResponse>(&body)
            .ok()
            .and_then(SchwabErrorResponse::summary)
            .unwrap_or(body);

        Self::Status {
            status,
            message,
            retry_after,
        }
    }

    /// `None` if the failure is final; otherwise the delay the server asked
    /// for, if any.
    fn retry_hint(&self) -> Option<Option<Duration>> {
        match self {
            Self::Network(_) => Some(None),
            Self::Status {
                status,
                retry_after,
                ..
            } => match categorize_status(*status) {
                ErrorCategory::RateLimited => Some(retry_after.map(Duration::from_secs)),
                ErrorCategory::Retryable => Some(None),
                ErrorCategory::NonRetryable => None,
            },
        }
    }

    fn into_error(self, attempts: u32) -> SchwabError {
        match self {
            Self::Network(message) if attempts <= 1 => SchwabError::Network(message),
            Self::Network(_) => SchwabError::MaxRetriesExceeded { attempts },
            Self::Status {
                status,
                message,
                retry_after,
            } => match status {
                StatusCode::TOO_MANY_REQUESTS => SchwabError::RateLimited {
                    retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
                },
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SchwabError::Unauthorized {
                    status: status.as_u16(),
                },
                StatusCode::NOT_FOUND => SchwabError::NotFound(message),
                _ => SchwabError::Api {
                    status: status.as_u16(),
                    message,
                },
            },
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(message) => write!(f, "network: {message}"),
            Self::Status {
                status, message, ..
            } => write!(f, "{status}: {message}"),
        }
    }
}

/// Retry class of an HTTP status.
#[derive(Debug, PartialEq, Eq)]
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}
