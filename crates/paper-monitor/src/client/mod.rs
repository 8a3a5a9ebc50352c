//! Shared HTTP client for catalog and model APIs.
//!
//! Provides async HTTP client with:
//! - Connection pooling via reqwest
//! - Optional retry middleware with exponential backoff (catalogs only)
//! - Uniform mapping of HTTP statuses to [`ClientError`]

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::config::{HttpConfig, api};
use crate::error::{ClientError, ClientResult};

const USER_AGENT_VALUE: &str = concat!("paper-monitor/", env!("CARGO_PKG_VERSION"));

/// Whether transient failures are retried inside the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Retry 5xx/429/connection errors with exponential backoff.
    Transient,
    /// Surface every failure to the caller unchanged.
    Never,
}

/// HTTP client with middleware.
#[derive(Clone)]
pub struct HttpClient {
    /// HTTP client with middleware.
    client: ClientWithMiddleware,

    /// Whether a bearer token is attached.
    authenticated: bool,
}

impl HttpClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails or the token is not a valid header.
    pub fn new(http: &HttpConfig, retry: RetryMode, bearer: Option<&str>) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ClientError::bad_request(format!("invalid API key header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(http.request_timeout())
            .connect_timeout(http.connect_timeout())
            .pool_max_idle_per_host(api::MAX_KEEPALIVE)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .gzip(true)
            .build()?;

        let mut builder = ClientBuilder::new(client);
        if retry == RetryMode::Transient && http.max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder()
                .retry_bounds(Duration::from_secs(1), Duration::from_secs(30))
                .build_with_max_retries(http.max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self { client: builder.build(), authenticated: bearer.is_some() })
    }

    /// Check if a bearer token is attached.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// GET a URL and return the body as text.
    pub async fn get_text(&self, url: &str, params: &[(String, String)]) -> ClientResult<String> {
        let response = self.client.get(url).query(params).send().await?;
        let response = handle_response(response).await?;
        Ok(response.text().await?)
    }

    /// GET a URL and decode the JSON body.
    pub async fn get_json<T>(&self, url: &str, params: &[(String, String)]) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.client.get(url).query(params).send().await?;
        let response = handle_response(response).await?;
        let value: serde_json::Value = response.json().await?;

        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<T>(&self, url: &str, body: &serde_json::Value) -> ClientResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let body_str = serde_json::to_string(body)?;

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body_str)
            .send()
            .await?;

        let response = handle_response(response).await?;
        let value: serde_json::Value = response.json().await?;

        serde_json::from_value(value).map_err(ClientError::from)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").field("authenticated", &self.authenticated).finish()
    }
}

/// Map non-success HTTP statuses to [`ClientError`].
async fn handle_response(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        429 => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());

            Err(ClientError::rate_limited(retry_after))
        }
        413 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::payload_too_large(text))
        }
        404 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::not_found(text))
        }
        400 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::bad_request(text))
        }
        500..=599 => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::server(status.as_u16(), text))
        }
        _ => {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::UnexpectedStatus { status: status.as_u16(), message: text })
        }
    }
}
