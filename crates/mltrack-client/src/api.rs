//! HTTP transport for the tracking service.
//!
//! One [`ApiClient`] owns the connection pool and the per-call timeout; every
//! remote operation in this crate goes through its helpers, which return the
//! raw status plus the decoded body and leave interpretation (envelope
//! unwrapping, conflict handling) to the caller.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};

/// Default per-call timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Authentication applied to every request.
#[derive(Debug, Clone)]
pub enum Auth {
    Bearer(String),
    Basic { username: String, password: Option<String> },
}

/// Shared HTTP client for the tracking service.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    auth: Option<Auth>,
    extra_headers: HashMap<String, String>,
    client: Client,
}

impl ApiClient {
    /// Creates a client with the default timeout and no authentication.
    pub fn new(base_url: impl Into<String>) -> TrackerResult<Self> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            auth: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            extra_headers: HashMap::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.auth {
            Some(Auth::Bearer(token)) => request = request.bearer_auth(token),
            Some(Auth::Basic { username, password }) => {
                request = request.basic_auth(username, password.as_ref());
            }
            None => {}
        }
        for (name, value) in &self.extra_headers {
            request = request.header(name, value);
        }
        request
    }

    pub(crate) async fn get_json(&self, path: &str) -> TrackerResult<(StatusCode, Value)> {
        let response = self.request(Method::GET, path).send().await?;
        Self::decode(response).await
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> TrackerResult<(StatusCode, Value)> {
        let response = self.request(Method::POST, path).json(body).send().await?;
        Self::decode(response).await
    }

    pub(crate) async fn patch_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> TrackerResult<(StatusCode, Value)> {
        let response = self.request(Method::PATCH, path).json(body).send().await?;
        Self::decode(response).await
    }

    pub(crate) async fn post_multipart(
        &self,
        path: &str,
        form: Form,
    ) -> TrackerResult<(StatusCode, Value)> {
        let response = self.request(Method::POST, path).multipart(form).send().await?;
        Self::decode(response).await
    }

    /// Decodes a response body as JSON, keeping non-JSON bodies as raw text
    /// so error reporting never loses the payload.
    async fn decode(response: Response) -> TrackerResult<(StatusCode, Value)> {
        let status = response.status();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        debug!(status = status.as_u16(), "response decoded");
        Ok((status, body))
    }

    /// The 2xx gate shared by all write-path calls.
    pub(crate) fn ensure_success(
        context: &str,
        status: StatusCode,
        body: &Value,
    ) -> TrackerResult<()> {
        if status.is_success() {
            return Ok(());
        }
        Err(TrackerError::Transport {
            context: context.to_string(),
            status: status.as_u16(),
            body: body.to_string(),
        })
    }
}

/// Builder for [`ApiClient`].
#[derive(Debug)]
pub struct ApiClientBuilder {
    base_url: String,
    auth: Option<Auth>,
    timeout: Duration,
    extra_headers: HashMap<String, String>,
}

impl ApiClientBuilder {
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(Auth::Bearer(token.into()));
        self
    }

    #[must_use]
    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.auth = Some(Auth::Basic { username: username.into(), password });
        self
    }

    /// Overrides the per-call timeout (default [`DEFAULT_TIMEOUT_SECS`]).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> TrackerResult<ApiClient> {
        let client = Client::builder().timeout(self.timeout).build()?;
        Ok(ApiClient {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            auth: self.auth,
            extra_headers: self.extra_headers,
            client,
        })
    }
}
