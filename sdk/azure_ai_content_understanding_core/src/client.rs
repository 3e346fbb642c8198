//! HTTP client for Azure AI Content Understanding.
//!
//! This module provides [`CuClient`], the main entry point for talking to a
//! Content Understanding resource. The client handles authentication, the
//! `api-version` query parameter, transient-error retries, and error decoding.
//!
//! # Examples
//!
//! ## Using a subscription key
//! ```rust,no_run
//! use azure_ai_content_understanding_core::client::CuClient;
//! use azure_ai_content_understanding_core::auth::CuCredential;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CuClient::builder()
//!     .endpoint("https://your-resource.services.ai.azure.com")
//!     .credential(CuCredential::subscription_key("your-key"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the Azure CLI credential
//! ```rust,no_run
//! use azure_ai_content_understanding_core::client::CuClient;
//! use azure_ai_content_understanding_core::auth::CuCredential;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CuClient::builder()
//!     .endpoint("https://your-resource.services.ai.azure.com")
//!     .credential(CuCredential::azure_cli()?)
//!     .user_agent("my-app/1.0")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::auth::CuCredential;
use crate::error::{CuError, CuResult};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as HttpClient, RequestBuilder};
use url::Url;

use std::time::Duration;

/// Default API version for Content Understanding.
pub const DEFAULT_API_VERSION: &str = "2025-05-01-preview";

/// Default value of the `x-ms-useragent` header.
pub const DEFAULT_USER_AGENT: &str = "azure-ai-content-understanding-rust";

/// Header used by the service to attribute traffic to a client.
pub const USER_AGENT_HEADER: &str = "x-ms-useragent";

/// Environment variable holding the resource endpoint.
pub const ENDPOINT_ENV: &str = "AZURE_AI_ENDPOINT";

/// Environment variable holding the API version.
pub const API_VERSION_ENV: &str = "AZURE_AI_API_VERSION";

/// Default connection timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read/response timeout (60 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Determines if an HTTP status code represents a retriable error.
///
/// Retriable errors are transient server-side issues that may succeed on retry:
/// - 429 Too Many Requests (rate limiting)
/// - 500 Internal Server Error
/// - 502 Bad Gateway
/// - 503 Service Unavailable
/// - 504 Gateway Timeout
#[inline]
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Configuration for automatic retry behavior on transient errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the initial request).
    pub max_retries: u32,
    /// Initial backoff duration before the first retry.
    /// Subsequent retries use exponential backoff (2^attempt * initial_backoff).
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// The base client for the Content Understanding REST API.
///
/// Higher-level modules (analyzers, the operation poller) take a `&CuClient`
/// and build on its request helpers.
///
/// The client is cheaply cloneable and can be shared across threads.
#[derive(Debug, Clone)]
pub struct CuClient {
    pub(crate) http: HttpClient,
    pub(crate) endpoint: Url,
    pub(crate) credential: CuCredential,
    pub(crate) api_version: String,
    pub(crate) user_agent: String,
    pub(crate) retry_policy: RetryPolicy,
}

/// Builder for constructing a [`CuClient`].
///
/// Use [`CuClient::builder()`] to create a new builder.
#[derive(Debug, Default)]
pub struct CuClientBuilder {
    endpoint: Option<String>,
    credential: Option<CuCredential>,
    api_version: Option<String>,
    user_agent: Option<String>,
    http_client: Option<HttpClient>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
}

impl CuClient {
    /// Create a new builder for configuring a `CuClient`.
    pub fn builder() -> CuClientBuilder {
        CuClientBuilder::default()
    }

    /// Get the base endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Get the API version being used.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Get the value sent in the `x-ms-useragent` header.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Get the retry policy configuration.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Build a full URL for an API path, including the `api-version` query
    /// parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be joined to the endpoint URL.
    pub fn url(&self, path: &str) -> CuResult<Url> {
        let mut url = self
            .endpoint
            .join(path)
            .map_err(|e| CuError::invalid_endpoint_with_source("failed to construct URL", e))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    /// Send a GET request to the API with automatic retry on transient errors.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails, the request fails after all retries,
    /// or the server returns a non-retriable error response.
    pub async fn get(&self, path: &str) -> CuResult<reqwest::Response> {
        let url = self.url(path)?;
        self.execute(|| self.http.get(url.clone())).await
    }

    /// Send a single GET request to an absolute URL, without retries.
    ///
    /// The URL is used verbatim: no `api-version` is appended. This is the
    /// primitive behind status polling, where the `Operation-Location` URL
    /// already carries its query string and the caller owns the retry budget.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails, the request cannot be sent,
    /// or the server answers with a non-success status.
    pub async fn get_once(&self, url: &Url) -> CuResult<reqwest::Response> {
        let (auth_header, auth_value) = self.credential.resolve().await?;
        let response = self
            .http
            .get(url.clone())
            .header(auth_header, &auth_value)
            .header(USER_AGENT_HEADER, &self.user_agent)
            .send()
            .await?;
        Self::check_response(response).await
    }

    /// Send a PUT request with a JSON body, with automatic retry.
    pub async fn put<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> CuResult<reqwest::Response> {
        let url = self.url(path)?;
        let body = serde_json::to_vec(body)?;
        self.execute(|| {
            self.http
                .put(url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
        })
        .await
    }

    /// Send a POST request with a JSON body, with automatic retry.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails, serialization fails,
    /// the request fails after all retries, or the server returns a non-retriable error.
    pub async fn post<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> CuResult<reqwest::Response> {
        let url = self.url(path)?;
        let body = serde_json::to_vec(body)?;
        self.execute(|| {
            self.http
                .post(url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
        })
        .await
    }

    /// Send a POST request with a raw binary body, with automatic retry.
    pub async fn post_bytes(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> CuResult<reqwest::Response> {
        let url = self.url(path)?;
        self.execute(|| {
            self.http
                .post(url.clone())
                .header(CONTENT_TYPE, content_type)
                .body(body.clone())
        })
        .await
    }

    /// Send a DELETE request, with automatic retry.
    pub async fn delete(&self, path: &str) -> CuResult<reqwest::Response> {
        let url = self.url(path)?;
        self.execute(|| self.http.delete(url.clone())).await
    }

    /// Send a request built by `build`, retrying retriable HTTP statuses with
    /// exponential backoff and jitter.
    async fn execute<F>(&self, build: F) -> CuResult<reqwest::Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let (auth_header, auth_value) = self.credential.resolve().await?;
        let mut attempt = 0u32;

        loop {
            let response = build()
                .header(auth_header, &auth_value)
                .header(USER_AGENT_HEADER, &self.user_agent)
                .send()
                .await?;

            let status = response.status().as_u16();

            if response.status().is_success() {
                return Ok(response);
            }

            // Non-retriable error or last attempt - return error
            if !is_retriable_status(status) || attempt >= self.retry_policy.max_retries {
                return Self::check_response(response).await;
            }

            // jitter_factor is in range [0.75, 1.25] for ±25% variation
            let base_backoff = self.retry_policy.initial_backoff * 2_u32.pow(attempt);
            let jitter = 0.75 + fastrand::f64() * 0.5;
            let backoff = base_backoff.mul_f64(jitter);
            tracing::debug!(attempt, status, ?backoff, "retrying request after transient error");
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Maximum length for error messages to prevent sensitive data leaks.
    const MAX_ERROR_MESSAGE_LEN: usize = 1000;

    /// Placeholder written over redacted secrets.
    const REDACTED: &'static str = "[REDACTED]";

    /// Markers that precede a secret value in an error message.
    const SECRET_MARKERS: [&'static str; 4] = [
        "Bearer ",
        "Ocp-Apim-Subscription-Key: ",
        "Ocp-Apim-Subscription-Key=",
        "subscription-key=",
    ];

    /// Sanitize error messages by removing bearer tokens and subscription keys.
    pub(crate) fn sanitize_error_message(msg: &str) -> String {
        let mut result = msg.to_string();
        for marker in Self::SECRET_MARKERS {
            Self::redact_after(&mut result, marker);
        }
        result
    }

    /// Replace every token that directly follows `marker` with [`Self::REDACTED`].
    fn redact_after(msg: &mut String, marker: &str) {
        let is_delimiter =
            |c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ',' || c == '&';

        let mut search_start = 0;
        while let Some(relative_pos) = msg[search_start..].find(marker) {
            let token_start = search_start + relative_pos + marker.len();

            if msg[token_start..].starts_with(Self::REDACTED) {
                search_start = token_start + Self::REDACTED.len();
                continue;
            }

            let token_end = msg[token_start..]
                .find(is_delimiter)
                .map(|pos| token_start + pos)
                .unwrap_or(msg.len());

            if token_end > token_start {
                msg.replace_range(token_start..token_end, Self::REDACTED);
                search_start = token_start + Self::REDACTED.len();
            } else {
                search_start = token_start;
            }
        }
    }

    /// Truncate a message if it exceeds the maximum length.
    /// Also sanitizes sensitive data before truncating.
    pub(crate) fn truncate_message(msg: &str) -> String {
        let sanitized = Self::sanitize_error_message(msg);

        if sanitized.len() > Self::MAX_ERROR_MESSAGE_LEN {
            let mut end = Self::MAX_ERROR_MESSAGE_LEN;
            while !sanitized.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated)", &sanitized[..end])
        } else {
            sanitized
        }
    }

    /// Check the response status and return an error if not successful.
    async fn check_response(response: reqwest::Response) -> CuResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if let Ok(error) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(err_obj) = error.get("error") {
                return Err(CuError::Api {
                    status,
                    code: err_obj
                        .get("code")
                        .and_then(|c| c.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    message: Self::truncate_message(
                        err_obj
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or(&body),
                    ),
                });
            }
        }

        Err(CuError::http(status, Self::truncate_message(&body)))
    }
}

impl CuClientBuilder {
    /// Set the Content Understanding endpoint URL.
    ///
    /// This should be in the format:
    /// `https://<resource-name>.services.ai.azure.com`
    ///
    /// If not set, the builder will check the `AZURE_AI_ENDPOINT`
    /// environment variable.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the credential to use for authentication.
    ///
    /// If not set, the builder will use [`CuCredential::from_env()`].
    pub fn credential(mut self, credential: CuCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Set the API version.
    ///
    /// Falls back to the `AZURE_AI_API_VERSION` environment variable, then to
    /// [`DEFAULT_API_VERSION`].
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Set the value of the `x-ms-useragent` header.
    ///
    /// Defaults to [`DEFAULT_USER_AGENT`].
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set a custom HTTP client.
    ///
    /// **Note:** If you provide a custom HTTP client, any timeout configuration
    /// via [`connect_timeout`](Self::connect_timeout) or
    /// [`read_timeout`](Self::read_timeout) will be ignored.
    pub fn http_client(mut self, client: HttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout.
    ///
    /// This covers the entire request/response cycle including reading the body.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the retry policy for transient errors.
    ///
    /// Defaults to 3 retries with 500ms initial backoff.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the `CuClient`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No endpoint is provided and `AZURE_AI_ENDPOINT` is not set
    /// - The endpoint URL is invalid
    /// - Credential creation fails (when using environment-based credentials)
    /// - The underlying HTTP client cannot be constructed
    pub fn build(self) -> CuResult<CuClient> {
        let http = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .timeout(self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT))
                .build()?,
        };

        let endpoint_str = self
            .endpoint
            .or_else(|| std::env::var(ENDPOINT_ENV).ok())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                CuError::MissingConfig(
                    "endpoint is required. Set it via builder or AZURE_AI_ENDPOINT env var."
                        .into(),
                )
            })?;

        let endpoint = Url::parse(&endpoint_str)
            .map_err(|e| CuError::invalid_endpoint_with_source("invalid endpoint URL", e))?;

        let credential = match self.credential {
            Some(credential) => credential,
            None => CuCredential::from_env()?,
        };

        let api_version = self
            .api_version
            .or_else(|| std::env::var(API_VERSION_ENV).ok())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        Ok(CuClient {
            http,
            endpoint,
            credential,
            api_version,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            retry_policy: self.retry_policy.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SUBSCRIPTION_KEY_HEADER;
    use crate::test_support::{setup_mock_client, TEST_API_KEY};
    use serial_test::serial;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_builder() -> CuClientBuilder {
        CuClient::builder()
            .endpoint("https://test.services.ai.azure.com")
            .credential(CuCredential::subscription_key("test"))
    }

    #[test]
    #[serial]
    fn test_builder_requires_endpoint() {
        let original = std::env::var(ENDPOINT_ENV).ok();
        std::env::remove_var(ENDPOINT_ENV);

        let result = CuClient::builder()
            .credential(CuCredential::subscription_key("test"))
            .build();

        if let Some(val) = original {
            std::env::set_var(ENDPOINT_ENV, val);
        }

        let err = result.expect_err("endpoint should be required");
        assert!(matches!(err, CuError::MissingConfig(_)));
    }

    #[test]
    fn test_builder_accepts_endpoint() {
        let client = test_builder().build().expect("should build");

        assert_eq!(
            client.endpoint().as_str(),
            "https://test.services.ai.azure.com/"
        );
    }

    #[test]
    #[serial]
    fn test_builder_uses_default_api_version() {
        let original = std::env::var(API_VERSION_ENV).ok();
        std::env::remove_var(API_VERSION_ENV);

        let client = test_builder().build().expect("should build");

        if let Some(val) = original {
            std::env::set_var(API_VERSION_ENV, val);
        }

        assert_eq!(client.api_version(), DEFAULT_API_VERSION);
        assert_eq!(client.user_agent(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_builder_accepts_custom_api_version_and_user_agent() {
        let client = test_builder()
            .api_version("2024-12-01-preview")
            .user_agent("sample/management")
            .build()
            .expect("should build");

        assert_eq!(client.api_version(), "2024-12-01-preview");
        assert_eq!(client.user_agent(), "sample/management");
    }

    #[test]
    #[serial]
    fn test_builder_reads_endpoint_and_api_version_from_env() {
        let original_endpoint = std::env::var(ENDPOINT_ENV).ok();
        let original_version = std::env::var(API_VERSION_ENV).ok();

        std::env::set_var(ENDPOINT_ENV, "https://env.services.ai.azure.com");
        std::env::set_var(API_VERSION_ENV, "2024-12-01-preview");

        let client = CuClient::builder()
            .credential(CuCredential::subscription_key("test"))
            .build()
            .expect("should build");

        assert_eq!(
            client.endpoint().as_str(),
            "https://env.services.ai.azure.com/"
        );
        assert_eq!(client.api_version(), "2024-12-01-preview");

        match original_endpoint {
            Some(val) => std::env::set_var(ENDPOINT_ENV, val),
            None => std::env::remove_var(ENDPOINT_ENV),
        }
        match original_version {
            Some(val) => std::env::set_var(API_VERSION_ENV, val),
            None => std::env::remove_var(API_VERSION_ENV),
        }
    }

    #[test]
    #[serial]
    fn test_builder_endpoint_overrides_env() {
        let original = std::env::var(ENDPOINT_ENV).ok();
        std::env::set_var(ENDPOINT_ENV, "https://env.services.ai.azure.com");

        let client = CuClient::builder()
            .endpoint("https://explicit.services.ai.azure.com")
            .credential(CuCredential::subscription_key("test"))
            .build()
            .expect("should build");

        assert_eq!(
            client.endpoint().as_str(),
            "https://explicit.services.ai.azure.com/"
        );

        match original {
            Some(val) => std::env::set_var(ENDPOINT_ENV, val),
            None => std::env::remove_var(ENDPOINT_ENV),
        }
    }

    #[test]
    fn test_builder_invalid_endpoint_url() {
        let result = CuClient::builder()
            .endpoint("not a valid url")
            .credential(CuCredential::subscription_key("test"))
            .build();

        assert!(matches!(
            result.unwrap_err(),
            CuError::InvalidEndpoint { .. }
        ));
    }

    #[test]
    fn test_url_joins_path_and_appends_api_version() {
        let client = test_builder()
            .api_version("2025-05-01-preview")
            .build()
            .expect("should build");

        let url = client
            .url("/contentunderstanding/analyzers/invoice")
            .expect("should join");
        assert_eq!(
            url.as_str(),
            "https://test.services.ai.azure.com/contentunderstanding/analyzers/invoice?api-version=2025-05-01-preview"
        );
    }

    #[test]
    fn test_url_keeps_action_suffix() {
        let client = test_builder()
            .api_version("2025-05-01-preview")
            .build()
            .expect("should build");

        let url = client
            .url("contentunderstanding/analyzers/invoice:analyze")
            .expect("should join");
        assert_eq!(url.path(), "/contentunderstanding/analyzers/invoice:analyze");
        assert_eq!(url.query(), Some("api-version=2025-05-01-preview"));
    }

    #[test]
    fn test_client_is_cloneable() {
        let client = test_builder().build().expect("should build");
        let cloned = client.clone();
        assert_eq!(client.endpoint(), cloned.endpoint());
    }

    #[test]
    fn test_default_retry_policy() {
        let client = test_builder().build().expect("should build");

        assert_eq!(client.retry_policy().max_retries, 3);
        assert_eq!(
            client.retry_policy().initial_backoff,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_default_timeouts_are_defined() {
        assert_eq!(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs(10));
        assert_eq!(DEFAULT_READ_TIMEOUT, Duration::from_secs(60));
    }

    #[test]
    fn test_identifies_retriable_http_errors() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retriable_status(status), "{status} should be retriable");
        }
        for status in [200, 201, 400, 401, 403, 404, 409] {
            assert!(!is_retriable_status(status), "{status} should not be retriable");
        }
    }

    // --- Wiremock integration tests ---

    #[tokio::test]
    async fn test_get_request_sends_auth_version_and_user_agent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/contentunderstanding/analyzers"))
            .and(query_param("api-version", DEFAULT_API_VERSION))
            .and(header(SUBSCRIPTION_KEY_HEADER, TEST_API_KEY))
            .and(header(USER_AGENT_HEADER, DEFAULT_USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let response = client
            .get("/contentunderstanding/analyzers")
            .await
            .expect("should succeed");

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["value"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_request_401_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test/endpoint"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client.get("/test/endpoint").await.unwrap_err();

        match err {
            CuError::Http { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Unauthorized");
            }
            _ => panic!("Expected Http error, got {:?}", err),
        }
    }

    #[tokio::test]
    async fn test_error_with_api_error_format_keeps_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test/endpoint"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {
                    "code": "ModelNotFound",
                    "message": "Analyzer 'missing' was not found."
                }
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client.get("/test/endpoint").await.unwrap_err();

        match err {
            CuError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "ModelNotFound");
                assert_eq!(message, "Analyzer 'missing' was not found.");
            }
            _ => panic!("Expected Api error, got {:?}", err),
        }
    }

    #[tokio::test]
    async fn test_error_response_with_partial_error_object() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test/endpoint"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "code": "SomeError" }
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client.get("/test/endpoint").await.unwrap_err();

        match err {
            CuError::Api { code, message, .. } => {
                assert_eq!(code, "SomeError");
                // Message falls back to the raw body
                assert!(message.contains("SomeError"));
            }
            _ => panic!("Expected Api error, got {:?}", err),
        }
    }

    #[tokio::test]
    async fn test_put_sends_json_body() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/contentunderstanding/analyzers/a1"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let response = client
            .put(
                "/contentunderstanding/analyzers/a1",
                &serde_json::json!({"description": "test"}),
            )
            .await
            .expect("should succeed");
        assert_eq!(response.status(), 201);
    }

    #[tokio::test]
    async fn test_post_bytes_sends_raw_body_with_content_type() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("content-type", "application/octet-stream"))
            .and(body_bytes(b"%PDF-1.7".to_vec()))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let response = client
            .post_bytes(
                "/upload",
                Bytes::from_static(b"%PDF-1.7"),
                "application/octet-stream",
            )
            .await
            .expect("should succeed");
        assert_eq!(response.status(), 202);
    }

    #[tokio::test]
    async fn test_delete_returns_no_content() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/contentunderstanding/analyzers/a1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let response = client
            .delete("/contentunderstanding/analyzers/a1")
            .await
            .expect("should succeed");
        assert_eq!(response.status(), 204);
    }

    #[tokio::test]
    async fn test_get_retries_on_503_with_backoff() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let server = MockServer::start().await;
        let request_count = Arc::new(AtomicU32::new(0));
        let counter = request_count.clone();

        // Fails with 503 twice, then succeeds
        Mock::given(method("GET"))
            .and(path("/retry-test"))
            .respond_with(move |_req: &wiremock::Request| {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    ResponseTemplate::new(503).set_body_string("Service Unavailable")
                } else {
                    ResponseTemplate::new(200).set_body_string("OK")
                }
            })
            .mount(&server)
            .await;

        let client = CuClient::builder()
            .endpoint(server.uri())
            .credential(CuCredential::subscription_key("test"))
            .retry_policy(RetryPolicy {
                max_retries: 3,
                initial_backoff: Duration::from_millis(10),
            })
            .build()
            .expect("should build");

        let start = std::time::Instant::now();
        let result = client.get("/retry-test").await;
        let elapsed = start.elapsed();

        assert!(result.is_ok(), "Expected success after retries, got {result:?}");
        assert_eq!(request_count.load(Ordering::SeqCst), 3);
        // 10ms + 20ms with at most -25% jitter each
        assert!(
            elapsed >= Duration::from_millis(20),
            "Expected backoff delays, but elapsed {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_get_gives_up_after_max_retries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/always-busy"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .expect(3)
            .mount(&server)
            .await;

        let client = CuClient::builder()
            .endpoint(server.uri())
            .credential(CuCredential::subscription_key("test"))
            .retry_policy(RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
            })
            .build()
            .expect("should build");

        let err = client.get("/always-busy").await.unwrap_err();
        assert!(matches!(err, CuError::Http { status: 429, .. }));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_retry_is_logged() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/busy-once"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy-once"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        client.get("/busy-once").await.expect("should succeed");

        assert!(logs_contain("retrying request after transient error"));
    }

    #[tokio::test]
    async fn test_get_once_does_not_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/contentunderstanding/analyzerResults/op-1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let url = Url::parse(&format!(
            "{}/contentunderstanding/analyzerResults/op-1?api-version=2025-05-01-preview",
            server.uri()
        ))
        .unwrap();

        let err = client.get_once(&url).await.unwrap_err();
        assert!(matches!(err, CuError::Http { status: 503, .. }));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_get_once_uses_url_verbatim() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/contentunderstanding/analyzerResults/op-2"))
            .and(query_param("api-version", "2024-12-01-preview"))
            .and(header(SUBSCRIPTION_KEY_HEADER, TEST_API_KEY))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "Running"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let url = Url::parse(&format!(
            "{}/contentunderstanding/analyzerResults/op-2?api-version=2024-12-01-preview",
            server.uri()
        ))
        .unwrap();

        let response = client.get_once(&url).await.expect("should succeed");
        assert_eq!(response.status(), 200);
    }

    // --- Error sanitization tests ---

    #[tokio::test]
    async fn test_error_sanitization_removes_bearer_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test/endpoint"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {
                    "code": "Unauthorized",
                    "message": "Invalid token: Bearer eyJhbGciOiJIUzI1NiJ9.payload.sig"
                }
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client.get("/test/endpoint").await.unwrap_err();

        match err {
            CuError::Api { message, .. } => {
                assert!(!message.contains("eyJhbGciOiJIUzI1NiJ9"));
                assert!(message.contains("Bearer [REDACTED]"));
            }
            _ => panic!("Expected Api error, got {:?}", err),
        }
    }

    #[test]
    fn test_sanitization_removes_subscription_keys() {
        let msg = "rejected Ocp-Apim-Subscription-Key: 0123456789abcdef and subscription-key=fedcba&x=1";
        let sanitized = CuClient::sanitize_error_message(msg);

        assert!(!sanitized.contains("0123456789abcdef"));
        assert!(!sanitized.contains("fedcba"));
        assert!(sanitized.contains("Ocp-Apim-Subscription-Key: [REDACTED]"));
        assert!(sanitized.contains("subscription-key=[REDACTED]&x=1"));
    }

    #[test]
    fn test_sanitization_multiple_tokens() {
        let msg = "first Bearer aaa, second Bearer bbb";
        let sanitized = CuClient::sanitize_error_message(msg);
        assert_eq!(sanitized, "first Bearer [REDACTED], second Bearer [REDACTED]");
    }

    #[test]
    fn test_sanitization_preserves_legitimate_errors() {
        let msg = "The analyzer template is missing 'fieldSchema'.";
        assert_eq!(CuClient::sanitize_error_message(msg), msg);
    }

    #[test]
    fn test_sanitization_before_truncation() {
        let token = "x".repeat(2000);
        let msg = format!("Bearer {token}");
        let truncated = CuClient::truncate_message(&msg);
        assert_eq!(truncated, "Bearer [REDACTED]");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let msg = "é".repeat(800);
        let truncated = CuClient::truncate_message(&msg);
        assert!(truncated.ends_with("... (truncated)"));
        assert!(truncated.len() <= CuClient::MAX_ERROR_MESSAGE_LEN + "... (truncated)".len());
    }
}
