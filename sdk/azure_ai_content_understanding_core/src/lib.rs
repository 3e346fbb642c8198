#![doc = include_str!("../README.md")]

pub mod auth;
pub mod client;
pub mod error;
pub mod models;

pub use error::{CuError, CuResult};

/// Helpers for testing code that talks to a mocked Content Understanding
/// endpoint.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use crate::auth::CuCredential;
    use crate::client::{CuClient, RetryPolicy};
    use std::time::Duration;
    use wiremock::MockServer;

    /// Test subscription key (not a real key).
    pub const TEST_API_KEY: &str = "test-api-key";

    /// Retry policy with millisecond backoff so retry tests stay fast.
    pub fn fast_retry_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    /// Create a test client connected to a mock server.
    ///
    /// # Panics
    ///
    /// Panics if the mock server URI cannot be used as an endpoint.
    pub async fn setup_mock_client(server: &MockServer) -> CuClient {
        CuClient::builder()
            .endpoint(server.uri())
            .credential(CuCredential::subscription_key(TEST_API_KEY))
            .api_version(crate::client::DEFAULT_API_VERSION)
            .retry_policy(fast_retry_policy())
            .build()
            .expect("should build client")
    }
}
