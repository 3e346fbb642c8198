//! Long-running operation poller.
//!
//! [`poll`] takes an [`OperationHandle`] and queries its status URL until the
//! operation reaches a terminal status, waiting between queries according to a
//! [`PollConfig`]. Transient transport failures are retried within a bounded
//! budget; everything else ends the poll with a typed [`PollError`].
//!
//! Queries go through the [`StatusSource`] trait. [`CuClient`] implements it
//! with a single authenticated GET per call, and tests plug in scripted
//! in-memory sources.
//!
//! ## Example
//!
//! ```rust,no_run
//! use azure_ai_content_understanding::operation::OperationHandle;
//! use azure_ai_content_understanding::poller::{self, PollConfig};
//! use azure_ai_content_understanding_core::client::CuClient;
//! use std::time::Duration;
//!
//! # async fn example(client: &CuClient, location: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PollConfig::builder()
//!     .interval(Duration::from_secs(2))
//!     .timeout(Duration::from_secs(120))
//!     .build()?;
//!
//! let handle = OperationHandle::new(location)?;
//! let result = poller::poll(client, handle, &config).await?;
//! println!("{}", result.payload);
//! # Ok(())
//! # }
//! ```

use crate::operation::{OperationError, OperationHandle, OperationResult, StatusSnapshot};
use async_trait::async_trait;
use azure_ai_content_understanding_core::client::CuClient;
use azure_ai_content_understanding_core::error::{CuError, CuResult};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default wait between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default cap on any single wait.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of retries for a failed status query.
pub const DEFAULT_MAX_TRANSPORT_RETRIES: u32 = 3;

/// Multiplier applied to the wait after each transport retry.
const TRANSPORT_BACKOFF_MULTIPLIER: f64 = 2.0;

// ---------------------------------------------------------------------------
// Status source
// ---------------------------------------------------------------------------

/// Something that can report the current status document of an operation.
///
/// Each call issues exactly one query and returns the raw status body.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current status body for `handle`.
    async fn query_status(&self, handle: &OperationHandle) -> CuResult<Value>;
}

#[async_trait]
impl StatusSource for CuClient {
    async fn query_status(&self, handle: &OperationHandle) -> CuResult<Value> {
        let response = self.get_once(handle.url()).await?;
        Ok(response.json::<Value>().await?)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Wait and retry policy for [`poll`].
///
/// The default polls every second with no overall timeout, no attempt cap,
/// and three transport retries per query.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    interval: Duration,
    timeout: Option<Duration>,
    max_attempts: Option<u32>,
    backoff_multiplier: f64,
    max_interval: Duration,
    max_transport_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            max_attempts: None,
            backoff_multiplier: 1.0,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_transport_retries: DEFAULT_MAX_TRANSPORT_RETRIES,
        }
    }
}

impl PollConfig {
    /// Create a builder starting from the default configuration.
    pub fn builder() -> PollConfigBuilder {
        PollConfigBuilder::default()
    }

    /// Initial wait between status queries.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ceiling on total wall-clock time, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Maximum number of status responses to accept before giving up, if any.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Factor applied to the wait after each in-progress response.
    /// `1.0` keeps the interval fixed.
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Cap on any single wait.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Retries allowed for one status query after a transient failure.
    pub fn max_transport_retries(&self) -> u32 {
        self.max_transport_retries
    }
}

/// Builder for [`PollConfig`].
#[derive(Debug, Default)]
pub struct PollConfigBuilder {
    config: PollConfig,
}

impl PollConfigBuilder {
    /// Set the initial wait between status queries.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the ceiling on total wall-clock time.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Cap the number of status responses.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = Some(max_attempts);
        self
    }

    /// Grow the wait by `multiplier` after each in-progress response.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    /// Set the cap on any single wait.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.config.max_interval = max_interval;
        self
    }

    /// Set the retries allowed per status query after a transient failure.
    pub fn max_transport_retries(mut self, retries: u32) -> Self {
        self.config.max_transport_retries = retries;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CuError::Builder`] if the interval is zero, the multiplier is
    /// below `1.0` or not finite, `max_attempts` is zero, or `max_interval` is
    /// shorter than the interval.
    pub fn build(self) -> CuResult<PollConfig> {
        let config = self.config;

        if config.interval.is_zero() {
            return Err(CuError::Builder("interval must be greater than zero".into()));
        }
        if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 1.0 {
            return Err(CuError::Builder(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {}",
                config.backoff_multiplier
            )));
        }
        if config.max_attempts == Some(0) {
            return Err(CuError::Builder("max_attempts must be at least 1".into()));
        }
        if config.max_interval < config.interval {
            return Err(CuError::Builder(format!(
                "max_interval ({:?}) must not be shorter than interval ({:?})",
                config.max_interval, config.interval
            )));
        }

        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Ways a poll can end without a successful result.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Status queries kept failing, or failed in a way that cannot be retried.
    #[error("status query failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: CuError,
    },

    /// The service reported a status this client does not know.
    #[error("unexpected operation status: {raw}")]
    UnexpectedStatus { raw: String },

    /// The operation finished with status `Failed`.
    #[error("operation failed: {0}")]
    OperationFailed(OperationError),

    /// The timeout or attempt cap was reached before a terminal status.
    #[error("operation did not complete after {attempts} status queries in {elapsed:?}")]
    Timeout { attempts: u32, elapsed: Duration },

    /// The caller cancelled the poll.
    #[error("polling was cancelled")]
    Cancelled,
}

impl From<CuError> for PollError {
    /// Errors raised before polling starts, such as a failed begin request.
    fn from(source: CuError) -> Self {
        Self::Transport {
            attempts: 1,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Poll an operation until it reaches a terminal status.
///
/// Equivalent to [`poll_with_cancellation`] with a token that is never
/// cancelled.
///
/// # Errors
///
/// See [`PollError`].
pub async fn poll<S>(
    source: &S,
    handle: OperationHandle,
    config: &PollConfig,
) -> Result<OperationResult, PollError>
where
    S: StatusSource + ?Sized,
{
    poll_with_cancellation(source, handle, config, &CancellationToken::new()).await
}

/// Poll an operation until it reaches a terminal status, stopping early when
/// `cancel` is triggered.
///
/// The first status query is always issued. After an in-progress response the
/// poller waits, then queries again; the wait starts at
/// [`PollConfig::interval`] and grows by
/// [`PollConfig::backoff_multiplier`]. A retriable query failure is retried
/// after a wait that doubles each time. Both kinds of wait share one cursor
/// capped at [`PollConfig::max_interval`], so waits never shrink. Waits are
/// clipped to the time left before [`PollConfig::timeout`].
///
/// Cancellation is observed during every wait and every in-flight query.
///
/// # Errors
///
/// - [`PollError::OperationFailed`] if the operation reports `Failed`.
/// - [`PollError::UnexpectedStatus`] for an unknown or missing status.
/// - [`PollError::Timeout`] when the timeout or attempt cap is reached.
/// - [`PollError::Transport`] when a query fails and cannot be retried.
/// - [`PollError::Cancelled`] if `cancel` fires.
///
/// # Tracing
///
/// Emits a span named `content_understanding::poller::poll` with field
/// `operation_id`.
#[tracing::instrument(
    name = "content_understanding::poller::poll",
    skip_all,
    fields(operation_id = %handle.operation_id())
)]
pub async fn poll_with_cancellation<S>(
    source: &S,
    handle: OperationHandle,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<OperationResult, PollError>
where
    S: StatusSource + ?Sized,
{
    tracing::debug!(url = %handle.url(), "starting to poll for completion");

    let mut run = PollRun {
        source,
        handle: &handle,
        config,
        cancel,
        started: Instant::now(),
        queries: 0,
        backoff: Backoff::new(config.interval, config.max_interval),
    };
    let mut responses = 0u32;

    loop {
        let body = run.query().await?;
        responses += 1;

        match StatusSnapshot::classify(body) {
            StatusSnapshot::Succeeded(result) => {
                tracing::debug!(queries = run.queries, "operation succeeded");
                return Ok(result);
            }
            StatusSnapshot::Failed(error) => {
                tracing::debug!(code = %error.code, "operation failed");
                return Err(PollError::OperationFailed(error));
            }
            StatusSnapshot::Unrecognized(raw) => {
                tracing::debug!(raw = %raw, "unexpected operation status");
                return Err(PollError::UnexpectedStatus { raw });
            }
            StatusSnapshot::Pending(status) => {
                if config.max_attempts.is_some_and(|max| responses >= max) {
                    return Err(run.timed_out());
                }

                let wait = run.backoff.next(config.backoff_multiplier);
                tracing::trace!(
                    %status,
                    attempt = responses,
                    ?wait,
                    "operation {} in progress, waiting",
                    handle.operation_id(),
                );
                run.sleep(wait).await?;
            }
        }
    }
}

/// State of one `poll` invocation.
struct PollRun<'a, S: ?Sized> {
    source: &'a S,
    handle: &'a OperationHandle,
    config: &'a PollConfig,
    cancel: &'a CancellationToken,
    started: Instant,
    queries: u32,
    backoff: Backoff,
}

impl<S> PollRun<'_, S>
where
    S: StatusSource + ?Sized,
{
    /// Issue one logical status query, retrying transient failures.
    async fn query(&mut self) -> Result<Value, PollError> {
        let mut retries = 0u32;

        loop {
            if self.queries > 0 && self.deadline_passed() {
                return Err(self.timed_out());
            }
            self.queries += 1;

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PollError::Cancelled),
                outcome = self.source.query_status(self.handle) => outcome,
            };

            match outcome {
                Ok(body) => return Ok(body),
                Err(error) if error.is_retriable() && retries < self.config.max_transport_retries => {
                    retries += 1;
                    let wait = self.backoff.next(TRANSPORT_BACKOFF_MULTIPLIER);
                    tracing::warn!(
                        retry = retries,
                        max_retries = self.config.max_transport_retries,
                        ?wait,
                        error = %error,
                        "status query failed, retrying",
                    );
                    self.sleep(wait).await?;
                }
                Err(error) => {
                    return Err(PollError::Transport {
                        attempts: retries + 1,
                        source: error,
                    });
                }
            }
        }
    }

    /// Wait for `duration`, clipped to the remaining time budget.
    async fn sleep(&self, duration: Duration) -> Result<(), PollError> {
        let duration = match self.config.timeout {
            Some(timeout) => duration.min(timeout.saturating_sub(self.started.elapsed())),
            None => duration,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PollError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    fn deadline_passed(&self) -> bool {
        self.config
            .timeout
            .is_some_and(|timeout| self.started.elapsed() >= timeout)
    }

    fn timed_out(&self) -> PollError {
        let elapsed = self.started.elapsed();
        tracing::debug!(queries = self.queries, ?elapsed, "polling timed out");
        PollError::Timeout {
            attempts: self.queries,
            elapsed,
        }
    }
}

/// Wait cursor shared by status waits and transport retries.
///
/// Each call returns the current wait and grows it by the given factor, up to
/// `max`. Factors are at least `1.0`, so returned waits never decrease.
#[derive(Debug)]
struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    fn next(&mut self, multiplier: f64) -> Duration {
        let wait = self.current;
        let grown = Duration::try_from_secs_f64(self.current.as_secs_f64() * multiplier)
            .unwrap_or(self.max);
        self.current = grown.clamp(wait, self.max);
        wait
    }
}
