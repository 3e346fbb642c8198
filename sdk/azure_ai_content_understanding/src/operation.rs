//! Long-running operation types.
//!
//! Begin calls such as [`analyzer::begin_create`](crate::analyzer::begin_create)
//! and [`analyzer::begin_analyze`](crate::analyzer::begin_analyze) answer with
//! `202 Accepted` and an `Operation-Location` header. That URL is wrapped in an
//! [`OperationHandle`] and handed to the [`poller`](crate::poller), which
//! queries it until the operation reaches a terminal [`OperationStatus`].

use azure_ai_content_understanding_core::error::{CuError, CuResult};
use serde_json::Value;
use url::Url;

pub use azure_ai_content_understanding_core::models::ErrorDetail as OperationError;

/// Response header carrying the status URL of a long-running operation.
pub const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

// ---------------------------------------------------------------------------
// Operation handle
// ---------------------------------------------------------------------------

/// Reference to a server-side asynchronous operation.
///
/// Holds the absolute status URL and the operation id (its last path segment).
/// A handle is consumed by [`poll`](crate::poller::poll), so an operation that
/// has reached a terminal status cannot be polled again through the same
/// handle. It is intentionally not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct OperationHandle {
    url: Url,
    operation_id: String,
}

impl OperationHandle {
    /// Create a handle from an `Operation-Location` URL.
    ///
    /// # Errors
    ///
    /// Returns [`CuError::InvalidEndpoint`] if the value is not an absolute
    /// `http(s)` URL or has no path segment to use as the operation id.
    pub fn new(operation_location: &str) -> CuResult<Self> {
        let url = Url::parse(operation_location).map_err(|e| {
            CuError::invalid_endpoint_with_source("failed to parse Operation-Location URL", e)
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(CuError::invalid_endpoint(format!(
                "Operation-Location must be an http(s) URL, got scheme '{}'",
                url.scheme()
            )));
        }

        let operation_id = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .ok_or_else(|| {
                CuError::invalid_endpoint("Operation-Location URL has no operation id")
            })?;

        Ok(Self { url, operation_id })
    }

    /// Extract the handle from the `Operation-Location` header of a begin response.
    ///
    /// # Errors
    ///
    /// Returns [`CuError::MissingHeader`] if the header is absent or not valid
    /// UTF-8, and the errors of [`OperationHandle::new`] for a malformed URL.
    pub fn from_response(response: &reqwest::Response) -> CuResult<Self> {
        let location = response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(CuError::MissingHeader(OPERATION_LOCATION_HEADER))?;

        Self::new(location)
    }

    /// The absolute status URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The operation id, also used to address result files.
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }
}

// ---------------------------------------------------------------------------
// Operation status
// ---------------------------------------------------------------------------

/// Status of a long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    /// The operation is queued.
    NotStarted,
    /// The operation is in progress.
    Running,
    /// The operation completed successfully.
    Succeeded,
    /// The operation failed.
    Failed,
}

impl OperationStatus {
    /// Parse a status string as sent by the service. Matching ignores ASCII case.
    pub fn parse(raw: &str) -> Option<Self> {
        [
            Self::NotStarted,
            Self::Running,
            Self::Succeeded,
            Self::Failed,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(raw))
    }

    /// The service spelling of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }

    /// Returns `true` if the status is terminal (no further changes expected).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operation result
// ---------------------------------------------------------------------------

/// Terminal payload of a successful operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    /// Operation id reported in the status body, if any.
    pub id: Option<String>,
    /// The `result` member of the final status body, or the whole body when
    /// the service inlines the result.
    pub payload: Value,
}

impl OperationResult {
    fn from_body(mut body: Value) -> Self {
        let id = body.get("id").and_then(Value::as_str).map(str::to_string);
        let payload = if body.get("result").is_some() {
            body["result"].take()
        } else {
            body
        };
        Self { id, payload }
    }

    /// Consume the result and return the payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

/// One status response, classified.
#[derive(Debug)]
pub(crate) enum StatusSnapshot {
    Pending(OperationStatus),
    Succeeded(OperationResult),
    Failed(OperationError),
    Unrecognized(String),
}

impl StatusSnapshot {
    pub(crate) fn classify(mut body: Value) -> Self {
        let status = match body.get("status") {
            Some(Value::String(raw)) => match OperationStatus::parse(raw) {
                Some(status) => status,
                None => return Self::Unrecognized(raw.clone()),
            },
            Some(other) => return Self::Unrecognized(other.to_string()),
            None => return Self::Unrecognized("<missing>".to_string()),
        };

        match status {
            OperationStatus::NotStarted | OperationStatus::Running => Self::Pending(status),
            OperationStatus::Succeeded => Self::Succeeded(OperationResult::from_body(body)),
            OperationStatus::Failed => {
                let error = body
                    .get_mut("error")
                    .map(Value::take)
                    .unwrap_or(Value::Null);
                Self::Failed(failure_descriptor(error))
            }
        }
    }
}

fn failure_descriptor(error: Value) -> OperationError {
    if error.is_null() {
        return OperationError {
            code: "Unknown".into(),
            message: "operation failed without an error descriptor".into(),
            target: None,
            details: Vec::new(),
            inner_error: None,
        };
    }

    let raw = error.to_string();
    serde_json::from_value(error).unwrap_or(OperationError {
        code: "Unknown".into(),
        message: raw,
        target: None,
        details: Vec::new(),
        inner_error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -----------------------------------------------------------------------
    // Cycle 1: OperationHandle parsing
    // -----------------------------------------------------------------------

    #[test]
    fn test_handle_extracts_operation_id_from_last_segment() {
        let handle = OperationHandle::new(
            "https://res.services.ai.azure.com/contentunderstanding/analyzerResults/3b31320d-8bab-4f88-b19c-2322a7f11034?api-version=2025-05-01-preview",
        )
        .expect("valid location");

        assert_eq!(handle.operation_id(), "3b31320d-8bab-4f88-b19c-2322a7f11034");
        assert_eq!(handle.url().query(), Some("api-version=2025-05-01-preview"));
    }

    #[test]
    fn test_handle_ignores_trailing_slash() {
        let handle =
            OperationHandle::new("https://res.example.com/contentunderstanding/operations/op-7/")
                .expect("valid location");
        assert_eq!(handle.operation_id(), "op-7");
    }

    #[test]
    fn test_handle_rejects_relative_url() {
        let err = OperationHandle::new("/contentunderstanding/analyzerResults/op-1")
            .expect_err("relative URL should fail");
        assert!(matches!(err, CuError::InvalidEndpoint { .. }));
        assert!(err.to_string().contains("Operation-Location"));
    }

    #[test]
    fn test_handle_rejects_non_http_scheme() {
        let err = OperationHandle::new("ftp://res.example.com/analyzerResults/op-1")
            .expect_err("ftp should fail");
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn test_handle_rejects_url_without_path() {
        let err = OperationHandle::new("https://res.example.com/")
            .expect_err("no id should fail");
        assert!(err.to_string().contains("operation id"));
    }

    // -----------------------------------------------------------------------
    // Cycle 2: OperationStatus
    // -----------------------------------------------------------------------

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(OperationStatus::parse("Running"), Some(OperationStatus::Running));
        assert_eq!(OperationStatus::parse("running"), Some(OperationStatus::Running));
        assert_eq!(OperationStatus::parse("SUCCEEDED"), Some(OperationStatus::Succeeded));
        assert_eq!(OperationStatus::parse("notstarted"), Some(OperationStatus::NotStarted));
        assert_eq!(OperationStatus::parse("failed"), Some(OperationStatus::Failed));
        assert_eq!(OperationStatus::parse("Canceled"), None);
        assert_eq!(OperationStatus::parse(""), None);
    }

    #[test]
    fn test_status_terminal_and_display() {
        assert!(OperationStatus::Succeeded.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(!OperationStatus::Running.is_terminal());
        assert!(!OperationStatus::NotStarted.is_terminal());
        assert_eq!(OperationStatus::NotStarted.to_string(), "NotStarted");
    }

    // -----------------------------------------------------------------------
    // Cycle 3: Status classification
    // -----------------------------------------------------------------------

    #[test]
    fn test_classify_succeeded_extracts_result_member() {
        let snapshot = StatusSnapshot::classify(json!({
            "id": "op-1",
            "status": "Succeeded",
            "result": {"contents": [{"markdown": "# Invoice"}]}
        }));

        match snapshot {
            StatusSnapshot::Succeeded(result) => {
                assert_eq!(result.id.as_deref(), Some("op-1"));
                assert_eq!(result.payload, json!({"contents": [{"markdown": "# Invoice"}]}));
            }
            other => panic!("expected Succeeded, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_succeeded_without_result_keeps_whole_body() {
        let body = json!({"status": "succeeded", "analyzerId": "invoice", "warnings": []});
        match StatusSnapshot::classify(body.clone()) {
            StatusSnapshot::Succeeded(result) => {
                assert!(result.id.is_none());
                assert_eq!(result.into_payload(), body);
            }
            other => panic!("expected Succeeded, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_failed_keeps_descriptor_verbatim() {
        let snapshot = StatusSnapshot::classify(json!({
            "status": "Failed",
            "error": {
                "code": "InvalidRequest",
                "message": "The field schema is invalid:  'Total' has no type.\n",
                "innererror": {"code": "InvalidFieldSchema"}
            }
        }));

        match snapshot {
            StatusSnapshot::Failed(error) => {
                assert_eq!(error.code, "InvalidRequest");
                assert_eq!(
                    error.message,
                    "The field schema is invalid:  'Total' has no type.\n"
                );
                assert_eq!(error.inner_error, Some(json!({"code": "InvalidFieldSchema"})));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_failed_without_error_member() {
        match StatusSnapshot::classify(json!({"status": "Failed"})) {
            StatusSnapshot::Failed(error) => assert_eq!(error.code, "Unknown"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_failed_with_malformed_error_keeps_raw_text() {
        match StatusSnapshot::classify(json!({"status": "Failed", "error": "quota exceeded"})) {
            StatusSnapshot::Failed(error) => assert_eq!(error.message, "\"quota exceeded\""),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_pending_statuses() {
        assert!(matches!(
            StatusSnapshot::classify(json!({"status": "NotStarted"})),
            StatusSnapshot::Pending(OperationStatus::NotStarted)
        ));
        assert!(matches!(
            StatusSnapshot::classify(json!({"status": "running"})),
            StatusSnapshot::Pending(OperationStatus::Running)
        ));
    }

    #[test]
    fn test_classify_unrecognized_status_keeps_raw_value() {
        match StatusSnapshot::classify(json!({"status": "Canceled"})) {
            StatusSnapshot::Unrecognized(raw) => assert_eq!(raw, "Canceled"),
            other => panic!("expected Unrecognized, got {other:?}"),
        }
        match StatusSnapshot::classify(json!({"status": 3})) {
            StatusSnapshot::Unrecognized(raw) => assert_eq!(raw, "3"),
            other => panic!("expected Unrecognized, got {other:?}"),
        }
        match StatusSnapshot::classify(json!({"result": {}})) {
            StatusSnapshot::Unrecognized(raw) => assert_eq!(raw, "<missing>"),
            other => panic!("expected Unrecognized, got {other:?}"),
        }
    }
}
