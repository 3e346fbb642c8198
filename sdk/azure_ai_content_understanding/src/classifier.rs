//! Classifiers: split and route content into categories.
//!
//! Creating a classifier and classifying a file follow the same
//! `Operation-Location` pattern as analyzers. [`begin_create`] and
//! [`begin_classify`] return an [`OperationHandle`]; [`create_and_poll`] and
//! [`classify_and_poll`] also wait for the result.
//!
//! ```rust,no_run
//! use azure_ai_content_understanding::analyzer::AnalyzeInput;
//! use azure_ai_content_understanding::classifier::{self, ClassifierSchema};
//! use azure_ai_content_understanding::poller::PollConfig;
//! use azure_ai_content_understanding_core::client::CuClient;
//!
//! # async fn example(client: &CuClient) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PollConfig::default();
//! let schema = ClassifierSchema::from_file("classifier/schema.json").await?;
//! classifier::create_and_poll(client, "mixed-docs", &schema, &config).await?;
//!
//! let input = AnalyzeInput::from_location("data/mixed_financial_docs.pdf").await?;
//! let result = classifier::classify_and_poll(client, "mixed-docs", &input, &config).await?;
//! println!("{:#}", result.payload);
//! # Ok(())
//! # }
//! ```

use crate::analyzer::{post_input, resource_path, AnalyzeInput};
use crate::operation::{OperationHandle, OperationResult};
use crate::poller::{self, PollConfig, PollError};
use azure_ai_content_understanding_core::client::CuClient;
use azure_ai_content_understanding_core::error::{CuError, CuResult};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

const CLASSIFIERS_PATH: &str = "/contentunderstanding/classifiers";

/// Classifier definition: categories, split mode and optional per-category
/// analyzers. Kept as JSON; the schema is owned by the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClassifierSchema(Value);

impl ClassifierSchema {
    /// Wrap a JSON schema. It must be a non-empty object.
    pub fn from_value(value: Value) -> CuResult<Self> {
        match value.as_object() {
            Some(map) if !map.is_empty() => Ok(Self(value)),
            _ => Err(CuError::InvalidInput(
                "classifier schema must be a non-empty JSON object".into(),
            )),
        }
    }

    /// Read a JSON schema from disk.
    pub async fn from_file(path: impl AsRef<Path>) -> CuResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let value = serde_json::from_slice(&raw)?;
        tracing::debug!(path = %path.display(), "loaded classifier schema");
        Self::from_value(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

fn classifier_path(classifier_id: &str) -> CuResult<String> {
    resource_path(CLASSIFIERS_PATH, "classifier_id", classifier_id)
}

/// Start creating a classifier.
///
/// # Tracing
///
/// Emits a span named `content_understanding::classifier::begin_create` with
/// field `classifier_id`.
#[tracing::instrument(
    name = "content_understanding::classifier::begin_create",
    skip(client, schema),
    fields(classifier_id = %classifier_id)
)]
pub async fn begin_create(
    client: &CuClient,
    classifier_id: &str,
    schema: &ClassifierSchema,
) -> CuResult<OperationHandle> {
    tracing::debug!("submitting classifier schema");

    let path = classifier_path(classifier_id)?;
    let response = client.put(&path, schema).await?;
    let handle = OperationHandle::from_response(&response)?;

    tracing::debug!(operation_id = %handle.operation_id(), "classifier create request accepted");
    Ok(handle)
}

/// Start classifying a single file or URL.
///
/// Multi-file [`AnalyzeInput::Inputs`] is rejected before anything is sent.
#[tracing::instrument(
    name = "content_understanding::classifier::begin_classify",
    skip(client, input),
    fields(classifier_id = %classifier_id, input = input.kind())
)]
pub async fn begin_classify(
    client: &CuClient,
    classifier_id: &str,
    input: &AnalyzeInput,
) -> CuResult<OperationHandle> {
    if matches!(input, AnalyzeInput::Inputs(_)) {
        return Err(CuError::InvalidInput(
            "classify takes a single file or URL, not a directory".into(),
        ));
    }
    tracing::debug!("submitting classify request");

    let path = format!("{}:classify", classifier_path(classifier_id)?);
    let response = post_input(client, &path, input).await?;
    let handle = OperationHandle::from_response(&response)?;

    tracing::debug!(operation_id = %handle.operation_id(), "classify request accepted");
    Ok(handle)
}

/// Create a classifier and wait for it to be ready.
pub async fn create_and_poll(
    client: &CuClient,
    classifier_id: &str,
    schema: &ClassifierSchema,
    config: &PollConfig,
) -> Result<OperationResult, PollError> {
    let handle = begin_create(client, classifier_id, schema).await?;
    poller::poll(client, handle, config).await
}

/// Classify `input` and wait for the result.
pub async fn classify_and_poll(
    client: &CuClient,
    classifier_id: &str,
    input: &AnalyzeInput,
    config: &PollConfig,
) -> Result<OperationResult, PollError> {
    let handle = begin_classify(client, classifier_id, input).await?;
    poller::poll(client, handle, config).await
}
