//! Analyzer lifecycle: create, analyze, inspect, and delete.
//!
//! Creating an analyzer and analyzing a file are long-running operations.
//! [`begin_create`] and [`begin_analyze`] return an [`OperationHandle`] for
//! the [`poller`](crate::poller); [`create_and_poll`] and [`analyze_and_poll`]
//! do both steps at once.
//!
//! ## Example
//!
//! ```rust,no_run
//! use azure_ai_content_understanding::analyzer::{self, AnalyzeInput, AnalyzerTemplate};
//! use azure_ai_content_understanding::poller::PollConfig;
//! use azure_ai_content_understanding_core::auth::CuCredential;
//! use azure_ai_content_understanding_core::client::CuClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CuClient::builder()
//!     .endpoint("https://your-resource.services.ai.azure.com")
//!     .credential(CuCredential::subscription_key("your-key"))
//!     .build()?;
//! let config = PollConfig::default();
//!
//! let template = AnalyzerTemplate::from_file("analyzer_templates/invoice.json").await?;
//! analyzer::create_and_poll(&client, "invoice-sample", &template, &config).await?;
//!
//! let input = AnalyzeInput::from_location("data/invoice.pdf").await?;
//! let result = analyzer::analyze_and_poll(&client, "invoice-sample", &input, &config).await?;
//! println!("{:#}", result.payload);
//!
//! analyzer::delete(&client, "invoice-sample").await?;
//! # Ok(())
//! # }
//! ```

use crate::models::{is_supported_file, PREBUILT_DOCUMENT_ANALYZER_ID, SOURCES_JSONL};
use crate::operation::{OperationHandle, OperationResult};
use crate::poller::{self, PollConfig, PollError};
use azure_ai_content_understanding_core::client::CuClient;
use azure_ai_content_understanding_core::error::{CuError, CuResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use url::Url;

const ANALYZERS_PATH: &str = "/contentunderstanding/analyzers";
const ANALYZER_RESULTS_PATH: &str = "/contentunderstanding/analyzerResults";

/// Status polling interval used by [`analyze_prebuilt`].
pub const PREBUILT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Overall deadline used by [`analyze_prebuilt`].
pub const PREBUILT_POLL_TIMEOUT: Duration = Duration::from_secs(360);

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Analyzer definition sent when creating an analyzer.
///
/// The schema is owned by the service, so the template is kept as JSON and
/// only the members this crate adds are typed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnalyzerTemplate(Value);

impl AnalyzerTemplate {
    /// Wrap a JSON template. It must be an object.
    pub fn from_value(value: Value) -> CuResult<Self> {
        if !value.is_object() {
            return Err(CuError::InvalidInput(
                "analyzer template must be a JSON object".into(),
            ));
        }
        Ok(Self(value))
    }

    /// Read a JSON template from disk.
    pub async fn from_file(path: impl AsRef<Path>) -> CuResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let value = serde_json::from_slice(&raw)?;
        tracing::debug!(path = %path.display(), "loaded analyzer template");
        Self::from_value(value)
    }

    /// Attach labeled training data stored in a blob container.
    pub fn with_training_data(
        mut self,
        container_sas_url: impl Into<String>,
        prefix: impl Into<String>,
    ) -> CuResult<Self> {
        let (container_url, prefix) = storage_location(container_sas_url, prefix, "training data")?;
        self.insert(
            "trainingData",
            json!({
                "containerUrl": container_url,
                "kind": "blob",
                "prefix": prefix,
            }),
        );
        Ok(self)
    }

    /// Attach pro-mode reference documents stored in a blob container.
    ///
    /// The container must hold a `sources.jsonl` listing the documents.
    pub fn with_knowledge_sources(
        mut self,
        container_sas_url: impl Into<String>,
        prefix: impl Into<String>,
    ) -> CuResult<Self> {
        let (container_url, prefix) =
            storage_location(container_sas_url, prefix, "knowledge sources")?;
        self.insert(
            "knowledgeSources",
            json!([{
                "kind": "reference",
                "containerUrl": container_url,
                "prefix": prefix,
                "fileListPath": SOURCES_JSONL,
            }]),
        );
        Ok(self)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn insert(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = &mut self.0 {
            map.insert(key.to_string(), value);
        }
    }
}

fn storage_location(
    container_sas_url: impl Into<String>,
    prefix: impl Into<String>,
    what: &str,
) -> CuResult<(String, String)> {
    let container_url = container_sas_url.into();
    let prefix = prefix.into();
    if container_url.is_empty() {
        return Err(CuError::Builder(format!("{what} container SAS URL is required")));
    }
    if prefix.is_empty() {
        return Err(CuError::Builder(format!("{what} path prefix is required")));
    }
    Ok((container_url, prefix))
}

// ---------------------------------------------------------------------------
// Analyze input
// ---------------------------------------------------------------------------

/// A named file sent inline in a pro-mode analyze request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedInput {
    pub name: String,
    /// Base64-encoded file content.
    pub data: String,
}

impl NamedInput {
    pub fn from_bytes(name: impl Into<String>, content: &[u8]) -> Self {
        Self {
            name: name.into(),
            data: STANDARD.encode(content),
        }
    }
}

/// What to analyze.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzeInput {
    /// A publicly reachable (or SAS) URL.
    Url(String),
    /// Raw file content, uploaded as `application/octet-stream`.
    Bytes(Bytes),
    /// Several files sent inline. Pro mode only.
    Inputs(Vec<NamedInput>),
}

impl AnalyzeInput {
    /// Resolve a file path, directory path, or URL.
    ///
    /// - An existing file is read into [`AnalyzeInput::Bytes`]. A file named
    ///   explicitly is sent whatever its extension; an extension missing from
    ///   [`SUPPORTED_FILE_TYPES`](crate::models::SUPPORTED_FILE_TYPES) is
    ///   only logged, and the service has the final say.
    /// - An existing directory becomes [`AnalyzeInput::Inputs`] holding every
    ///   file with a pro-mode extension, ordered by name.
    /// - An `http(s)` URL becomes [`AnalyzeInput::Url`].
    ///
    /// # Errors
    ///
    /// Returns [`CuError::InvalidInput`] for directories without supported
    /// files and for anything that is neither a path nor a URL. Read
    /// failures surface as [`CuError::Io`].
    pub async fn from_location(location: &str) -> CuResult<Self> {
        let path = Path::new(location);

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Self::from_directory(path).await,
            Ok(meta) if meta.is_file() => {
                if !is_supported_file(path, false) {
                    tracing::warn!(
                        path = %path.display(),
                        "file extension is not a documented input type, sending as is"
                    );
                }
                let content = tokio::fs::read(path).await?;
                Ok(Self::Bytes(Bytes::from(content)))
            }
            Ok(_) => Err(CuError::InvalidInput(format!(
                "'{location}' is not a regular file or directory"
            ))),
            Err(_) => match Url::parse(location) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    Ok(Self::Url(location.to_string()))
                }
                _ => Err(CuError::InvalidInput(format!(
                    "'{location}' must be an existing path or an http(s) URL"
                ))),
            },
        }
    }

    async fn from_directory(dir: &Path) -> CuResult<Self> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_supported_file(&path, true) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(CuError::InvalidInput(format!(
                "directory '{}' has no files supported in pro mode",
                dir.display()
            )));
        }

        let mut inputs = Vec::with_capacity(files.len());
        for path in files {
            let content = tokio::fs::read(&path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            inputs.push(NamedInput::from_bytes(name, &content));
        }
        Ok(Self::Inputs(inputs))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::Bytes(_) => "bytes",
            Self::Inputs(_) => "inputs",
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// An analyzer as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analyzer {
    pub analyzer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Provisioning state, e.g. `ready` or `creating`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<String>,
    /// Remaining members (field schema, config, warnings, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of analyzers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerList {
    pub value: Vec<Analyzer>,
    #[serde(default)]
    pub next_link: Option<String>,
}

// ---------------------------------------------------------------------------
// API functions
// ---------------------------------------------------------------------------

/// Join `collection` and `id`, rejecting ids that would escape the path.
pub(crate) fn resource_path(collection: &str, id_name: &str, id: &str) -> CuResult<String> {
    if id.is_empty() {
        return Err(CuError::InvalidInput(format!("{id_name} cannot be empty")));
    }
    if id.contains(['/', '?', '#', ':']) {
        return Err(CuError::InvalidInput(format!(
            "{id_name} '{id}' contains a reserved character"
        )));
    }
    Ok(format!("{collection}/{id}"))
}

fn analyzer_path(analyzer_id: &str) -> CuResult<String> {
    resource_path(ANALYZERS_PATH, "analyzer_id", analyzer_id)
}

/// POST `input` to an `:analyze` or `:classify` path.
pub(crate) async fn post_input(
    client: &CuClient,
    path: &str,
    input: &AnalyzeInput,
) -> CuResult<reqwest::Response> {
    match input {
        AnalyzeInput::Url(url) => client.post(path, &json!({ "url": url })).await,
        AnalyzeInput::Bytes(content) => {
            client
                .post_bytes(path, content.clone(), "application/octet-stream")
                .await
        }
        AnalyzeInput::Inputs(inputs) => client.post(path, &json!({ "inputs": inputs })).await,
    }
}

/// Start creating an analyzer from a template.
///
/// # Tracing
///
/// Emits a span named `content_understanding::analyzer::begin_create` with
/// field `analyzer_id`.
#[tracing::instrument(
    name = "content_understanding::analyzer::begin_create",
    skip(client, template),
    fields(analyzer_id = %analyzer_id)
)]
pub async fn begin_create(
    client: &CuClient,
    analyzer_id: &str,
    template: &AnalyzerTemplate,
) -> CuResult<OperationHandle> {
    tracing::debug!("submitting analyzer template");

    let path = analyzer_path(analyzer_id)?;
    let response = client.put(&path, template).await?;
    let handle = OperationHandle::from_response(&response)?;

    tracing::debug!(operation_id = %handle.operation_id(), "analyzer create request accepted");
    Ok(handle)
}

/// Start analyzing `input` with an existing analyzer.
///
/// # Tracing
///
/// Emits a span named `content_understanding::analyzer::begin_analyze` with
/// fields `analyzer_id` and `input`.
#[tracing::instrument(
    name = "content_understanding::analyzer::begin_analyze",
    skip(client, input),
    fields(analyzer_id = %analyzer_id, input = input.kind())
)]
pub async fn begin_analyze(
    client: &CuClient,
    analyzer_id: &str,
    input: &AnalyzeInput,
) -> CuResult<OperationHandle> {
    tracing::debug!("submitting analyze request");

    let path = format!("{}:analyze", analyzer_path(analyzer_id)?);
    let response = post_input(client, &path, input).await?;
    let handle = OperationHandle::from_response(&response)?;

    tracing::debug!(operation_id = %handle.operation_id(), "analyze request accepted");
    Ok(handle)
}

/// Get an analyzer by id.
#[tracing::instrument(
    name = "content_understanding::analyzer::get",
    skip(client),
    fields(analyzer_id = %analyzer_id)
)]
pub async fn get(client: &CuClient, analyzer_id: &str) -> CuResult<Analyzer> {
    tracing::debug!("getting analyzer");

    let path = analyzer_path(analyzer_id)?;
    let response = client.get(&path).await?;
    let analyzer = response.json::<Analyzer>().await?;

    tracing::debug!(status = ?analyzer.status, "analyzer retrieved");
    Ok(analyzer)
}

/// List the first page of analyzers.
#[tracing::instrument(name = "content_understanding::analyzer::list", skip(client))]
pub async fn list(client: &CuClient) -> CuResult<AnalyzerList> {
    tracing::debug!("listing analyzers");

    let response = client.get(ANALYZERS_PATH).await?;
    let list = response.json::<AnalyzerList>().await?;

    tracing::debug!(count = list.value.len(), "analyzers listed");
    Ok(list)
}

/// List every analyzer, following `nextLink` across pages.
///
/// Stops with [`CuError::InvalidInput`] if the service hands back a link it
/// already returned.
#[tracing::instrument(name = "content_understanding::analyzer::list_all", skip(client))]
pub async fn list_all(client: &CuClient) -> CuResult<Vec<Analyzer>> {
    let mut page = list(client).await?;
    let mut analyzers = std::mem::take(&mut page.value);
    let mut visited = HashSet::new();

    while let Some(next_link) = page.next_link.take() {
        if !visited.insert(next_link.clone()) {
            return Err(CuError::InvalidInput(format!(
                "nextLink '{next_link}' was already visited"
            )));
        }
        let url = Url::parse(&next_link)
            .map_err(|e| CuError::invalid_endpoint_with_source("failed to parse nextLink", e))?;
        tracing::trace!(%url, page = visited.len() + 1, "fetching next page");
        page = client.get_once(&url).await?.json::<AnalyzerList>().await?;
        analyzers.append(&mut page.value);
    }

    tracing::debug!(count = analyzers.len(), "all analyzers listed");
    Ok(analyzers)
}

/// Delete an analyzer.
#[tracing::instrument(
    name = "content_understanding::analyzer::delete",
    skip(client),
    fields(analyzer_id = %analyzer_id)
)]
pub async fn delete(client: &CuClient, analyzer_id: &str) -> CuResult<()> {
    tracing::debug!("deleting analyzer");

    let path = analyzer_path(analyzer_id)?;
    client.delete(&path).await?;

    tracing::debug!("analyzer deleted");
    Ok(())
}

/// Download a file produced by an analyze operation, such as a video
/// keyframe or a face thumbnail.
///
/// `file_path` is the path reported in the result, e.g. `keyFrame.400`.
#[tracing::instrument(
    name = "content_understanding::analyzer::get_result_file",
    skip(client),
    fields(operation_id = %operation_id, file_path = %file_path)
)]
pub async fn get_result_file(
    client: &CuClient,
    operation_id: &str,
    file_path: &str,
) -> CuResult<Bytes> {
    if operation_id.is_empty() || file_path.is_empty() {
        return Err(CuError::InvalidInput(
            "operation_id and file_path cannot be empty".into(),
        ));
    }

    let path = format!("{ANALYZER_RESULTS_PATH}/{operation_id}/files/{file_path}");
    let response = client.get(&path).await?;
    let content = response.bytes().await?;

    tracing::debug!(len = content.len(), "result file downloaded");
    Ok(content)
}

/// Create an analyzer and wait for it to be ready.
pub async fn create_and_poll(
    client: &CuClient,
    analyzer_id: &str,
    template: &AnalyzerTemplate,
    config: &PollConfig,
) -> Result<OperationResult, PollError> {
    let handle = begin_create(client, analyzer_id, template).await?;
    poller::poll(client, handle, config).await
}

/// Analyze `input` and wait for the result.
pub async fn analyze_and_poll(
    client: &CuClient,
    analyzer_id: &str,
    input: &AnalyzeInput,
    config: &PollConfig,
) -> Result<OperationResult, PollError> {
    let handle = begin_analyze(client, analyzer_id, input).await?;
    poller::poll(client, handle, config).await
}

/// Analyze `input` with the prebuilt document analyzer, polling every
/// [`PREBUILT_POLL_INTERVAL`] for up to [`PREBUILT_POLL_TIMEOUT`].
pub async fn analyze_prebuilt(
    client: &CuClient,
    input: &AnalyzeInput,
) -> Result<OperationResult, PollError> {
    let config = PollConfig::builder()
        .interval(PREBUILT_POLL_INTERVAL)
        .timeout(PREBUILT_POLL_TIMEOUT)
        .build()?;
    analyze_and_poll(client, PREBUILT_DOCUMENT_ANALYZER_ID, input, &config).await
}
