//! Named analyzer templates paired with sample inputs.
//!
//! A [`TemplateCatalog`] is an immutable lookup table built once at startup.
//! Each [`TemplateEntry`] points at an analyzer template JSON file and a sample
//! file that exercises it.
//!
//! ```rust,no_run
//! use azure_ai_content_understanding::templates::TemplateCatalog;
//!
//! # async fn example() -> azure_ai_content_understanding_core::CuResult<()> {
//! let catalog = TemplateCatalog::field_extraction("samples");
//! let entry = catalog.require("invoice")?;
//! let template = entry.load_template().await?;
//! # Ok(())
//! # }
//! ```

use crate::analyzer::AnalyzerTemplate;
use azure_ai_content_understanding_core::error::{CuError, CuResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An analyzer template and the sample file it is demonstrated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub template_path: PathBuf,
    pub sample_file_path: PathBuf,
}

impl TemplateEntry {
    pub fn new(template_path: impl Into<PathBuf>, sample_file_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
            sample_file_path: sample_file_path.into(),
        }
    }

    /// Read and parse the template file.
    pub async fn load_template(&self) -> CuResult<AnalyzerTemplate> {
        AnalyzerTemplate::from_file(&self.template_path).await
    }
}

/// Immutable mapping from template name to [`TemplateEntry`].
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    entries: BTreeMap<String, TemplateEntry>,
}

impl TemplateCatalog {
    pub fn new<N>(entries: impl IntoIterator<Item = (N, TemplateEntry)>) -> Self
    where
        N: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, entry)| (name.into(), entry))
                .collect(),
        }
    }

    /// Field extraction samples: documents, images, audio and video.
    ///
    /// Paths are resolved against `base_dir`, which is expected to contain
    /// `analyzer_templates/` and `data/`.
    pub fn field_extraction(base_dir: impl AsRef<Path>) -> Self {
        Self::from_table(
            base_dir.as_ref(),
            &[
                ("invoice", "invoice.json", "invoice.pdf"),
                ("chart", "image_chart.json", "pieChart.jpg"),
                (
                    "call_recording",
                    "call_recording_analytics.json",
                    "callCenterRecording.mp3",
                ),
                (
                    "conversation_audio",
                    "conversational_audio_analytics.json",
                    "callCenterRecording.mp3",
                ),
                ("marketing_video", "marketing_video.json", "FlightSimulator.mp4"),
            ],
        )
    }

    /// Field extraction over transcripts produced ahead of time by different
    /// speech services.
    pub fn pretranscribed_conversations(base_dir: impl AsRef<Path>) -> Self {
        Self::from_table(
            base_dir.as_ref(),
            &[
                (
                    "call_recording_pretranscribe_batch",
                    "call_recording_analytics_text.json",
                    "batch_pretranscribed.json",
                ),
                (
                    "call_recording_pretranscribe_fast",
                    "call_recording_analytics_text.json",
                    "fast_pretranscribed.json",
                ),
                (
                    "call_recording_pretranscribe_cu",
                    "call_recording_analytics_text.json",
                    "cu_pretranscribed.json",
                ),
            ],
        )
    }

    fn from_table(base_dir: &Path, table: &[(&str, &str, &str)]) -> Self {
        let templates = base_dir.join("analyzer_templates");
        let data = base_dir.join("data");
        Self::new(table.iter().map(|(name, template, sample)| {
            (
                *name,
                TemplateEntry::new(templates.join(template), data.join(sample)),
            )
        }))
    }

    pub fn get(&self, name: &str) -> Option<&TemplateEntry> {
        self.entries.get(name)
    }

    /// Look up `name`, failing with the list of known names.
    pub fn require(&self, name: &str) -> CuResult<&TemplateEntry> {
        self.get(name).ok_or_else(|| {
            CuError::InvalidInput(format!(
                "unknown template '{name}', expected one of: {}",
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Template names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
