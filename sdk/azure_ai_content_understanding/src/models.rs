//! Shared constants and file-type tables for Content Understanding requests.

use std::path::Path;

/// Prebuilt analyzer for general document content extraction.
pub const PREBUILT_DOCUMENT_ANALYZER_ID: &str = "prebuilt-documentAnalyzer";

/// File listing the reference documents of a pro-mode knowledge source.
pub const SOURCES_JSONL: &str = "sources.jsonl";

/// File extensions accepted for standard analysis: documents, images, audio
/// and video.
pub const SUPPORTED_FILE_TYPES: &[&str] = &[
    // documents and images
    ".pdf", ".tiff", ".jpg", ".jpeg", ".png", ".bmp", ".heif", ".docx", ".xlsx", ".pptx", ".txt",
    ".html", ".md", ".eml", ".msg", ".xml",
    // audio
    ".wav", ".mp3", ".m4a", ".opus", ".ogg", ".flac", ".wma", ".aac", ".amr", ".3gp", ".webm",
    ".spx",
    // video
    ".mp4", ".m4v", ".flv", ".wmv", ".asf", ".avi", ".mkv", ".mov",
];

/// File extensions accepted as pro-mode inputs and reference documents.
pub const SUPPORTED_FILE_TYPES_PRO_MODE: &[&str] =
    &[".pdf", ".tiff", ".jpg", ".jpeg", ".png", ".bmp", ".heif"];

/// Returns `true` if `ext` is a supported extension.
///
/// The leading dot is optional and case is ignored, so `"PDF"`, `".pdf"` and
/// `".Pdf"` are equivalent.
pub fn is_supported_extension(ext: &str, pro_mode: bool) -> bool {
    let ext = ext.strip_prefix('.').unwrap_or(ext);
    if ext.is_empty() {
        return false;
    }

    let table = if pro_mode {
        SUPPORTED_FILE_TYPES_PRO_MODE
    } else {
        SUPPORTED_FILE_TYPES
    };
    table
        .iter()
        .any(|supported| supported[1..].eq_ignore_ascii_case(ext))
}

/// Returns `true` if the extension of `path` is supported.
///
/// Only the name is inspected; the filesystem is not touched.
pub fn is_supported_file(path: &Path, pro_mode: bool) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| is_supported_extension(ext, pro_mode))
}
