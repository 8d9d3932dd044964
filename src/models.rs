//! Core data models used throughout the stager.
//!
//! These types represent detection results and fetched payloads as they flow
//! from the content fetcher through the type detector to the ingestion stager.

use std::fmt;

use crate::formats::{GENERIC_BINARY_EXT, GENERIC_BINARY_MIME};

/// Result of type detection for one byte buffer.
///
/// Once returned by [`TypeDetector::detect`](crate::detector::TypeDetector::detect),
/// `extension` and `mime` always form a canonical pair from the format
/// registry (or the generic binary pair).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedType {
    /// Canonical lower-case extension including the leading dot (e.g. `.pdf`).
    pub extension: String,
    /// Canonical MIME type for `extension`.
    pub mime: String,
    /// Which rule produced this classification. Diagnostic only.
    pub reason: String,
    /// OOXML directory (`word/`, `xl/`, `ppt/`) when sniffed from a ZIP container.
    pub archive_inner_marker: Option<String>,
}

impl DetectedType {
    pub fn new(
        extension: impl Into<String>,
        mime: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            extension: extension.into(),
            mime: mime.into(),
            reason: reason.into(),
            archive_inner_marker: None,
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.archive_inner_marker = Some(marker.into());
        self
    }

    /// The `.bin` / `application/octet-stream` fallback.
    pub fn generic_binary(reason: impl Into<String>) -> Self {
        Self::new(GENERIC_BINARY_EXT, GENERIC_BINARY_MIME, reason)
    }

    pub fn is_generic_binary(&self) -> bool {
        self.extension == GENERIC_BINARY_EXT && self.mime == GENERIC_BINARY_MIME
    }
}

impl fmt::Display for DetectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}]", self.extension, self.mime, self.reason)
    }
}

/// A fetched file, named and typed, ready for upload.
#[derive(Clone)]
pub struct FileDetail {
    /// Normalized filename whose extension matches `detected.extension`.
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
    pub detected: DetectedType,
}

impl fmt::Debug for FileDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDetail")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("content", &format_args!("<{} bytes>", self.content.len()))
            .field("reason", &self.detected.reason)
            .finish()
    }
}
