//! Error types for staging.
//!
//! Only environment-level problems are errors: a missing or failing office
//! converter, or a filesystem that refuses staged output. Per-file data
//! problems (unreadable spreadsheets, non-text fallbacks) are logged and
//! skipped by the stager instead.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("no office converter found (tried {tried}); install LibreOffice to stage legacy Office files")]
    ConverterMissing { tried: String },

    #[error("office converter failed on {path}: {detail}")]
    ConversionFailed { path: PathBuf, detail: String },

    #[error("office converter timed out after {timeout:?} on {path}")]
    ConversionTimedOut { path: PathBuf, timeout: Duration },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// A spreadsheet or delimited file that could not be read.
#[derive(Debug, thiserror::Error)]
pub enum TabularError {
    #[error("archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{part} exceeds {limit} bytes")]
    EntryTooLarge { part: String, limit: u64 },

    #[error("workbook has no worksheets")]
    NoSheets,
}
