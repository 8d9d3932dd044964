//! Legacy Office → OOXML conversion through an external converter.
//!
//! The only implementation drives LibreOffice in headless mode:
//!
//! ```text
//! soffice --headless --convert-to <docx|xlsx|pptx> <src> --outdir <src dir>
//! ```
//!
//! The converted file lands next to the source with the new extension. The
//! subprocess is polled and killed once `timeout` elapses.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::StageError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// OOXML format a legacy Office file converts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OoxmlTarget {
    Docx,
    Xlsx,
    Pptx,
}

impl OoxmlTarget {
    /// Target for a legacy extension (`.doc`, `.xls`, `.ppt`).
    pub fn for_legacy(ext: &str) -> Option<Self> {
        match ext {
            ".doc" => Some(Self::Docx),
            ".xls" => Some(Self::Xlsx),
            ".ppt" => Some(Self::Pptx),
            _ => None,
        }
    }

    /// Format token passed to `--convert-to`, also the output extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Pptx => "pptx",
        }
    }
}

/// Converts a legacy Office file and returns the path of the result.
pub trait OfficeConverter: Send + Sync {
    fn convert(&self, src: &Path, target: OoxmlTarget) -> Result<PathBuf, StageError>;
}

/// Headless LibreOffice.
#[derive(Debug, Clone)]
pub struct LibreOffice {
    program: PathBuf,
    timeout: Duration,
}

impl LibreOffice {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    /// Resolves `binary` to an executable. Names containing a path
    /// separator are used as given; bare names are searched on `PATH`, and
    /// `soffice` falls back to `libreoffice`.
    pub fn locate(binary: &str, timeout: Duration) -> Result<Self, StageError> {
        let mut candidates = vec![binary.to_string()];
        if binary == "soffice" {
            candidates.push("libreoffice".to_string());
        }
        candidates
            .iter()
            .find_map(|name| find_executable(name))
            .map(|program| {
                debug!(program = %program.display(), "office converter located");
                Self::new(program, timeout)
            })
            .ok_or_else(|| StageError::ConverterMissing {
                tried: candidates.join(", "),
            })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}

impl OfficeConverter for LibreOffice {
    fn convert(&self, src: &Path, target: OoxmlTarget) -> Result<PathBuf, StageError> {
        let out_dir = match src.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = src
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let expected = out_dir.join(format!("{}.{}", stem, target.as_str()));

        info!(src = %src.display(), target = target.as_str(), "converting legacy office file");
        let mut child = Command::new(&self.program)
            .arg("--headless")
            .arg("--convert-to")
            .arg(target.as_str())
            .arg(src)
            .arg("--outdir")
            .arg(&out_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StageError::ConverterMissing {
                    tried: self.program.display().to_string(),
                },
                _ => StageError::ConversionFailed {
                    path: src.to_path_buf(),
                    detail: format!("spawn failed: {}", e),
                },
            })?;

        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(StageError::ConversionTimedOut {
                        path: src.to_path_buf(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(StageError::ConversionFailed {
                        path: src.to_path_buf(),
                        detail: format!("wait failed: {}", e),
                    })
                }
            }
        };
        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(StageError::ConversionFailed {
                path: src.to_path_buf(),
                detail: format!("{}: {}", status, stderr.trim()),
            });
        }
        if !expected.is_file() {
            return Err(StageError::ConversionFailed {
                path: src.to_path_buf(),
                detail: format!("expected output {} was not produced", expected.display()),
            });
        }
        Ok(expected)
    }
}
