//! Ingestion staging: turning any supported file into indexable files.
//!
//! [`Stager::stage_for_index`] drives an explicit work stack. Each popped
//! path is routed by its extension:
//!
//! | Extension | Action |
//! |-----------|--------|
//! | indexable (`.pdf`, `.docx`, `.md`, code, ...) | emitted unchanged |
//! | `.doc` / `.xls` / `.ppt` | converted to OOXML next to the source, converted path pushed |
//! | `.xlsx` / `.csv` / `.tsv` | Markdown tables under `<workdir>/<stem>_<key>_md/` |
//! | `.zip` | extracted under `<workdir>/<stem>_<key>_unzip/`, members and manifest pushed |
//! | anything else | text fallback `<workdir>/<stem>_<key>_txt/<stem>.txt`, or nothing for binary |
//!
//! `<key>` is a short hash of the source path so concurrent stagers writing
//! into one workdir never share a subdirectory. Members are pushed in reverse
//! so the output keeps depth-first archive order; duplicates are dropped at
//! the end, first occurrence wins.
//!
//! # Archive guards
//!
//! Extraction rejects entries that are absolute, carry a drive prefix, or
//! contain `..`. Archives nested deeper than `max_archive_depth`, entries
//! past `max_archive_entries`, and bytes past `max_archive_bytes` are
//! skipped with a warning. The byte budget is shared by every archive
//! extracted during one `stage_for_index` call, nested ones included.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::convert::{LibreOffice, OfficeConverter, OoxmlTarget};
use crate::error::{StageError, TabularError};
use crate::formats::{extension_of, is_indexable_extension};
use crate::heuristics::looks_like_text;
use crate::naming::sanitize_component;
use crate::tabular::{delimited_to_markdown, xlsx_to_markdown, MarkdownLimits};

/// Name of the member listing written into every extracted archive.
pub const MANIFEST_NAME: &str = "ZIP_MANIFEST.md";

#[derive(Debug, Clone, Copy)]
pub struct StageLimits {
    pub max_rows_per_md: usize,
    pub max_cols: usize,
    pub max_archive_depth: usize,
    pub max_archive_entries: usize,
    pub max_archive_bytes: u64,
}

impl Default for StageLimits {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for StageLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_rows_per_md: config.stage.max_rows_per_md,
            max_cols: config.stage.max_cols,
            max_archive_depth: config.stage.max_archive_depth,
            max_archive_entries: config.stage.max_archive_entries,
            max_archive_bytes: config.stage.max_archive_bytes,
        }
    }
}

impl StageLimits {
    fn markdown(&self) -> MarkdownLimits {
        MarkdownLimits {
            max_rows_per_md: self.max_rows_per_md,
            max_cols: self.max_cols,
        }
    }
}

struct WorkItem {
    path: PathBuf,
    /// Number of archives this path was extracted from.
    depth: usize,
}

pub struct Stager {
    workdir: PathBuf,
    limits: StageLimits,
    converter: Option<Box<dyn OfficeConverter>>,
    /// What was looked for when no converter is available.
    converter_hint: String,
}

impl Stager {
    /// A stager without an office converter. Legacy Office inputs fail
    /// with [`StageError::ConverterMissing`] until one is attached.
    pub fn new(workdir: impl Into<PathBuf>, limits: StageLimits) -> Self {
        Self {
            workdir: workdir.into(),
            limits,
            converter: None,
            converter_hint: "soffice, libreoffice".to_string(),
        }
    }

    pub fn with_converter(mut self, converter: Box<dyn OfficeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Builds a stager from configuration, locating LibreOffice if present.
    /// A missing converter is only an error once a legacy file shows up.
    pub fn from_config(config: &Config) -> Self {
        let mut stager = Self::new(config.stage.workdir.clone(), StageLimits::from(config));
        let timeout = Duration::from_secs(config.convert.timeout_secs);
        match LibreOffice::locate(&config.convert.binary, timeout) {
            Ok(lo) => stager = stager.with_converter(Box::new(lo)),
            Err(e) => {
                debug!(error = %e, "office converter unavailable");
                if let StageError::ConverterMissing { tried } = e {
                    stager.converter_hint = tried;
                }
            }
        }
        stager
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Returns the paths ready for the index. An empty list means the input
    /// could not be staged.
    pub fn stage_for_index(&self, path: &Path) -> Result<Vec<PathBuf>, StageError> {
        let mut ready: Vec<PathBuf> = Vec::new();
        let mut budget = self.limits.max_archive_bytes;
        let mut stack = vec![WorkItem {
            path: path.to_path_buf(),
            depth: 0,
        }];

        while let Some(item) = stack.pop() {
            let ext = item
                .path
                .file_name()
                .and_then(|n| extension_of(&n.to_string_lossy()))
                .unwrap_or_default();

            if is_indexable_extension(&ext) {
                ready.push(item.path);
                continue;
            }

            match ext.as_str() {
                ".doc" | ".xls" | ".ppt" => {
                    let converted = self.convert_legacy(&item.path, &ext)?;
                    stack.push(WorkItem {
                        path: converted,
                        depth: item.depth,
                    });
                }
                ".xlsx" | ".csv" | ".tsv" => {
                    ready.extend(self.stage_tabular(&item.path, &ext)?);
                }
                ".zip" => {
                    if item.depth >= self.limits.max_archive_depth {
                        warn!(
                            path = %item.path.display(),
                            max_depth = self.limits.max_archive_depth,
                            "nested archive skipped"
                        );
                        continue;
                    }
                    let members = self.stage_zip(&item.path, &mut budget)?;
                    stack.extend(members.into_iter().rev().map(|p| WorkItem {
                        path: p,
                        depth: item.depth + 1,
                    }));
                }
                _ => ready.extend(self.stage_text_fallback(&item.path)?),
            }
        }

        let mut seen = HashSet::new();
        ready.retain(|p| seen.insert(p.clone()));
        info!(src = %path.display(), staged = ready.len(), "staged");
        Ok(ready)
    }

    fn convert_legacy(&self, path: &Path, ext: &str) -> Result<PathBuf, StageError> {
        let converter = self
            .converter
            .as_ref()
            .ok_or_else(|| StageError::ConverterMissing {
                tried: self.converter_hint.clone(),
            })?;
        let target = OoxmlTarget::for_legacy(ext).ok_or_else(|| StageError::ConversionFailed {
            path: path.to_path_buf(),
            detail: format!("no OOXML target for {}", ext),
        })?;
        converter.convert(path, target)
    }

    /// `<workdir>/<stem>_<key>_<suffix>`, created.
    fn output_dir(&self, path: &Path, suffix: &str) -> Result<PathBuf, StageError> {
        let dir = self
            .workdir
            .join(format!("{}_{}_{}", file_stem(path), path_key(path), suffix));
        std::fs::create_dir_all(&dir)
            .map_err(|e| StageError::io(format!("creating {}", dir.display()), e))?;
        Ok(dir)
    }

    fn stage_tabular(&self, path: &Path, ext: &str) -> Result<Vec<PathBuf>, StageError> {
        let out_dir = self.output_dir(path, "md")?;
        let limits = self.limits.markdown();
        let result = if ext == ".xlsx" {
            xlsx_to_markdown(path, &out_dir, limits)
        } else {
            delimited_to_markdown(path, &out_dir, limits)
        };
        match result {
            Ok(files) => Ok(files),
            Err(TabularError::Io(e)) if e.kind() != std::io::ErrorKind::NotFound => Err(
                StageError::io(format!("staging {}", path.display()), e),
            ),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "tabular file not staged");
                Ok(Vec::new())
            }
        }
    }

    /// Extracts `path` and returns member paths followed by the manifest.
    /// Extracted bytes are charged against `budget`.
    fn stage_zip(&self, path: &Path, budget: &mut u64) -> Result<Vec<PathBuf>, StageError> {
        let archive = File::open(path)
            .map_err(|e| e.to_string())
            .and_then(|f| zip::ZipArchive::new(f).map_err(|e| e.to_string()));
        let mut archive = match archive {
            Ok(a) => a,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "archive not readable");
                return Ok(Vec::new());
            }
        };

        let dest = self.output_dir(path, "unzip")?;
        let mut extracted = Vec::new();

        if archive.len() > self.limits.max_archive_entries {
            warn!(
                path = %path.display(),
                entries = archive.len(),
                max = self.limits.max_archive_entries,
                "archive entry limit reached; remaining entries skipped"
            );
        }

        for i in 0..archive.len().min(self.limits.max_archive_entries) {
            let mut entry = match archive.by_index(i) {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = %path.display(), index = i, error = %e, "archive entry unreadable");
                    continue;
                }
            };
            let Some(relative) = safe_relative_path(entry.name()) else {
                warn!(archive = %path.display(), entry = entry.name(), "unsafe archive entry rejected");
                continue;
            };
            let target = dest.join(&relative);
            if entry.is_dir() {
                std::fs::create_dir_all(&target)
                    .map_err(|e| StageError::io(format!("creating {}", target.display()), e))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StageError::io(format!("creating {}", parent.display()), e))?;
            }

            let mut out = File::create(&target)
                .map_err(|e| StageError::io(format!("creating {}", target.display()), e))?;
            let written = match std::io::copy(&mut (&mut entry).take(budget.saturating_add(1)), &mut out) {
                Ok(n) => n,
                Err(e) => {
                    warn!(archive = %path.display(), entry = %relative.display(), error = %e, "archive entry corrupt");
                    drop(out);
                    let _ = std::fs::remove_file(&target);
                    continue;
                }
            };
            if written > *budget {
                drop(out);
                let _ = std::fs::remove_file(&target);
                warn!(
                    archive = %path.display(),
                    max_bytes = self.limits.max_archive_bytes,
                    "archive byte limit reached; remaining entries skipped"
                );
                break;
            }
            out.flush()
                .map_err(|e| StageError::io(format!("writing {}", target.display()), e))?;
            *budget -= written;
            extracted.push(target);
        }

        let manifest = dest.join(MANIFEST_NAME);
        std::fs::write(&manifest, manifest_text(&extracted))
            .map_err(|e| StageError::io(format!("writing {}", manifest.display()), e))?;
        debug!(archive = %path.display(), members = extracted.len(), "archive extracted");

        extracted.push(manifest);
        Ok(extracted)
    }

    fn stage_text_fallback(&self, path: &Path) -> Result<Vec<PathBuf>, StageError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable; not staged");
                return Ok(Vec::new());
            }
        };
        if !looks_like_text(&bytes) {
            debug!(path = %path.display(), "binary content; not staged");
            return Ok(Vec::new());
        }
        let text = String::from_utf8_lossy(&bytes).replace('\u{fffd}', "");
        let out = self
            .output_dir(path, "txt")?
            .join(format!("{}.txt", file_stem(path)));
        std::fs::write(&out, text)
            .map_err(|e| StageError::io(format!("writing {}", out.display()), e))?;
        Ok(vec![out])
    }
}

fn file_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    sanitize_component(&stem)
}

/// First 8 hex digits of the SHA-256 of the path.
fn path_key(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    digest.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

/// Relative path for an archive entry name, or `None` if it could escape
/// the destination.
pub fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

fn manifest_text(members: &[PathBuf]) -> String {
    let mut names: Vec<String> = members
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    format!("# ZIP Manifest\n{}", names.join("\n"))
}
