//! `vstage stage`: stage files and directories for the index.
//!
//! Directory inputs are walked recursively and filtered with the configured
//! include/exclude globs (matched against the path relative to the walked
//! root). File inputs are staged as given. Inputs are staged in parallel on
//! blocking worker threads, at most `stage.jobs` at a time.
//!
//! Staged paths go to stdout one per line, followed by a summary:
//!
//! ```text
//! vstore_stage/report_1a2b3c4d_md/report.md
//! inputs: 1
//! staged: 1
//! unstageable: 0
//! ok
//! ```

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::{Config, StageConfig};
use crate::stage::Stager;

pub async fn run_stage(config: &Config, paths: &[PathBuf], workdir: Option<PathBuf>) -> Result<()> {
    let mut config = config.clone();
    if let Some(dir) = workdir {
        config.stage.workdir = dir;
    }

    let inputs = collect_inputs(paths, &config.stage)?;
    if inputs.is_empty() {
        bail!("No input files matched");
    }

    let stager = Arc::new(Stager::from_config(&config));
    let semaphore = Arc::new(Semaphore::new(config.stage.jobs));

    let mut handles = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let permit = semaphore.clone().acquire_owned().await?;
        let stager = stager.clone();
        let input = input.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = stager.stage_for_index(&input);
            (input, result)
        }));
    }

    let mut staged = 0usize;
    let mut unstageable = 0usize;
    for handle in handles {
        let (input, result) = handle.await?;
        let paths = result.with_context(|| format!("Failed to stage {}", input.display()))?;
        if paths.is_empty() {
            warn!(path = %input.display(), "unstageable");
            unstageable += 1;
        }
        for path in &paths {
            println!("{}", path.display());
        }
        staged += paths.len();
    }

    println!("inputs: {}", inputs.len());
    println!("staged: {}", staged);
    println!("unstageable: {}", unstageable);
    println!("ok");
    Ok(())
}

/// Expands directories into their matching files, keeping file inputs as
/// given. Output is sorted per directory for deterministic runs.
pub fn collect_inputs(paths: &[PathBuf], stage: &StageConfig) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&stage.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(stage.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let workdir = std::fs::canonicalize(&stage.workdir).ok();

    let mut inputs = Vec::new();
    for root in paths {
        if root.is_file() {
            inputs.push(root.clone());
            continue;
        }
        if !root.is_dir() {
            bail!("Input does not exist: {}", root.display());
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
            // Never restage our own output.
            !(e.file_type().is_dir() && is_workdir(e.path(), workdir.as_deref()))
        });
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) {
                continue;
            }
            if !include_set.is_match(&rel_str) {
                continue;
            }
            found.push(path.to_path_buf());
        }
        found.sort();
        inputs.extend(found);
    }
    Ok(inputs)
}

fn is_workdir(dir: &Path, workdir: Option<&Path>) -> bool {
    match workdir {
        Some(w) => std::fs::canonicalize(dir).map(|d| d == w).unwrap_or(false),
        None => false,
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
