//! `vstage detect` and `vstage fetch`.
//!
//! Both read each source (local path or URL) through the capped
//! [`Fetcher`]. `detect` prints the classification of whatever was read;
//! `fetch` keeps only supported content, prints its normalized name, and
//! optionally writes it to an output directory.
//!
//! Output columns are tab-separated so the listing can be piped to `cut`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::fetch::Fetcher;

/// Prints `source  ext  mime  reason` for every readable source.
pub async fn run_detect(config: &Config, sources: &[String]) -> Result<()> {
    let fetcher = Fetcher::new(&config.fetch)?;
    let mut skipped = 0usize;

    for source in sources {
        match fetcher.fetch_raw(source).await {
            Some(fetched) => {
                let detected = fetcher.detect(&fetched);
                println!(
                    "{}\t{}\t{}\t{}",
                    source, detected.extension, detected.mime, detected.reason
                );
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        println!("skipped: {}", skipped);
    }
    println!("ok");
    Ok(())
}

/// Prints `name  mime  bytes` for every fetched source and writes the
/// content under `out` when given.
pub async fn run_fetch(config: &Config, sources: &[String], out: Option<&Path>) -> Result<()> {
    let fetcher = Fetcher::new(&config.fetch)?;

    if let Some(dir) = out {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    let details = fetcher.fetch_many(sources).await;
    for detail in &details {
        println!(
            "{}\t{}\t{}",
            detail.file_name,
            detail.mime_type,
            detail.content.len()
        );
        if let Some(dir) = out {
            let target = unique_path(dir, &detail.file_name);
            std::fs::write(&target, &detail.content)
                .with_context(|| format!("Failed to write {}", target.display()))?;
        }
    }

    println!("fetched: {}", details.len());
    println!("skipped: {}", sources.len() - details.len());
    println!("ok");
    Ok(())
}

/// `dir/name`, or `dir/<stem>_<n>.<ext>` when that is already taken.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    (2..)
        .map(|n| {
            if ext.is_empty() {
                dir.join(format!("{}_{}", stem, n))
            } else {
                dir.join(format!("{}_{}.{}", stem, n, ext))
            }
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
