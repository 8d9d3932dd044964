use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file consulted when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/vstage.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Hard cap on fetched bytes. Larger content is skipped, never truncated.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_read_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("vstore-stager/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StageConfig {
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    #[serde(default = "default_max_rows_per_md")]
    pub max_rows_per_md: usize,
    #[serde(default = "default_max_cols")]
    pub max_cols: usize,
    /// Archives nested deeper than this are skipped.
    #[serde(default = "default_max_archive_depth")]
    pub max_archive_depth: usize,
    #[serde(default = "default_max_archive_entries")]
    pub max_archive_entries: usize,
    /// Total uncompressed bytes extracted while staging one input,
    /// nested archives included.
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            max_rows_per_md: default_max_rows_per_md(),
            max_cols: default_max_cols(),
            max_archive_depth: default_max_archive_depth(),
            max_archive_entries: default_max_archive_entries(),
            max_archive_bytes: default_max_archive_bytes(),
            jobs: default_jobs(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_workdir() -> PathBuf {
    PathBuf::from("vstore_stage")
}
fn default_max_rows_per_md() -> usize {
    2000
}
fn default_max_cols() -> usize {
    200
}
fn default_max_archive_depth() -> usize {
    4
}
fn default_max_archive_entries() -> usize {
    10_000
}
fn default_max_archive_bytes() -> u64 {
    500 * 1024 * 1024
}
fn default_jobs() -> usize {
    4
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConvertConfig {
    /// Converter executable. A bare name is looked up on `PATH`, with
    /// `libreoffice` tried as a fallback for the default `soffice`.
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_convert_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_secs: default_convert_timeout_secs(),
        }
    }
}

fn default_binary() -> String {
    "soffice".to_string()
}
fn default_convert_timeout_secs() -> u64 {
    180
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Explicit path, else `./config/vstage.toml` if present, else defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_config(default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.fetch.max_bytes == 0 {
        anyhow::bail!("fetch.max_bytes must be > 0");
    }
    if config.stage.max_rows_per_md == 0 {
        anyhow::bail!("stage.max_rows_per_md must be > 0");
    }
    if config.stage.max_cols == 0 {
        anyhow::bail!("stage.max_cols must be > 0");
    }
    if config.stage.jobs == 0 {
        anyhow::bail!("stage.jobs must be > 0");
    }
    if config.convert.timeout_secs == 0 {
        anyhow::bail!("convert.timeout_secs must be > 0");
    }
    if config.convert.binary.trim().is_empty() {
        anyhow::bail!("convert.binary must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.fetch.max_bytes, 52_428_800);
        assert_eq!(config.stage.max_rows_per_md, 2000);
        assert_eq!(config.stage.max_cols, 200);
        assert_eq!(config.stage.include_globs, vec!["**/*"]);
        assert_eq!(config.convert.binary, "soffice");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let file = write_config("[stage]\nmax_rows_per_md = 10\n\n[fetch]\nmax_bytes = 1024\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.stage.max_rows_per_md, 10);
        assert_eq!(config.stage.max_cols, 200);
        assert_eq!(config.fetch.max_bytes, 1024);
        assert_eq!(config.fetch.read_timeout_secs, 30);
    }

    #[test]
    fn zero_limits_are_rejected() {
        for body in [
            "[fetch]\nmax_bytes = 0\n",
            "[stage]\nmax_rows_per_md = 0\n",
            "[stage]\nmax_cols = 0\n",
            "[stage]\njobs = 0\n",
        ] {
            let file = write_config(body);
            assert!(load_config(file.path()).is_err(), "{}", body);
        }
    }

    #[test]
    fn example_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/vstage.example.toml");
        let config = load_config(&path).unwrap();
        let defaults = Config::default();
        assert_eq!(config.fetch.max_bytes, defaults.fetch.max_bytes);
        assert_eq!(config.stage.max_archive_bytes, defaults.stage.max_archive_bytes);
        assert_eq!(config.stage.workdir, defaults.stage.workdir);
        assert_eq!(config.convert.timeout_secs, defaults.convert.timeout_secs);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(resolve_config(Some(Path::new("/nonexistent/vstage.toml"))).is_err());
    }
}
