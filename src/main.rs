//! # vstore-stager CLI (`vstage`)
//!
//! Detects file types and stages files for a vector-store file-search index.
//!
//! ## Usage
//!
//! ```bash
//! vstage --config ./config/vstage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vstage detect <source>...` | Print the detected type of local files or URLs |
//! | `vstage fetch <source>... [--out DIR]` | Fetch, classify, and name files |
//! | `vstage stage <path>... [--workdir DIR]` | Stage files and directories into indexable files |
//! | `vstage formats` | Print the format registry |
//!
//! Results go to stdout; diagnostics go to stderr through `tracing`
//! (`RUST_LOG=debug` shows every detection decision).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vstore_stager::{config, fetch_cmd, formats_cmd, stage_cmd};

/// vstage: file-type detection and ingestion staging for vector-store
/// file search.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without it, `./config/vstage.toml` is used when present and
/// built-in defaults otherwise.
#[derive(Parser)]
#[command(
    name = "vstage",
    about = "vstage: file-type detection and ingestion staging for vector-store file search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the real type of local files or URLs.
    ///
    /// Prints one tab-separated line per readable source:
    /// source, extension, MIME type, and the rule that decided it.
    Detect {
        /// Local paths or http(s) URLs.
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Fetch local files or URLs under the size cap.
    ///
    /// Unsupported content is skipped. Names are derived from the
    /// Content-Disposition header or URL and normalized with the
    /// detected extension.
    Fetch {
        /// Local paths or http(s) URLs.
        #[arg(required = true)]
        sources: Vec<String>,

        /// Directory to write fetched files into.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Stage files for the index.
    ///
    /// Indexable files pass through unchanged. Spreadsheets and CSV/TSV
    /// become Markdown tables, legacy Office files are converted with
    /// LibreOffice, and ZIP archives are unpacked and staged recursively.
    Stage {
        /// Files or directories. Directories are walked with the
        /// configured include/exclude globs.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Staging output directory (overrides `stage.workdir`).
        #[arg(long)]
        workdir: Option<PathBuf>,
    },

    /// Print supported formats and how each is handled.
    Formats,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config_path = cli.config;

    match cli.command {
        Commands::Detect { sources } => {
            let cfg = config::resolve_config(config_path.as_deref())?;
            fetch_cmd::run_detect(&cfg, &sources).await?;
        }
        Commands::Fetch { sources, out } => {
            let cfg = config::resolve_config(config_path.as_deref())?;
            fetch_cmd::run_fetch(&cfg, &sources, out.as_deref()).await?;
        }
        Commands::Stage { paths, workdir } => {
            let cfg = config::resolve_config(config_path.as_deref())?;
            stage_cmd::run_stage(&cfg, &paths, workdir).await?;
        }
        Commands::Formats => formats_cmd::run_formats(),
    }

    Ok(())
}
