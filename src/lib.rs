//! # vstore-stager
//!
//! File-type detection and ingestion staging for a hosted vector-store
//! file-search index.
//!
//! Given bytes of unknown or misleading type (a local file or a streamed
//! URL download), the crate determines the real format through layered
//! inspection, normalizes it to one canonical (extension, MIME) pair, and,
//! when the index cannot ingest that format directly, stages it into
//! indexable derivatives.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │   Fetcher   │──▶│     TypeDetector      │──▶│    Stager     │──▶ paths
//! │ local / URL │   │ infer → signature     │   │ convert/unzip │
//! └─────────────┘   │ → text → alias        │   │ → markdown    │
//!                   │ → enforce             │   └──────────────┘
//!                   └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vstage detect ./inbox/mystery.bin https://example.com/report
//! vstage fetch https://example.com/report --out ./downloads
//! vstage stage ./inbox --workdir ./vstore_stage
//! vstage formats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | `DetectedType` and `FileDetail` |
//! | [`formats`] | Format registry tables and lookups |
//! | [`signature`] | Magic-number and container inspection |
//! | [`heuristics`] | Text classification pipeline |
//! | [`delimited`] | Quote-aware CSV/TSV primitives |
//! | [`detector`] | Strategy pipeline producing canonical types |
//! | [`enforce`] | Canonical-pair enforcement |
//! | [`naming`] | Filename derivation and normalization |
//! | [`fetch`] | Capped local and HTTP fetching |
//! | [`tabular`] | CSV/TSV/XLSX to Markdown tables |
//! | [`convert`] | Legacy Office conversion via LibreOffice |
//! | [`stage`] | Ingestion staging work queue |
//! | [`error`] | Staging error types |
//! | [`fetch_cmd`] | `vstage detect` / `vstage fetch` |
//! | [`stage_cmd`] | `vstage stage` with directory walking |
//! | [`formats_cmd`] | `vstage formats` |

pub mod config;
pub mod convert;
pub mod delimited;
pub mod detector;
pub mod enforce;
pub mod error;
pub mod fetch;
pub mod fetch_cmd;
pub mod formats;
pub mod formats_cmd;
pub mod heuristics;
pub mod models;
pub mod naming;
pub mod signature;
pub mod stage;
pub mod stage_cmd;
pub mod tabular;
