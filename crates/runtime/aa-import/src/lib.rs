//! aa-import: upstream profile importer
//!
//! ```text
//!   fetch ──► select ──► ensure_mode ──► ensure_variable ──► write
//!                                                 │
//!                                                 ▼
//!                                      DependencySet ──► copy once
//! ```
//!
//! Fetch failures and empty selections abort the run before anything is
//! written. Per-file failures are collected and reported at the end.

pub mod deps;
pub mod fetch;
pub mod importer;
pub mod mode;
pub mod select;
pub mod variable;

use std::path::PathBuf;

pub use deps::{copy_dependencies, scan_dependencies, DependencyReport, DependencySet};
pub use fetch::{fetcher_for, FetchedTree, GitFetcher, LocalTree, SourceFetcher};
pub use importer::{FileFailure, ImportReport, Importer};
pub use mode::{ensure_mode, profile_name_for};
pub use select::Selector;
pub use variable::{derive_exec_path, ensure_variable, EXEC_PATH_VARIABLE};

/// Result type for aa-import operations
pub type Result<T> = std::result::Result<T, ImportError>;

/// Errors that abort an import run
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Source tree unavailable: {0}")]
    Fetch(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Profile directory {} not found in source tree", .0.display())]
    MissingSourceRoot(PathBuf),

    #[error("No files matched the selection under {}; check keywords and mode", .0.display())]
    NoMatches(PathBuf),
}
