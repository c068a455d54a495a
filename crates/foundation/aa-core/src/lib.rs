//! # aa-core
//!
//! Shared text primitives for AppArmor policy trees.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        POLICY LINE                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  "  owner /etc/foo r,   # note\n"                            │
//! │   ──┬── ──┬── ──┬──── ┬  ──┬───  ─┬─                         │
//! │  indent qual  path   perms comment terminator                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every line is classified into one of four outcomes:
//!
//! - `Trivia`  blank or comment-only
//! - `Header`  `profile <name> <path> flags=(...) {`
//! - `Rule`    single-line file access rule
//! - `Opaque`  anything else, passed through byte-for-byte

pub mod backup;
pub mod grammar;
pub mod header;
pub mod line;
pub mod permission;

use std::path::PathBuf;

pub use backup::{BackupStore, SafeWriter, WriteOutcome, TEMP_SUFFIX};
pub use grammar::{
    classify_line, parse_file_rule, split_comment, FileRule, LineKind, MergeKey, RuleLine,
};
pub use header::{FlagSet, HeaderKind, Mode, ProfileHeader};
pub use line::{Line, PolicyFile, Terminator};
pub use permission::PermissionSet;

/// Result type for aa-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in aa-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid mode '{0}' (expected enforce or complain)")]
    InvalidMode(String),
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
