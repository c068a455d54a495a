//! Tree-level dedupe pass.

use std::path::{Path, PathBuf};

use aa_core::{SafeWriter, WriteOutcome, TEMP_SUFFIX};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::merge::merge_text;

/// One file whose content changes.
#[derive(Debug, Clone, Serialize)]
pub struct ChangedFile {
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: WriteOutcome,
}

/// A file that could not be processed.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of a dedupe run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupeReport {
    pub dry_run: bool,
    pub scanned: usize,
    pub changed: Vec<ChangedFile>,
    /// Not valid UTF-8
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
}

impl DedupeReport {
    /// (written file, backup) pairs of an applied run.
    pub fn backups(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.changed.iter().filter_map(|c| match &c.outcome {
            WriteOutcome::Updated { backup } => Some((c.path.as_path(), backup.as_path())),
            _ => None,
        })
    }

    /// 0: nothing to do or everything applied. 2: changes pending or failures.
    pub fn exit_code(&self) -> i32 {
        if !self.failures.is_empty() || (self.dry_run && !self.changed.is_empty()) {
            2
        } else {
            0
        }
    }
}

/// Merge duplicate rules across a policy tree.
pub struct DedupeRun {
    target_dir: PathBuf,
    writer: SafeWriter,
}

impl DedupeRun {
    pub fn new(target_dir: impl Into<PathBuf>, writer: SafeWriter) -> Self {
        Self {
            target_dir: target_dir.into(),
            writer,
        }
    }

    /// Policy files under the target, sorted by path. Backups and in-flight
    /// temp files are left out.
    pub fn policy_files(&self) -> Vec<PathBuf> {
        let suffix = self.writer.backups().suffix().to_string();
        WalkDir::new(&self.target_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let name = e.file_name().to_string_lossy();
                !name.ends_with(TEMP_SUFFIX) && (suffix.is_empty() || !name.ends_with(&suffix))
            })
            .map(|e| e.into_path())
            .collect()
    }

    pub fn run(&self) -> DedupeReport {
        let mut report = DedupeReport {
            dry_run: self.writer.is_dry_run(),
            ..Default::default()
        };

        for path in self.policy_files() {
            report.scanned += 1;

            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "read failed");
                    report.failures.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let Ok(text) = String::from_utf8(bytes) else {
                debug!(path = %path.display(), "not UTF-8, skipped");
                report.skipped.push(path);
                continue;
            };

            let merged = merge_text(&text);
            if merged == text {
                continue;
            }

            let relative = path.strip_prefix(&self.target_dir).unwrap_or(&path).to_path_buf();
            match self.writer.write(&path, &relative, merged.as_bytes()) {
                Ok(WriteOutcome::Unchanged) => {}
                Ok(outcome) => {
                    if let WriteOutcome::Updated { backup } = &outcome {
                        info!(
                            path = %path.display(),
                            backup = %backup.display(),
                            "merged duplicates"
                        );
                    }
                    report.changed.push(ChangedFile { path, outcome });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "write failed");
                    report.failures.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
