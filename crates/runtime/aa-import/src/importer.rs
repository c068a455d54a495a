//! One import run: select, rewrite, write, copy dependencies.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use aa_core::{Mode, SafeWriter, WriteOutcome};
use serde::Serialize;
use tracing::{info, warn};

use crate::deps::{copy_dependencies, scan_dependencies, DependencyReport, DependencySet};
use crate::mode::ensure_mode;
use crate::select::Selector;
use crate::variable::ensure_variable;
use crate::{ImportError, Result};

/// A file that could not be processed.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

impl FileFailure {
    pub fn new(path: &Path, error: &dyn fmt::Display) -> Self {
        warn!(path = %path.display(), %error, "file failed");
        Self {
            path: path.to_path_buf(),
            error: error.to_string(),
        }
    }
}

/// Summary of an import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: Vec<(PathBuf, WriteOutcome)>,
    pub dependencies: DependencySet,
    pub dependency_copies: DependencyReport,
    pub failures: Vec<FileFailure>,
}

impl ImportReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len() + self.dependency_copies.failures.len()
    }

    /// 0 on success, 2 when any file failed.
    pub fn exit_code(&self) -> i32 {
        if self.failure_count() > 0 {
            2
        } else {
            0
        }
    }
}

/// Rewrites selected upstream profiles into the destination tree.
pub struct Importer {
    source_subdir: PathBuf,
    dest_root: PathBuf,
    mode: Mode,
    selector: Selector,
    writer: SafeWriter,
}

impl Importer {
    pub fn new(
        source_subdir: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        mode: Mode,
        selector: Selector,
        writer: SafeWriter,
    ) -> Self {
        Self {
            source_subdir: source_subdir.into(),
            dest_root: dest_root.into(),
            mode,
            selector,
            writer,
        }
    }

    /// Apply mode and variable rewrites to one file's text.
    pub fn rewrite(&self, text: &str, relative: &Path) -> String {
        let text = ensure_mode(text, self.mode, relative);
        ensure_variable(&text, relative)
    }

    /// Import from a fetched tree.
    ///
    /// Fails before writing anything when the source directory is missing or
    /// nothing is selected. Per-file problems are collected in the report.
    pub fn run(&self, tree_root: &Path) -> Result<ImportReport> {
        let source_root = tree_root.join(&self.source_subdir);
        if !source_root.is_dir() {
            return Err(ImportError::MissingSourceRoot(source_root));
        }

        let selected = self.selector.select(&source_root);
        if selected.is_empty() {
            return Err(ImportError::NoMatches(source_root));
        }
        info!(count = selected.len(), mode = %self.mode, "importing profiles");

        let mut report = ImportReport::default();
        let mut written = BTreeSet::new();

        for relative in selected {
            let source = source_root.join(&relative);
            let text = match fs::read_to_string(&source) {
                Ok(text) => text,
                Err(e) => {
                    report.failures.push(FileFailure::new(&source, &e));
                    continue;
                }
            };

            let rewritten = self.rewrite(&text, &relative);
            report.dependencies.extend(scan_dependencies(&rewritten));

            let target = self.dest_root.join(&relative);
            match self.writer.write(&target, &relative, rewritten.as_bytes()) {
                Ok(outcome) => {
                    written.insert(relative.clone());
                    report.imported.push((relative, outcome));
                }
                Err(e) => report.failures.push(FileFailure::new(&target, &e)),
            }
        }

        report.dependency_copies = copy_dependencies(
            &report.dependencies,
            &source_root,
            &self.dest_root,
            &self.writer,
            &written,
        );

        Ok(report)
    }
}
