//! Abstraction, tunable and abi dependencies of imported profiles.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use aa_core::{SafeWriter, WriteOutcome};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::importer::FileFailure;

/// Namespaces whose files are copied along with the profiles.
pub const DEPENDENCY_NAMESPACES: [&str; 3] = ["abstractions/", "tunables/", "abi/"];

lazy_static! {
    static ref INCLUDE: Regex =
        Regex::new(r#"^\s*#?include\s+(?:if\s+exists\s+)?[<"]([^>"]+)[>"]"#).unwrap();
    static ref ABI: Regex = Regex::new(r#"^\s*abi\s+[<"]([^>"]+)[>"]"#).unwrap();
}

/// Distinct dependency paths, iterated in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencySet {
    paths: BTreeSet<String>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `path` if it lies in a dependency namespace.
    pub fn insert(&mut self, path: &str) -> bool {
        let path = path.trim();
        if !DEPENDENCY_NAMESPACES.iter().any(|ns| path.starts_with(ns)) || path.contains("..") {
            return false;
        }
        self.paths.insert(path.to_string())
    }

    pub fn extend(&mut self, other: DependencySet) {
        self.paths.extend(other.paths);
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Collect `include`/`abi` references of `text`.
pub fn scan_dependencies(text: &str) -> DependencySet {
    let mut deps = DependencySet::new();
    for line in text.lines() {
        if let Some(caps) = INCLUDE.captures(line).or_else(|| ABI.captures(line)) {
            if let Some(path) = caps.get(1) {
                deps.insert(path.as_str());
            }
        }
    }
    deps
}

/// Outcome of copying dependencies.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyReport {
    /// Relative dependency file and what happened to it
    pub copied: Vec<(PathBuf, WriteOutcome)>,
    /// Referenced but absent from the source tree
    pub missing: Vec<String>,
    pub failures: Vec<FileFailure>,
}

/// Copy every dependency from `source_root` to `dest_root`.
///
/// The full closure is resolved first, following dependencies of dependencies
/// and expanding directory dependencies, so every file is written at most
/// once and in lexicographic order. Paths in `already_written` are skipped.
pub fn copy_dependencies(
    deps: &DependencySet,
    source_root: &Path,
    dest_root: &Path,
    writer: &SafeWriter,
    already_written: &BTreeSet<PathBuf>,
) -> DependencyReport {
    let mut report = DependencyReport::default();
    let files = resolve_closure(deps, source_root, already_written, &mut report);

    for (relative, content) in files {
        let target = dest_root.join(&relative);
        match writer.write(&target, &relative, &content) {
            Ok(outcome) => report.copied.push((relative, outcome)),
            Err(e) => report.failures.push(FileFailure::new(&target, &e)),
        }
    }

    report
}

/// Every file reachable from `deps`, with its content, keyed by relative path.
fn resolve_closure(
    deps: &DependencySet,
    source_root: &Path,
    already_written: &BTreeSet<PathBuf>,
    report: &mut DependencyReport,
) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut handled: BTreeSet<PathBuf> = BTreeSet::new();
    let mut pending: BTreeSet<String> = deps.iter().map(str::to_string).collect();
    let mut seen: BTreeSet<String> = pending.clone();

    while let Some(dep) = pending.pop_first() {
        let source = source_root.join(&dep);
        let expanded = if source.is_dir() {
            dependency_dir_files(source_root, &source)
        } else if source.is_file() {
            vec![PathBuf::from(&dep)]
        } else {
            warn!(dependency = %dep, "dependency missing from source tree");
            report.missing.push(dep);
            continue;
        };

        for relative in expanded {
            if !handled.insert(relative.clone()) {
                continue;
            }
            if already_written.contains(&relative) {
                debug!(path = %relative.display(), "already imported");
                continue;
            }

            let source = source_root.join(&relative);
            let content = match fs::read(&source) {
                Ok(content) => content,
                Err(e) => {
                    report.failures.push(FileFailure::new(&source, &e));
                    continue;
                }
            };

            for nested in scan_dependencies(&String::from_utf8_lossy(&content)).iter() {
                if seen.insert(nested.to_string()) {
                    pending.insert(nested.to_string());
                }
            }
            files.insert(relative, content);
        }
    }

    files
}

/// Regular files below a directory dependency, relative to `source_root`.
fn dependency_dir_files(source_root: &Path, dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(source_root).ok().map(Path::to_path_buf))
        .collect()
}
