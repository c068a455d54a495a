//! Obtaining the upstream source tree.

use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use git2::FetchOptions;
use tempfile::TempDir;
use tracing::info;

use crate::{ImportError, Result};

/// A source tree ready to read. A temporary clone is deleted on drop.
#[derive(Debug)]
pub struct FetchedTree {
    root: PathBuf,
    _guard: Option<TempDir>,
}

impl FetchedTree {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Provides the upstream tree for an import run.
pub trait SourceFetcher {
    fn fetch(&self) -> Result<FetchedTree>;
}

/// An existing checkout used in place.
#[derive(Debug, Clone)]
pub struct LocalTree {
    path: PathBuf,
}

impl LocalTree {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceFetcher for LocalTree {
    fn fetch(&self) -> Result<FetchedTree> {
        if !self.path.is_dir() {
            return Err(ImportError::Fetch(format!(
                "{} is not a directory",
                self.path.display()
            )));
        }
        Ok(FetchedTree {
            root: self.path.clone(),
            _guard: None,
        })
    }
}

/// Shallow git clone into a temporary directory.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    url: String,
    branch: Option<String>,
}

impl GitFetcher {
    pub fn new(url: impl Into<String>, branch: Option<String>) -> Self {
        Self {
            url: url.into(),
            branch,
        }
    }
}

impl SourceFetcher for GitFetcher {
    fn fetch(&self) -> Result<FetchedTree> {
        let temp = tempfile::Builder::new()
            .prefix("aa-import-")
            .tempdir()
            .map_err(|e| ImportError::Fetch(format!("cannot create clone directory: {}", e)))?;
        let root = temp.path().join("source");

        info!(url = %self.url, "cloning source tree");

        let mut fetch_options = FetchOptions::new();
        fetch_options.depth(1);
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options);
        if let Some(branch) = &self.branch {
            builder.branch(branch);
        }
        builder.clone(&self.url, &root)?;

        Ok(FetchedTree {
            root,
            _guard: Some(temp),
        })
    }
}

/// Local directory if `location` is one, git clone otherwise.
pub fn fetcher_for(location: &str, branch: Option<String>) -> Box<dyn SourceFetcher> {
    let path = Path::new(location);
    if path.is_dir() {
        Box::new(LocalTree::new(path))
    } else {
        Box::new(GitFetcher::new(location, branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_tree_in_place() {
        let dir = tempdir().unwrap();
        let tree = fetcher_for(dir.path().to_str().unwrap(), None).fetch().unwrap();
        assert_eq!(tree.root(), dir.path());
    }

    #[test]
    fn test_local_tree_missing_is_fetch_error() {
        let dir = tempdir().unwrap();
        let err = LocalTree::new(dir.path().join("missing")).fetch().unwrap_err();
        assert!(matches!(err, ImportError::Fetch(_)));
    }

    #[test]
    fn test_failed_clone_is_git_error() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("not-a-repo");
        let err = GitFetcher::new(bogus.to_string_lossy(), None).fetch().unwrap_err();
        assert!(matches!(err, ImportError::Git(_)));
    }
}
