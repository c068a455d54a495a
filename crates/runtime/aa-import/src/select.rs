//! Which upstream files get imported.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

lazy_static! {
    /// References to abstraction or abi files.
    static ref ABSTRACTION_REFERENCES: Vec<Regex> = vec![
        Regex::new(
            r"^\s*#?include\s+(?:if\s+exists\s+)?[<\x22](abstractions/[^>\x22]+)[>\x22]"
        )
        .unwrap(),
        Regex::new(r"^\s*abi\s+[<\x22](abi/[^>\x22]+)[>\x22]").unwrap(),
    ];
}

/// Selection rules for one import run.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    keywords: Vec<String>,
    exclude: BTreeSet<String>,
    abstractions_only: bool,
}

impl Selector {
    pub fn new<K, E>(keywords: K, exclude: E, abstractions_only: bool) -> Self
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            exclude: exclude.into_iter().map(|e| e.as_ref().to_string()).collect(),
            abstractions_only,
        }
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        relative
            .file_name()
            .map(|n| self.exclude.contains(&*n.to_string_lossy()))
            .unwrap_or(false)
    }

    fn in_abstraction_namespace(relative: &Path) -> bool {
        relative.components().any(|c| match c {
            Component::Normal(seg) => seg == "abstractions" || seg == "abi",
            _ => false,
        })
    }

    fn path_matches_keyword(&self, relative: &Path) -> bool {
        let lowered = relative.to_string_lossy().to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    /// True if `content` references an abstraction named after a keyword.
    pub fn references_keyword_abstraction(&self, content: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        content.lines().any(|line| {
            ABSTRACTION_REFERENCES.iter().any(|re| {
                re.captures(line)
                    .and_then(|caps| caps.get(1))
                    .map(|m| {
                        let target = m.as_str().to_lowercase();
                        self.keywords.iter().any(|k| target.contains(k.as_str()))
                    })
                    .unwrap_or(false)
            })
        })
    }

    /// Decide for one file. `content` is only consulted when the path alone
    /// does not decide.
    pub fn is_selected<F>(&self, relative: &Path, content: F) -> bool
    where
        F: FnOnce() -> Option<String>,
    {
        if self.is_excluded(relative) {
            return false;
        }
        if self.abstractions_only && Self::in_abstraction_namespace(relative) {
            return true;
        }
        if self.path_matches_keyword(relative) {
            return true;
        }
        content()
            .map(|text| self.references_keyword_abstraction(&text))
            .unwrap_or(false)
    }

    /// Selected files under `root`, relative to it, in lexicographic order.
    pub fn select(&self, root: &Path) -> Vec<PathBuf> {
        let mut selected = Vec::new();

        let entries = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };

            let picked = self.is_selected(relative, || match std::fs::read_to_string(entry.path()) {
                Ok(text) => Some(text),
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "content not readable");
                    None
                }
            });
            if picked {
                selected.push(relative.to_path_buf());
            }
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn none() -> Option<String> {
        None
    }

    #[test]
    fn test_keyword_in_path() {
        let selector = Selector::new(["postfix"], Vec::<String>::new(), false);
        assert!(selector.is_selected(Path::new("usr.sbin.postfix"), none));
        assert!(selector.is_selected(Path::new("postfix/smtpd"), none));
        assert!(!selector.is_selected(Path::new("usr.sbin.nginx"), none));
    }

    #[test]
    fn test_keyword_case_insensitive() {
        let selector = Selector::new(["PostFix"], Vec::<String>::new(), false);
        assert!(selector.is_selected(Path::new("usr.lib.POSTFIX.master"), none));
    }

    #[test]
    fn test_content_reference() {
        let selector = Selector::new(["postfix"], Vec::<String>::new(), false);
        let with_ref =
            || Some("profile nginx {\n  include <abstractions/postfix-common>\n}\n".to_string());
        let without_ref =
            || Some("profile nginx {\n  include <abstractions/base>\n}\n".to_string());
        assert!(selector.is_selected(Path::new("usr.sbin.nginx"), with_ref));
        assert!(!selector.is_selected(Path::new("usr.sbin.nginx"), without_ref));
    }

    #[test]
    fn test_abstractions_only() {
        let selector = Selector::new(Vec::<String>::new(), Vec::<String>::new(), true);
        assert!(selector.is_selected(Path::new("abstractions/base"), none));
        assert!(selector.is_selected(Path::new("abi/3.0"), none));
        assert!(!selector.is_selected(Path::new("tunables/global"), none));
        assert!(!selector.is_selected(Path::new("my-abstractions-notes"), none));
    }

    #[test]
    fn test_exclusion_wins() {
        let selector = Selector::new(["postfix"], ["usr.sbin.postfix"], false);
        assert!(!selector.is_selected(Path::new("usr.sbin.postfix"), none));
        assert!(selector.is_selected(Path::new("usr.lib.postfix.smtp"), none));
    }

    #[test]
    fn test_select_walks_sorted() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("abstractions")).unwrap();
        fs::write(root.join("usr.sbin.postfix"), "").unwrap();
        fs::write(root.join("usr.lib.postfix.master"), "").unwrap();
        fs::write(root.join("usr.sbin.nginx"), "include <abstractions/postfix-common>\n").unwrap();
        fs::write(root.join("usr.sbin.apache2"), "include <abstractions/base>\n").unwrap();
        fs::write(root.join(".git/postfix"), "").unwrap();
        fs::write(root.join("abstractions/postfix-common"), "").unwrap();

        let selector = Selector::new(["postfix"], ["README"], false);
        assert_eq!(
            selector.select(root),
            vec![
                PathBuf::from("abstractions/postfix-common"),
                PathBuf::from("usr.lib.postfix.master"),
                PathBuf::from("usr.sbin.nginx"),
                PathBuf::from("usr.sbin.postfix"),
            ]
        );
    }
}
