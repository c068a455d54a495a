//! aa-config: configuration for the importer and the dedupe pass
//!
//! Resolution order, later wins:
//!
//! 1. built-in defaults
//! 2. `--config <path>` or `<config_dir>/aa-tools/config.yaml`
//! 3. environment (`AA_SOURCE_REPO`, `AA_DEST_ROOT`, `AA_BACKUP_ROOT`)
//! 4. command-line flags (applied by the binary)

use std::path::{Path, PathBuf};

use aa_core::Mode;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ENV_SOURCE_REPO: &str = "AA_SOURCE_REPO";
pub const ENV_DEST_ROOT: &str = "AA_DEST_ROOT";
pub const ENV_BACKUP_ROOT: &str = "AA_BACKUP_ROOT";

/// Result type for aa-config operations
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AaConfig {
    pub import: ImportSettings,
    pub dedupe: DedupeSettings,
    pub backup: BackupSettings,
}

/// Profile importer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Git URL or local directory of the upstream tree
    pub source_repo: String,
    /// Branch to clone; remote default when unset
    pub branch: Option<String>,
    /// Directory inside the fetched tree holding the profiles
    pub source_subdir: PathBuf,
    pub dest_root: PathBuf,
    pub keywords: Vec<String>,
    /// Base names never imported
    pub exclude: Vec<String>,
    pub mode: Mode,
    pub abstractions_only: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            source_repo: "https://gitlab.com/apparmor/apparmor.git".to_string(),
            branch: None,
            source_subdir: PathBuf::from("profiles/apparmor.d"),
            dest_root: PathBuf::from("/etc/apparmor.d"),
            keywords: Vec::new(),
            exclude: vec!["README".to_string()],
            mode: Mode::Enforce,
            abstractions_only: false,
        }
    }
}

/// Duplicate-rule merger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeSettings {
    pub target_dir: PathBuf,
}

impl Default for DedupeSettings {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("/etc/apparmor.d"),
        }
    }
}

/// Where replaced files are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub root: PathBuf,
    pub suffix: String,
}

impl Default for BackupSettings {
    fn default() -> Self {
        let root = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/var/backups"))
            .join("aa-tools")
            .join("backups");
        Self {
            root,
            suffix: ".bak".to_string(),
        }
    }
}

impl AaConfig {
    /// Default config location (~/.config/aa-tools/config.yaml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("aa-tools").join("config.yaml"))
    }

    /// Load from an explicit path, or the default location if it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(repo) = get(ENV_SOURCE_REPO) {
            debug!(%repo, "source repo from environment");
            self.import.source_repo = repo;
        }
        if let Some(dest) = get(ENV_DEST_ROOT) {
            debug!(%dest, "destination root from environment");
            self.import.dest_root = PathBuf::from(dest);
        }
        if let Some(root) = get(ENV_BACKUP_ROOT) {
            self.backup.root = PathBuf::from(root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AaConfig::default();
        assert_eq!(config.import.mode, Mode::Enforce);
        assert_eq!(config.import.dest_root, PathBuf::from("/etc/apparmor.d"));
        assert_eq!(config.backup.suffix, ".bak");
        assert!(config.import.exclude.contains(&"README".to_string()));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "import:\n  keywords: [postfix, dovecot]\n  mode: complain\n";
        let config = AaConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.import.keywords, vec!["postfix", "dovecot"]);
        assert_eq!(config.import.mode, Mode::Complain);
        assert_eq!(config.import.source_subdir, PathBuf::from("profiles/apparmor.d"));
        assert_eq!(config.dedupe, DedupeSettings::default());
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(AaConfig::from_yaml("import:\n  mode: kill\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_SOURCE_REPO, "/srv/apparmor"),
            (ENV_DEST_ROOT, "/tmp/dest"),
            (ENV_BACKUP_ROOT, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AaConfig::default();
        let backup_root = config.backup.root.clone();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.import.source_repo, "/srv/apparmor");
        assert_eq!(config.import.dest_root, PathBuf::from("/tmp/dest"));
        assert_eq!(config.backup.root, backup_root);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "dedupe:\n  target_dir: /srv/policy\nbackup:\n  suffix: .orig\n",
        )
        .unwrap();

        let config = AaConfig::load(Some(&path)).unwrap();
        assert_eq!(config.dedupe.target_dir, PathBuf::from("/srv/policy"));
        assert_eq!(config.backup.suffix, ".orig");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempdir().unwrap();
        let err = AaConfig::load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
