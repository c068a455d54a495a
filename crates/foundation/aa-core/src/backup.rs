//! Backup-aware writes.
//!
//! Every overwrite copies the previous content under the backup root first.
//! Dry runs only report what would change.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::{Error, Result};

/// Location and naming of backup copies.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
    suffix: String,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
        }
    }

    /// Store rooted at `<base>/<YYYYmmdd-HHMMSS>`.
    pub fn timestamped(base: impl AsRef<Path>, suffix: impl Into<String>) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self::new(base.as_ref().join(stamp), suffix)
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `<root>/<relative><suffix>`
    pub fn backup_path(&self, relative: &Path) -> PathBuf {
        let relative: PathBuf = relative
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect();
        let mut name: OsString = relative
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(&self.suffix);
        self.root.join(relative.with_file_name(name))
    }

    /// Copy `source` to its backup location and return that location.
    pub fn backup(&self, source: &Path, relative: &Path) -> Result<PathBuf> {
        let target = self.backup_path(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::copy(source, &target).map_err(|e| Error::io(source, e))?;
        debug!(source = %source.display(), backup = %target.display(), "backed up");
        Ok(target)
    }
}

/// What happened to one target file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Content already matched
    Unchanged,
    /// Dry run: content would change
    Planned,
    Created,
    Updated { backup: PathBuf },
}

impl WriteOutcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, WriteOutcome::Unchanged)
    }
}

/// Writes files, backing up what it replaces.
#[derive(Debug, Clone)]
pub struct SafeWriter {
    backups: BackupStore,
    dry_run: bool,
}

impl SafeWriter {
    pub fn new(backups: BackupStore, dry_run: bool) -> Self {
        Self { backups, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Write `content` to `target`; `relative` names the backup copy.
    pub fn write(&self, target: &Path, relative: &Path, content: &[u8]) -> Result<WriteOutcome> {
        let existing = match fs::read(target) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::io(target, e)),
        };

        if existing.as_deref() == Some(content) {
            return Ok(WriteOutcome::Unchanged);
        }
        if self.dry_run {
            return Ok(WriteOutcome::Planned);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let outcome = match existing {
            Some(_) => WriteOutcome::Updated {
                backup: self.backups.backup(target, relative)?,
            },
            None => WriteOutcome::Created,
        };

        // Write to temp file first, then rename
        let mut temp_name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        temp_name.push(TEMP_SUFFIX);
        let temp_path = target.with_file_name(temp_name);
        if let Err(e) = replace_via_temp(&temp_path, target, content, existing.is_some()) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        info!(path = %target.display(), "wrote");
        Ok(outcome)
    }
}

/// Suffix of the in-flight file next to a target being replaced.
pub const TEMP_SUFFIX: &str = ".aa-tmp";

/// Write `temp`, carry over the permissions of an existing `target`, rename.
fn replace_via_temp(temp: &Path, target: &Path, content: &[u8], existed: bool) -> Result<()> {
    fs::write(temp, content).map_err(|e| Error::io(temp, e))?;
    if existed {
        let permissions = fs::metadata(target)
            .map_err(|e| Error::io(target, e))?
            .permissions();
        fs::set_permissions(temp, permissions).map_err(|e| Error::io(temp, e))?;
    }
    fs::rename(temp, target).map_err(|e| Error::io(target, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_backup_path_appends_suffix() {
        let store = BackupStore::new("/var/backups/aa", ".bak");
        assert_eq!(
            store.backup_path(Path::new("abstractions/base")),
            PathBuf::from("/var/backups/aa/abstractions/base.bak")
        );
        assert_eq!(
            store.backup_path(Path::new("/etc/apparmor.d/usr.bin.foo")),
            PathBuf::from("/var/backups/aa/etc/apparmor.d/usr.bin.foo.bak")
        );
    }

    #[test]
    fn test_dry_run_never_writes() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("tree/usr.bin.foo");
        let writer = SafeWriter::new(BackupStore::new(dir.path().join("bk"), ".bak"), true);

        let outcome = writer.write(&target, Path::new("usr.bin.foo"), b"new\n").unwrap();
        assert_eq!(outcome, WriteOutcome::Planned);
        assert!(!target.exists());
        assert!(!dir.path().join("bk").exists());
    }

    #[test]
    fn test_apply_backs_up_before_overwrite() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("usr.bin.foo");
        fs::write(&target, "old\n").unwrap();
        let writer = SafeWriter::new(BackupStore::new(dir.path().join("bk"), ".orig"), false);

        let outcome = writer.write(&target, Path::new("usr.bin.foo"), b"new\n").unwrap();
        let WriteOutcome::Updated { backup } = outcome else {
            panic!("expected update, got {outcome:?}");
        };
        assert_eq!(backup, dir.path().join("bk/usr.bin.foo.orig"));
        assert_eq!(fs::read_to_string(&backup).unwrap(), "old\n");
        assert_eq!(fs::read_to_string(&target).unwrap(), "new\n");
    }

    #[test]
    fn test_unchanged_and_created() {
        let dir = tempdir().unwrap();
        let writer = SafeWriter::new(BackupStore::new(dir.path().join("bk"), ".bak"), false);

        let target = dir.path().join("nested/dir/file");
        let outcome = writer.write(&target, Path::new("nested/dir/file"), b"x").unwrap();
        assert_eq!(outcome, WriteOutcome::Created);

        let outcome = writer.write(&target, Path::new("nested/dir/file"), b"x").unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert!(!outcome.is_change());
    }

    #[cfg(unix)]
    #[test]
    fn test_overwrite_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let target = dir.path().join("usr.bin.foo");
        fs::write(&target, "old\n").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o640)).unwrap();
        let writer = SafeWriter::new(BackupStore::new(dir.path().join("bk"), ".bak"), false);

        writer.write(&target, Path::new("usr.bin.foo"), b"new\n").unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        assert!(!dir.path().join("usr.bin.foo.aa-tmp").exists());
    }
}
