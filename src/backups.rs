use crate::paths::VirtualPath;
use sha1::{Digest, Sha1};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_for(&self, path: &VirtualPath) -> PathBuf {
        let digest = Sha1::digest(path.as_key().as_bytes());
        let mut name = String::with_capacity(40);
        for byte in digest {
            name.push_str(&format!("{byte:02x}"));
        }
        self.root.join(name)
    }

    pub fn contains(&self, path: &VirtualPath) -> bool {
        self.file_for(path).exists()
    }

    pub fn capture(&self, path: &VirtualPath, source: &Path) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let target = self.file_for(path);
        let tmp = target.with_extension("tmp");
        fs::copy(source, &tmp)?;
        if target.exists() {
            let _ = fs::remove_file(&target);
        }
        fs::rename(&tmp, &target)?;
        debug!(path = %path, backup = %target.display(), "original bytes captured");
        Ok(())
    }

    pub fn restore(&self, path: &VirtualPath, dest: &Path) -> io::Result<()> {
        let source = self.file_for(path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, dest)?;
        debug!(path = %path, dest = %dest.display(), "original bytes restored");
        Ok(())
    }

    pub fn discard(&self, path: &VirtualPath) -> io::Result<()> {
        let target = self.file_for(path);
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        match fs::read_dir(&self.root) {
            Ok(mut entries) => Ok(entries.next().is_none()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn capture_restore_discard_cycle() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("backups"));
        let game_file = dir.path().join("skyrim.ini");
        fs::write(&game_file, b"original").unwrap();

        let vpath = VirtualPath::new("Skyrim.ini");
        store.capture(&vpath, &game_file).unwrap();
        assert!(store.contains(&vpath));

        fs::write(&game_file, b"modded").unwrap();
        store.restore(&vpath, &game_file).unwrap();
        assert_eq!(fs::read(&game_file).unwrap(), b"original");

        store.discard(&vpath).unwrap();
        assert!(!store.contains(&vpath));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn backup_name_is_stable_across_case() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        let a = store.file_for(&VirtualPath::new("Data/Textures/X.dds"));
        let b = store.file_for(&VirtualPath::new("data\\textures\\x.dds"));
        assert_eq!(a, b);
        assert_eq!(a.file_name().unwrap().to_string_lossy().len(), 40);
    }

    #[test]
    fn discard_missing_backup_is_noop() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path());
        store.discard(&VirtualPath::new("never/captured.dds")).unwrap();
    }
}
