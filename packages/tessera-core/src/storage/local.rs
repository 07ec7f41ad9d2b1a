/// Local filesystem storage backend.
///
/// Serves a vault directory with:
/// - vault-relative locators (`..` segments are rejected); names on disk are
///   matched by their composed Unicode form, so a decomposed (NFD) file name
///   is read and written under its NFC locator
/// - atomic writes (write to .tmp, fsync, rename, fsync directory)
/// - refusal to overwrite a non-empty file with empty content
/// - self-write fingerprints so the watcher does not echo our own writes
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use unicode_normalization::UnicodeNormalization;

use super::{DocumentStorage, StorageError};
use crate::locator::Locator;
use crate::watcher::self_write::SelfWriteTracker;
use crate::watcher::types::StorageEvent;

/// Suffix of in-flight atomic write files. Never listed, never reported.
pub const TEMP_SUFFIX: &str = ".tessera.tmp";

pub struct LocalStorage {
    root: PathBuf,
    self_write_tracker: Arc<Mutex<SelfWriteTracker>>,
    event_tx: broadcast::Sender<StorageEvent>,
}

impl LocalStorage {
    /// Open a vault directory.
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        let root = fs::canonicalize(root)?;
        if !root.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            )));
        }
        let (event_tx, _) = broadcast::channel(256);
        Ok(Self {
            root,
            self_write_tracker: Arc::new(Mutex::new(SelfWriteTracker::new())),
            event_tx,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a locator. Rejects locators that climb out of the root.
    /// Each segment resolves to the existing entry whose composed name matches
    /// it; segments with no such entry are joined as written.
    pub fn path_for(&self, locator: &Locator) -> Result<PathBuf, StorageError> {
        if locator.is_empty() || locator.as_str().split('/').any(|s| s == "..") {
            return Err(StorageError::OutsideRoot(locator.to_string()));
        }
        let mut path = self.root.clone();
        for segment in locator.as_str().split('/') {
            path = resolve_segment(&path, segment);
        }
        Ok(path)
    }

    /// Locator for an absolute path under the root.
    pub fn locator_for(&self, path: &Path) -> Option<Locator> {
        locator_under(&self.root, path)
    }

    /// Start watching the vault. Events arrive on `subscribe()` receivers.
    #[cfg(feature = "file-watcher")]
    pub fn watch(&self) -> Result<crate::watcher::file_watcher::FileWatcher, notify::Error> {
        crate::watcher::file_watcher::FileWatcher::new(
            &self.root,
            self.event_tx.clone(),
            self.self_write_tracker.clone(),
        )
    }

    /// Check if a change at `locator` is one of our own writes. A match is
    /// consumed.
    pub fn check_self_write(&self, locator: &Locator) -> bool {
        let Ok(path) = self.path_for(locator) else {
            return false;
        };
        match fs::read_to_string(path) {
            Ok(content) => self
                .self_write_tracker
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .consume(locator, &content),
            Err(_) => false,
        }
    }

    /// Run periodic cleanup of expired fingerprints.
    pub fn cleanup_expired_fingerprints(&self) {
        self.self_write_tracker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cleanup_expired();
    }

    fn collect(&self, dir: &Path, out: &mut Vec<Locator>) -> Result<(), StorageError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.collect(&path, out)?;
            } else if file_type.is_file() {
                if let Some(locator) = self.locator_for(&path) {
                    out.push(locator);
                }
            }
        }
        Ok(())
    }

    /// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
    /// Refuses to write empty content over a non-empty file.
    fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        if content.trim().is_empty() {
            if let Ok(existing) = fs::read_to_string(path) {
                if !existing.trim().is_empty() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "Refusing to overwrite non-empty file with empty content",
                    ));
                }
            }
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(TEMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    }
}

/// Locator for `path` relative to `root`, if it lies under it. File names
/// are taken literally, never URL-decoded.
pub(crate) fn locator_under(root: &Path, path: &Path) -> Option<Locator> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let locator = Locator::from_storage(&segments.join("/"));
    (!locator.is_empty()).then_some(locator)
}

fn resolve_segment(dir: &Path, segment: &str) -> PathBuf {
    let direct = dir.join(segment);
    if direct.symlink_metadata().is_ok() {
        return direct;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return direct;
    };
    entries
        .flatten()
        .find(|entry| entry.file_name().to_string_lossy().nfc().eq(segment.chars()))
        .map_or(direct, |entry| entry.path())
}

impl DocumentStorage for LocalStorage {
    fn read(&self, locator: &Locator) -> Result<String, StorageError> {
        let path = self.path_for(locator)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(locator.clone()),
            _ => StorageError::Io(e),
        })
    }

    fn write(&self, locator: &Locator, content: &str) -> Result<(), StorageError> {
        let path = self.path_for(locator)?;

        self.self_write_tracker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .register(locator, content);

        if let Err(e) = Self::atomic_write(&path, content) {
            log::warn!("[tessera.storage.write] Write to {} failed: {}", locator, e);
            self.self_write_tracker
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .forget(locator, content);
            return Err(match e.kind() {
                std::io::ErrorKind::InvalidInput => StorageError::WriteRejected {
                    locator: locator.clone(),
                    reason: e.to_string(),
                },
                _ => StorageError::Io(e),
            });
        }
        Ok(())
    }

    fn exists(&self, locator: &Locator) -> bool {
        self.path_for(locator).is_ok_and(|path| path.is_file())
    }

    fn list(&self) -> Result<Vec<Locator>, StorageError> {
        let mut out = Vec::new();
        self.collect(&self.root, &mut out)?;
        out.sort();
        Ok(out)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("notes/sub")).unwrap();
        fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join("home.dashboard"), "{}").unwrap();
        fs::write(dir.path().join("notes/a.md"), "# A").unwrap();
        fs::write(dir.path().join("notes/sub/b.md"), "# B").unwrap();
        fs::write(dir.path().join(".hidden/c.md"), "# C").unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_list_skips_hidden() {
        let (_dir, storage) = vault();
        let listed = storage.list().unwrap();
        assert_eq!(
            listed,
            vec![
                Locator::new("home.dashboard"),
                Locator::new("notes/a.md"),
                Locator::new("notes/sub/b.md"),
            ]
        );
        assert_eq!(
            storage.list_documents().unwrap(),
            vec![Locator::new("home.dashboard")]
        );
    }

    #[test]
    fn test_read_and_write() {
        let (dir, storage) = vault();
        let loc = Locator::new("boards/new.dashboard");
        storage.write(&loc, "{\"cells\": []}").unwrap();

        assert_eq!(storage.read(&loc).unwrap(), "{\"cells\": []}");
        assert!(dir.path().join("boards/new.dashboard").exists());
        assert!(!dir.path().join("boards/new.dashboard.tessera.tmp").exists());
        assert!(storage.exists(&loc));
        assert!(!storage.exists(&Locator::new("boards")));
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_dir, storage) = vault();
        assert!(matches!(
            storage.read(&Locator::new("nope.md")),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_refuses_empty_over_non_empty() {
        let (_dir, storage) = vault();
        let loc = Locator::new("notes/a.md");
        assert!(matches!(
            storage.write(&loc, "  \n"),
            Err(StorageError::WriteRejected { .. })
        ));
        assert_eq!(storage.read(&loc).unwrap(), "# A");
    }

    #[test]
    fn test_rejects_parent_segments() {
        let (_dir, storage) = vault();
        assert!(matches!(
            storage.path_for(&Locator::new("../escape.md")),
            Err(StorageError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_self_write_detection() {
        let (dir, storage) = vault();
        let loc = Locator::new("home.dashboard");
        storage.write(&loc, "{\"version\": 1}").unwrap();
        assert!(storage.check_self_write(&loc));
        assert!(!storage.check_self_write(&loc));

        fs::write(dir.path().join("home.dashboard"), "{\"version\": 2}").unwrap();
        assert!(!storage.check_self_write(&loc));
    }

    #[test]
    fn test_failed_write_leaves_no_fingerprint() {
        let (dir, storage) = vault();
        let loc = Locator::new("notes/a.md");
        assert!(storage.write(&loc, "").is_err());

        // An external write of the same text is not mistaken for ours.
        fs::write(dir.path().join("notes/a.md"), "").unwrap();
        assert!(!storage.check_self_write(&loc));
    }

    #[test]
    fn test_percent_named_file_is_literal() {
        let (dir, storage) = vault();
        fs::write(dir.path().join("Q3%20plan.dashboard"), "{}").unwrap();

        let loc = Locator::from_storage("Q3%20plan.dashboard");
        assert!(storage.list_documents().unwrap().contains(&loc));
        assert_eq!(storage.read(&loc).unwrap(), "{}");
        assert!(matches!(
            storage.read(&Locator::new("Q3%20plan.dashboard")),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_decomposed_name_resolves() {
        let (dir, storage) = vault();
        let nfd = "cafe\u{301}.dashboard";
        fs::write(dir.path().join(nfd), "{}").unwrap();

        let loc = Locator::new("caf\u{e9}.dashboard");
        assert!(storage.list_documents().unwrap().contains(&loc));
        assert_eq!(storage.read(&loc).unwrap(), "{}");
        assert!(storage.exists(&loc));

        storage.write(&loc, "{\"cells\": []}").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(nfd)).unwrap(),
            "{\"cells\": []}"
        );
    }

    #[test]
    fn test_locator_for_path() {
        let (_dir, storage) = vault();
        let path = storage.root().join("notes/a.md");
        assert_eq!(storage.locator_for(&path), Some(Locator::new("notes/a.md")));
        assert_eq!(storage.locator_for(Path::new("/elsewhere/a.md")), None);
    }
}
