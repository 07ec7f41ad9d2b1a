/// Vault watcher using notify-debouncer-full.
///
/// Watches the vault root recursively and translates filesystem events into
/// `StorageEvent`s on the storage's broadcast channel. The debouncer stitches
/// rename halves together; our own atomic writes (tmp file renamed over the
/// target) surface as a single Modified that is dropped when its content
/// matches a pending self-write fingerprint.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use tokio::sync::broadcast;

use super::self_write::SelfWriteTracker;
use super::types::StorageEvent;
use crate::locator::Locator;
use crate::storage::local::{locator_under, TEMP_SUFFIX};

const DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

/// Keeps the debouncer alive; dropping it stops watching.
pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, RecommendedCache>,
    root: PathBuf,
}

impl FileWatcher {
    pub fn new(
        root: &Path,
        event_tx: broadcast::Sender<StorageEvent>,
        self_writes: Arc<Mutex<SelfWriteTracker>>,
    ) -> Result<Self, notify::Error> {
        let root = root.to_path_buf();
        let handler_root = root.clone();

        let mut debouncer = new_debouncer(
            DEBOUNCE_DURATION,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        for change in translate(&event.kind, &event.paths, &handler_root, &self_writes) {
                            if let Err(e) = event_tx.send(change) {
                                log::debug!("[tessera.watcher.send] No receivers: {}", e);
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        log::error!("[tessera.watcher.error] Watch error: {}", e);
                    }
                }
            },
        )?;

        debouncer.watch(&root, RecursiveMode::Recursive)?;
        log::info!("[tessera.watcher.vault] Watching {:?}", root);

        Ok(Self {
            _debouncer: debouncer,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_temp(path: &Path) -> bool {
    path.to_string_lossy().ends_with(TEMP_SUFFIX)
}

fn is_hidden(locator: &Locator) -> bool {
    locator.as_str().split('/').any(|segment| segment.starts_with('.'))
}

/// Vault locator for a watched path, skipping temp files and hidden entries.
fn visible_locator(root: &Path, path: &Path) -> Option<Locator> {
    if is_temp(path) {
        return None;
    }
    locator_under(root, path).filter(|locator| !is_hidden(locator))
}

/// A content change, unless it is the echo of one of our own writes.
fn external_modification(
    root: &Path,
    path: &Path,
    self_writes: &Mutex<SelfWriteTracker>,
) -> Option<StorageEvent> {
    let locator = visible_locator(root, path)?;
    if let Ok(content) = std::fs::read_to_string(path) {
        let mut tracker = self_writes.lock().unwrap_or_else(|e| e.into_inner());
        if tracker.consume(&locator, &content) {
            log::debug!("[tessera.watcher.self_write] Suppressed own write to {}", locator);
            return None;
        }
    }
    Some(StorageEvent::Modified { locator })
}

/// Translate one debounced filesystem event into storage events.
pub(crate) fn translate(
    kind: &EventKind,
    paths: &[PathBuf],
    root: &Path,
    self_writes: &Mutex<SelfWriteTracker>,
) -> Vec<StorageEvent> {
    match kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            let (from, to) = (&paths[0], &paths[1]);
            if is_temp(from) {
                // Atomic write landing on its target.
                return external_modification(root, to, self_writes)
                    .into_iter()
                    .collect();
            }
            match (visible_locator(root, from), visible_locator(root, to)) {
                (Some(from), Some(to)) => vec![StorageEvent::Renamed { from, to }],
                (Some(locator), None) => vec![StorageEvent::Deleted { locator }],
                (None, Some(locator)) => vec![StorageEvent::Created { locator }],
                (None, None) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
            .iter()
            .filter_map(|p| visible_locator(root, p))
            .map(|locator| StorageEvent::Deleted { locator })
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths
            .iter()
            .filter_map(|p| visible_locator(root, p))
            .map(|locator| StorageEvent::Created { locator })
            .collect(),
        // FSEvents reports each half of a rename separately without a mode.
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .filter_map(|p| {
                visible_locator(root, p).map(|locator| {
                    if p.exists() {
                        StorageEvent::Created { locator }
                    } else {
                        StorageEvent::Deleted { locator }
                    }
                })
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        // A content change for a path that is already gone is a delete.
        EventKind::Modify(_) => paths
            .iter()
            .filter_map(|p| {
                if p.is_file() {
                    external_modification(root, p, self_writes)
                } else if !p.exists() {
                    visible_locator(root, p).map(|locator| StorageEvent::Deleted { locator })
                } else {
                    None
                }
            })
            .collect(),
        EventKind::Create(_) => paths
            .iter()
            .filter_map(|p| visible_locator(root, p))
            .map(|locator| StorageEvent::Created { locator })
            .collect(),
        EventKind::Remove(_) => paths
            .iter()
            .filter_map(|p| visible_locator(root, p))
            .map(|locator| StorageEvent::Deleted { locator })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, Mutex<SelfWriteTracker>) {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        (dir, root, Mutex::new(SelfWriteTracker::new()))
    }

    #[test]
    fn test_rename_both() {
        let (_dir, root, writes) = setup();
        let events = translate(
            &EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[root.join("a.md"), root.join("notes/b.md")],
            &root,
            &writes,
        );
        assert_eq!(
            events,
            vec![StorageEvent::Renamed {
                from: Locator::new("a.md"),
                to: Locator::new("notes/b.md"),
            }]
        );
    }

    #[test]
    fn test_atomic_write_becomes_modified() {
        let (_dir, root, writes) = setup();
        let target = root.join("home.dashboard");
        std::fs::write(&target, "{\"version\": 1}").unwrap();
        let mut tmp = target.clone().into_os_string();
        tmp.push(TEMP_SUFFIX);

        let events = translate(
            &EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[PathBuf::from(tmp), target.clone()],
            &root,
            &writes,
        );
        assert_eq!(
            events,
            vec![StorageEvent::Modified {
                locator: Locator::new("home.dashboard")
            }]
        );
    }

    #[test]
    fn test_own_write_suppressed() {
        let (_dir, root, writes) = setup();
        let target = root.join("a.md");
        std::fs::write(&target, "ours").unwrap();
        writes
            .lock()
            .unwrap()
            .register(&Locator::new("a.md"), "ours");

        let kind = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        assert!(translate(&kind, &[target.clone()], &root, &writes).is_empty());
        // Fingerprint consumed: the next identical change is external.
        assert_eq!(translate(&kind, &[target], &root, &writes).len(), 1);
    }

    #[test]
    fn test_modify_of_vanished_file_is_delete() {
        let (_dir, root, writes) = setup();
        let kind = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        assert_eq!(
            translate(&kind, &[root.join("gone.md")], &root, &writes),
            vec![StorageEvent::Deleted {
                locator: Locator::new("gone.md")
            }]
        );
    }

    #[test]
    fn test_percent_named_path_is_literal() {
        let (_dir, root, writes) = setup();
        let events = translate(
            &EventKind::Create(CreateKind::File),
            &[root.join("Q3%20plan.dashboard")],
            &root,
            &writes,
        );
        assert_eq!(
            events,
            vec![StorageEvent::Created {
                locator: Locator::from_storage("Q3%20plan.dashboard")
            }]
        );
    }

    #[test]
    fn test_create_remove_and_hidden() {
        let (_dir, root, writes) = setup();
        let created = translate(
            &EventKind::Create(CreateKind::File),
            &[root.join("x.md"), root.join(".obsidian/workspace.json")],
            &root,
            &writes,
        );
        assert_eq!(
            created,
            vec![StorageEvent::Created {
                locator: Locator::new("x.md")
            }]
        );

        let removed = translate(
            &EventKind::Remove(RemoveKind::File),
            &[root.join("x.md")],
            &root,
            &writes,
        );
        assert_eq!(
            removed,
            vec![StorageEvent::Deleted {
                locator: Locator::new("x.md")
            }]
        );
    }

    #[test]
    fn test_paths_outside_root_ignored() {
        let (_dir, root, writes) = setup();
        let events = translate(
            &EventKind::Create(CreateKind::File),
            &[PathBuf::from("/definitely/elsewhere.md")],
            &root,
            &writes,
        );
        assert!(events.is_empty());
    }
}
