/// In-process storage backend.
///
/// Holds objects in a sorted map and emits the same lifecycle events a
/// watched directory would. Used by embedders without a filesystem and by
/// tests; `reject_writes` simulates a failing backend for one locator.
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use tokio::sync::broadcast;

use super::{DocumentStorage, StorageError};
use crate::locator::Locator;
use crate::watcher::types::StorageEvent;

pub struct MemoryStorage {
    objects: RwLock<BTreeMap<Locator, String>>,
    rejected: RwLock<HashSet<Locator>>,
    event_tx: broadcast::Sender<StorageEvent>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            rejected: RwLock::new(HashSet::new()),
            event_tx,
        }
    }

    fn emit(&self, event: StorageEvent) {
        // No subscriber is fine: nobody is tracking yet.
        let _ = self.event_tx.send(event);
    }

    /// Current text of an object, if present.
    pub fn get(&self, locator: &Locator) -> Option<String> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(locator)
            .cloned()
    }

    /// Create or replace an object and emit Created/Modified.
    pub fn insert(&self, locator: &Locator, content: &str) {
        let existed = self
            .objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(locator.clone(), content.to_string())
            .is_some();
        let locator = locator.clone();
        self.emit(if existed {
            StorageEvent::Modified { locator }
        } else {
            StorageEvent::Created { locator }
        });
    }

    /// Rename an object, or a folder with everything inside it.
    pub fn rename(&self, from: &Locator, to: &Locator) -> Result<(), StorageError> {
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        let moved: Vec<(Locator, Locator)> = objects
            .keys()
            .filter_map(|key| {
                if key == from {
                    Some((key.clone(), to.clone()))
                } else {
                    key.rebase(from, to).map(|target| (key.clone(), target))
                }
            })
            .collect();
        if moved.is_empty() {
            return Err(StorageError::NotFound(from.clone()));
        }
        for (old, new) in moved {
            if let Some(content) = objects.remove(&old) {
                objects.insert(new, content);
            }
        }
        drop(objects);

        self.emit(StorageEvent::Renamed {
            from: from.clone(),
            to: to.clone(),
        });
        Ok(())
    }

    /// Delete an object and emit Deleted.
    pub fn remove(&self, locator: &Locator) -> Result<(), StorageError> {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(locator)
            .ok_or_else(|| StorageError::NotFound(locator.clone()))?;
        self.emit(StorageEvent::Deleted {
            locator: locator.clone(),
        });
        Ok(())
    }

    /// Make every later write to `locator` fail (or succeed again).
    pub fn reject_writes(&self, locator: &Locator, reject: bool) {
        let mut rejected = self.rejected.write().unwrap_or_else(|e| e.into_inner());
        if reject {
            rejected.insert(locator.clone());
        } else {
            rejected.remove(locator);
        }
    }
}

impl DocumentStorage for MemoryStorage {
    fn read(&self, locator: &Locator) -> Result<String, StorageError> {
        self.get(locator)
            .ok_or_else(|| StorageError::NotFound(locator.clone()))
    }

    fn write(&self, locator: &Locator, content: &str) -> Result<(), StorageError> {
        if self
            .rejected
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(locator)
        {
            return Err(StorageError::WriteRejected {
                locator: locator.clone(),
                reason: "backend refused the write".to_string(),
            });
        }
        self.insert(locator, content);
        Ok(())
    }

    fn exists(&self, locator: &Locator) -> bool {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(locator)
    }

    fn list(&self) -> Result<Vec<Locator>, StorageError> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_read_list() {
        let storage = MemoryStorage::new();
        storage.insert(&Locator::new("a.md"), "hello");
        storage.insert(&Locator::new("home.dashboard"), "{}");

        assert_eq!(storage.read(&Locator::new("a.md")).unwrap(), "hello");
        assert_eq!(storage.list().unwrap().len(), 2);
        assert_eq!(
            storage.list_documents().unwrap(),
            vec![Locator::new("home.dashboard")]
        );
        assert!(matches!(
            storage.read(&Locator::new("missing.md")),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_events_emitted() {
        let storage = MemoryStorage::new();
        let mut rx = storage.subscribe();
        let a = Locator::new("a.md");
        let b = Locator::new("b.md");

        storage.insert(&a, "1");
        storage.insert(&a, "2");
        storage.rename(&a, &b).unwrap();
        storage.remove(&b).unwrap();

        assert_eq!(rx.try_recv().unwrap(), StorageEvent::Created { locator: a.clone() });
        assert_eq!(rx.try_recv().unwrap(), StorageEvent::Modified { locator: a.clone() });
        assert_eq!(
            rx.try_recv().unwrap(),
            StorageEvent::Renamed { from: a, to: b.clone() }
        );
        assert_eq!(rx.try_recv().unwrap(), StorageEvent::Deleted { locator: b });
    }

    #[test]
    fn test_folder_rename_moves_children() {
        let storage = MemoryStorage::new();
        storage.insert(&Locator::new("notes/a.md"), "a");
        storage.insert(&Locator::new("notes/sub/b.md"), "b");
        storage.insert(&Locator::new("notesx/c.md"), "c");

        storage
            .rename(&Locator::new("notes"), &Locator::new("archive"))
            .unwrap();
        assert_eq!(storage.get(&Locator::new("archive/a.md")).as_deref(), Some("a"));
        assert_eq!(storage.get(&Locator::new("archive/sub/b.md")).as_deref(), Some("b"));
        assert_eq!(storage.get(&Locator::new("notesx/c.md")).as_deref(), Some("c"));
    }

    #[test]
    fn test_rejected_writes() {
        let storage = MemoryStorage::new();
        let loc = Locator::new("home.dashboard");
        storage.reject_writes(&loc, true);
        assert!(matches!(
            storage.write(&loc, "{}"),
            Err(StorageError::WriteRejected { .. })
        ));
        storage.reject_writes(&loc, false);
        assert!(storage.write(&loc, "{}").is_ok());
    }
}
