pub mod local;
pub mod memory;

use tokio::sync::broadcast;

use crate::locator::Locator;
use crate::watcher::types::StorageEvent;

/// Storage collaborator the core reads documents from and writes them to.
/// Implementations: MemoryStorage (in-process), LocalStorage (vault directory).
pub trait DocumentStorage: Send + Sync {
    /// Read the full text of an object.
    fn read(&self, locator: &Locator) -> Result<String, StorageError>;

    /// Replace the full text of an object, creating it if needed.
    fn write(&self, locator: &Locator, content: &str) -> Result<(), StorageError>;

    /// Every object currently in storage.
    fn list(&self) -> Result<Vec<Locator>, StorageError>;

    /// Whether an object exists.
    fn exists(&self, locator: &Locator) -> bool {
        self.read(locator).is_ok()
    }

    /// Lifecycle events (rename/delete/modify/create), at-least-once.
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;

    /// Every dashboard document currently in storage.
    fn list_documents(&self) -> Result<Vec<Locator>, StorageError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(Locator::is_document)
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(Locator),

    #[error("Write rejected for {locator}: {reason}")]
    WriteRejected { locator: Locator, reason: String },

    #[error("Locator escapes the storage root: {0}")]
    OutsideRoot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
