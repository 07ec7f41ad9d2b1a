/// Reference tracker.
///
/// Owns the reverse reference index and keeps it in step with storage:
/// - rename: relabel documents, rewrite referencing documents on disk, notify
/// - delete: purge documents, notify once per document that lost content
/// - modify: re-index documents, notify (debounced) for referenced content
/// - create: index new documents
///
/// All handlers take `&mut self` and run to completion; `run` feeds them from
/// the storage event stream one event at a time.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::codec;
use crate::debounce::ModifyDebouncer;
use crate::index::ReferenceIndex;
use crate::listeners::{ListenerSet, Subscription};
use crate::locator::Locator;
use crate::rewrite::{persist_rewrite, RewriteOutcome};
use crate::storage::DocumentStorage;
use crate::types::Document;
use crate::watcher::types::StorageEvent;

/// A document's reference moved (`new` is set) or disappeared (`new` is None).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceChange {
    pub document: Locator,
    pub old: Locator,
    pub new: Option<Locator>,
}

/// Referenced content changed; `documents` reference it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentModified {
    pub content: Locator,
    pub documents: Vec<Locator>,
}

/// What a rename did to the documents that referenced the old locator.
/// One entry per document rewrite; a folder rename can list a document once
/// per content object it moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    pub rewritten: Vec<Locator>,
    pub unchanged: Vec<Locator>,
    pub failed: Vec<(Locator, String)>,
}

impl RenameReport {
    pub fn is_empty(&self) -> bool {
        self.rewritten.is_empty() && self.unchanged.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub skipped: usize,
    pub references: usize,
}

pub struct ReferenceTracker {
    storage: Arc<dyn DocumentStorage>,
    index: ReferenceIndex,
    debouncer: ModifyDebouncer,
    rename_listeners: ListenerSet<ReferenceChange>,
    delete_listeners: ListenerSet<ReferenceChange>,
    modify_listeners: ListenerSet<ContentModified>,
    disposed: bool,
}

impl ReferenceTracker {
    pub fn new(storage: Arc<dyn DocumentStorage>, debounce_window: Duration) -> Self {
        Self {
            storage,
            index: ReferenceIndex::new(),
            debouncer: ModifyDebouncer::new(debounce_window),
            rename_listeners: ListenerSet::new(),
            delete_listeners: ListenerSet::new(),
            modify_listeners: ListenerSet::new(),
            disposed: false,
        }
    }

    /// Build the index from storage.
    pub fn init(&mut self) -> IndexStats {
        self.index_all()
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Clear and rebuild the index from every document in storage. Documents
    /// that cannot be read are skipped.
    pub fn index_all(&mut self) -> IndexStats {
        let mut stats = IndexStats::default();
        if self.disposed {
            return stats;
        }
        self.index.clear();

        let documents = match self.storage.list_documents() {
            Ok(documents) => documents,
            Err(e) => {
                log::error!("[tessera.tracker.index] Failed to list documents: {}", e);
                return stats;
            }
        };
        for document in &documents {
            if self.index_from_storage(document) {
                stats.documents += 1;
            } else {
                stats.skipped += 1;
            }
        }
        stats.references = self.index.reference_count();
        log::info!(
            "[tessera.tracker.index] Indexed {} documents ({} skipped), {} references",
            stats.documents,
            stats.skipped,
            stats.references
        );
        stats
    }

    /// Replace a document's contribution with the references in `doc`.
    pub fn index_document(&mut self, document: &Locator, doc: &Document) {
        if self.disposed {
            return;
        }
        self.index.register_document(document, doc);
    }

    pub fn remove_document(&mut self, document: &Locator) {
        self.index.remove_document(document);
    }

    /// Documents currently referencing `content`, sorted.
    pub fn referencing_documents(&self, content: &Locator) -> Vec<Locator> {
        self.index.referencing_documents(content)
    }

    fn index_from_storage(&mut self, document: &Locator) -> bool {
        match self.storage.read(document) {
            Ok(text) => {
                let doc = codec::decode(&text);
                self.index.register_document(document, &doc);
                true
            }
            Err(e) => {
                log::warn!("[tessera.tracker.index] Skipping {}: {}", document, e);
                self.index.remove_document(document);
                false
            }
        }
    }

    /// Storage renamed `old` to `new` (a file or a folder).
    pub fn on_rename(&mut self, new: &Locator, old: &Locator) -> RenameReport {
        let mut report = RenameReport::default();
        if self.disposed || old == new {
            return report;
        }
        self.debouncer.forget(old);

        match (old.is_document(), new.is_document()) {
            (true, true) => {
                log::debug!("[tessera.tracker.rename] Document {} -> {}", old, new);
                self.index.relabel_document(old, new);
            }
            (true, false) => {
                log::info!(
                    "[tessera.tracker.rename] {} is no longer a document, dropping it",
                    new
                );
                self.index.remove_document(old);
            }
            (false, true) => {
                self.index_from_storage(new);
            }
            (false, false) => {}
        }

        // Documents inside a renamed folder move first so the rewrites below
        // read them at their new locators.
        for document in self.index.documents_inside(old) {
            if let Some(moved) = document.rebase(old, new) {
                self.index.relabel_document(&document, &moved);
            }
        }

        self.propagate_content_rename(old, new, &mut report);
        for content in self.index.content_inside(old) {
            if let Some(moved) = content.rebase(old, new) {
                self.debouncer.forget(&content);
                self.propagate_content_rename(&content, &moved, &mut report);
            }
        }

        if !report.failed.is_empty() {
            log::warn!(
                "[tessera.tracker.rename] {} -> {}: {} rewritten, {} failed",
                old,
                new,
                report.rewritten.len(),
                report.failed.len()
            );
        }
        report
    }

    fn propagate_content_rename(&mut self, old: &Locator, new: &Locator, report: &mut RenameReport) {
        for document in self.index.referencing_documents(old) {
            match persist_rewrite(self.storage.as_ref(), &document, old, new) {
                Ok(RewriteOutcome::Rewritten { .. }) => report.rewritten.push(document.clone()),
                Ok(RewriteOutcome::Unchanged) => report.unchanged.push(document.clone()),
                Err(e) => {
                    log::warn!(
                        "[tessera.tracker.rename] Failed to rewrite {} ({} -> {}): {}",
                        document,
                        old,
                        new,
                        e
                    );
                    report.failed.push((document.clone(), e.to_string()));
                }
            }
            // Index follows the rename even when the write failed; a rescan
            // reconciles it.
            self.index.relabel_reference(&document, old, new);
            self.rename_listeners.emit(&ReferenceChange {
                document,
                old: old.clone(),
                new: Some(new.clone()),
            });
        }
    }

    /// Storage deleted `locator` (a file or a folder).
    pub fn on_delete(&mut self, locator: &Locator) {
        if self.disposed {
            return;
        }
        self.debouncer.forget(locator);

        if locator.is_document() {
            self.index.remove_document(locator);
        }
        for document in self.index.documents_inside(locator) {
            self.index.remove_document(&document);
        }

        self.notify_deleted(locator);
        for content in self.index.content_inside(locator) {
            self.debouncer.forget(&content);
            self.notify_deleted(&content);
        }
    }

    fn notify_deleted(&mut self, content: &Locator) {
        let documents = self.index.remove_content(content);
        if !documents.is_empty() {
            log::info!(
                "[tessera.tracker.delete] {} was referenced by {} document(s)",
                content,
                documents.len()
            );
        }
        for document in documents {
            self.delete_listeners.emit(&ReferenceChange {
                document,
                old: content.clone(),
                new: None,
            });
        }
    }

    /// Storage modified `locator`. Returns true if listeners were notified.
    pub fn on_modify(&mut self, locator: &Locator) -> bool {
        self.on_modify_at(locator, Instant::now())
    }

    pub fn on_modify_at(&mut self, locator: &Locator, now: Instant) -> bool {
        if self.disposed {
            return false;
        }
        if locator.is_document() {
            // No notification, but its cells may now reference other content.
            self.index_from_storage(locator);
            return false;
        }

        let documents = self.index.referencing_documents(locator);
        if documents.is_empty() {
            return false;
        }
        self.debouncer.prune(now);
        if !self.debouncer.admit(locator, now) {
            log::trace!("[tessera.tracker.modify] {} debounced", locator);
            return false;
        }
        self.modify_listeners.emit(&ContentModified {
            content: locator.clone(),
            documents,
        });
        true
    }

    /// Storage created `locator`. Only documents matter.
    pub fn on_create(&mut self, locator: &Locator) {
        if self.disposed || !locator.is_document() {
            return;
        }
        self.index_from_storage(locator);
    }

    pub fn handle_event(&mut self, event: &StorageEvent) {
        match event {
            StorageEvent::Renamed { from, to } => {
                self.on_rename(to, from);
            }
            StorageEvent::Deleted { locator } => self.on_delete(locator),
            StorageEvent::Modified { locator } => {
                self.on_modify(locator);
            }
            StorageEvent::Created { locator } => self.on_create(locator),
        }
    }

    /// Process storage events until `shutdown` turns true (or its sender is
    /// dropped) or the event stream closes. The tracker is disposed on return.
    pub async fn run(
        &mut self,
        mut events: broadcast::Receiver<StorageEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if *shutdown.borrow() {
            self.dispose();
            return;
        }
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("[tessera.tracker.run] Shutdown requested");
                        break;
                    }
                }
                received = events.recv() => match received {
                    Ok(event) => self.handle_event(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!(
                            "[tessera.tracker.run] Missed {} storage events, rescanning",
                            missed
                        );
                        self.index_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        log::info!("[tessera.tracker.run] Storage event stream closed");
                        break;
                    }
                },
            }
        }
        self.dispose();
    }

    /// Called with `(document, old, Some(new))` after each reference rename.
    pub fn add_rename_listener<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ReferenceChange) + Send + Sync + 'static,
    {
        self.rename_listeners.add(callback)
    }

    /// Called with `(document, old, None)` once per document that lost a
    /// reference to deleted content.
    pub fn add_delete_listener<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ReferenceChange) + Send + Sync + 'static,
    {
        self.delete_listeners.add(callback)
    }

    /// Called at most once per debounce window per content locator.
    pub fn add_modify_listener<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ContentModified) + Send + Sync + 'static,
    {
        self.modify_listeners.add(callback)
    }

    /// Drop listeners, debounce state and the index. Later events are ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.rename_listeners.close();
        self.delete_listeners.close();
        self.modify_listeners.close();
        self.debouncer.clear();
        self.index.clear();
        log::debug!("[tessera.tracker] Disposed");
    }
}
