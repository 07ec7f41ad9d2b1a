/// One open dashboard document.
///
/// Caches the decoded document, resolves every cell through the cascade and
/// keeps the renderer bridge in step with edits, settings changes and the
/// tracker's reference notifications. Writes always read the stored text
/// fresh and apply the same change to it.
use std::sync::Arc;

use crate::cascade::{self, EffectiveDocumentConfig};
use crate::codec;
use crate::config::{DocumentSettings, GlobalSettings};
use crate::locator::Locator;
use crate::render::bridge::{EditOutcome, RendererBridge};
use crate::render::registry::{ErrorRenderer, RendererRegistry};
use crate::render::{ContentState, RenderContext};
use crate::rewrite::rewrite_reference;
use crate::storage::{DocumentStorage, StorageError};
use crate::tracker::{ContentModified, ReferenceChange};
use crate::types::{Cell, Document, Geometry};
use crate::watcher::types::ContentFingerprint;

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("No cell {0} in this document")]
    UnknownCell(String),

    #[error("View is closed")]
    Closed,
}

/// A user edit to one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellEdit {
    /// Bind the cell to other content (or unbind it).
    SetContent {
        kind: String,
        locator: Option<Locator>,
    },
    SetGeometry(Geometry),
    SetLocked(bool),
    SetShowHeader(Option<bool>),
    SetPadding(Option<u32>),
    SetBackground(Option<String>),
    /// Set or remove a renderer-owned meta key.
    SetExtension {
        key: String,
        value: Option<serde_json::Value>,
    },
}

impl CellEdit {
    pub fn apply(&self, cell: &mut Cell) {
        match self {
            CellEdit::SetContent { kind, locator } => {
                cell.meta.content_kind = kind.clone();
                cell.meta.content_locator = locator.clone();
            }
            CellEdit::SetGeometry(geometry) => cell.geometry = geometry.clamped(),
            CellEdit::SetLocked(locked) => cell.locked = Some(*locked),
            CellEdit::SetShowHeader(show) => cell.meta.show_header = *show,
            CellEdit::SetPadding(padding) => cell.meta.padding = *padding,
            CellEdit::SetBackground(background) => cell.meta.background = background.clone(),
            CellEdit::SetExtension { key, value } => match value {
                Some(value) => {
                    cell.meta.extensions.insert(key.clone(), value.clone());
                }
                None => {
                    cell.meta.extensions.remove(key);
                }
            },
        }
    }
}

pub struct DashboardView {
    storage: Arc<dyn DocumentStorage>,
    locator: Locator,
    globals: GlobalSettings,
    document: Document,
    fingerprint: ContentFingerprint,
    bridge: RendererBridge,
    closed: bool,
}

impl DashboardView {
    /// Load a document and mount every cell.
    pub fn open(
        storage: Arc<dyn DocumentStorage>,
        locator: &Locator,
        globals: GlobalSettings,
        registry: RendererRegistry,
    ) -> Result<Self, ViewError> {
        let text = storage.read(locator)?;
        let mut view = Self {
            document: codec::decode(&text),
            fingerprint: ContentFingerprint::from_content(&text),
            storage,
            locator: locator.clone(),
            globals,
            bridge: RendererBridge::new(registry),
            closed: false,
        };
        view.remount_all();
        log::info!(
            "[tessera.view.open] {} with {} cells",
            view.locator,
            view.document.cells.len()
        );
        Ok(view)
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn globals(&self) -> &GlobalSettings {
        &self.globals
    }

    pub fn bridge(&self) -> &RendererBridge {
        &self.bridge
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Resolved document-level settings (gutter, snapping, ...).
    pub fn effective_settings(&self) -> EffectiveDocumentConfig {
        cascade::resolve_document(&self.globals, self.document.settings.as_ref())
    }

    fn ensure_open(&self) -> Result<(), ViewError> {
        if self.closed {
            Err(ViewError::Closed)
        } else {
            Ok(())
        }
    }

    fn context_for(&self, cell: &Cell) -> RenderContext {
        let state = match &cell.meta.content_locator {
            Some(content) if !self.storage.exists(content) => ContentState::Missing,
            _ => ContentState::Available,
        };
        RenderContext::for_cell(cell, &self.globals, self.document.settings.as_ref(), state)
    }

    fn mount_context(&mut self, ctx: RenderContext) {
        if let Err(e) = self.bridge.mount(ctx.clone()) {
            let fallback = Box::new(ErrorRenderer::new(&e));
            if let Err(e) = self.bridge.mount_with(ctx, fallback) {
                log::error!("[tessera.view.mount] Error renderer failed: {}", e);
            }
        }
    }

    fn remount_cell(&mut self, cell_id: &str) {
        if let Some(ctx) = self.document.cell(cell_id).map(|cell| self.context_for(cell)) {
            self.mount_context(ctx);
        }
    }

    fn remount_all(&mut self) {
        let contexts: Vec<RenderContext> = self
            .document
            .cells
            .iter()
            .map(|cell| self.context_for(cell))
            .collect();
        for (cell_id, e) in self.bridge.remount_all(contexts) {
            log::warn!("[tessera.view.mount] Cell {} failed to mount: {}", cell_id, e);
            self.remount_cell_with_error(&cell_id, &e);
        }
    }

    fn remount_cell_with_error(&mut self, cell_id: &str, error: &crate::render::RenderError) {
        if let Some(ctx) = self.document.cell(cell_id).map(|cell| self.context_for(cell)) {
            if let Err(e) = self
                .bridge
                .mount_with(ctx, Box::new(ErrorRenderer::new(error)))
            {
                log::error!("[tessera.view.mount] Error renderer failed: {}", e);
            }
        }
    }

    /// Read the stored document fresh, let `change` modify it, and write it
    /// back. Returns the document that was written and whether the stored
    /// text had changed behind our back. Nothing is written when `change`
    /// fails.
    fn persist<F>(&mut self, change: F) -> Result<(Document, bool), ViewError>
    where
        F: FnOnce(&mut Document) -> Result<(), ViewError>,
    {
        let text = self.storage.read(&self.locator)?;
        let external = ContentFingerprint::from_content(&text) != self.fingerprint;
        let mut fresh = codec::decode(&text);
        change(&mut fresh)?;

        let encoded = codec::encode(&fresh)?;
        self.storage.write(&self.locator, &encoded)?;
        self.fingerprint = ContentFingerprint::from_content(&encoded);
        Ok((fresh, external))
    }

    /// Apply a user edit to storage, then to the cached document and the
    /// cell's renderer. A failed write leaves the view as it was. If the cell
    /// is gone from storage the view reloads and the edit is refused.
    pub fn edit_cell(&mut self, cell_id: &str, edit: CellEdit) -> Result<EditOutcome, ViewError> {
        self.ensure_open()?;
        if self.document.cell(cell_id).is_none() {
            return Err(ViewError::UnknownCell(cell_id.to_string()));
        }

        let persisted = self.persist(|fresh| match fresh.cell_mut(cell_id) {
            Some(cell) => {
                edit.apply(cell);
                Ok(())
            }
            None => Err(ViewError::UnknownCell(cell_id.to_string())),
        });
        let (written, external) = match persisted {
            Ok(persisted) => persisted,
            Err(ViewError::UnknownCell(id)) => {
                log::info!(
                    "[tessera.view.edit] Cell {} was removed from {} on disk, reloading",
                    id,
                    self.locator
                );
                self.reload()?;
                self.remount_all();
                return Err(ViewError::UnknownCell(id));
            }
            Err(e) => return Err(e),
        };
        self.document = written;

        if external {
            log::info!(
                "[tessera.view.edit] {} changed on disk, remounting all cells",
                self.locator
            );
            self.remount_all();
            return Ok(EditOutcome::Remounted);
        }

        let Some(ctx) = self.document.cell(cell_id).map(|cell| self.context_for(cell)) else {
            return Err(ViewError::UnknownCell(cell_id.to_string()));
        };
        let outcome = match self.bridge.apply_user_edit(ctx) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.remount_cell_with_error(cell_id, &e);
                EditOutcome::Remounted
            }
        };
        if let CellEdit::SetLocked(locked) = edit {
            self.bridge.set_locked(cell_id, locked);
        }
        Ok(outcome)
    }

    /// React to a tracker rename/delete notification. Returns the cells that
    /// were remounted.
    pub fn apply_reference_change(
        &mut self,
        change: &ReferenceChange,
    ) -> Result<Vec<String>, ViewError> {
        self.ensure_open()?;
        if change.document != self.locator {
            return Ok(Vec::new());
        }

        let affected = match &change.new {
            Some(new) => {
                self.reload()?;
                let mut affected = self.document.cells_referencing(new);
                if affected.is_empty() {
                    // The rewrite did not reach storage; follow the rename in
                    // memory until the next successful write.
                    rewrite_reference(&mut self.document, &change.old, new);
                    affected = self.document.cells_referencing(new);
                }
                affected
            }
            None => self.document.cells_referencing(&change.old),
        };

        for cell_id in &affected {
            self.remount_cell(cell_id);
        }
        Ok(affected)
    }

    /// React to a debounced content change. Returns the cells that were
    /// remounted because their renderer could not update.
    pub fn apply_content_modified(
        &mut self,
        notice: &ContentModified,
    ) -> Result<Vec<String>, ViewError> {
        self.ensure_open()?;
        if !notice.documents.contains(&self.locator) {
            return Ok(Vec::new());
        }

        // Content that was missing is back: contexts need a new state.
        let stale: Vec<String> = self
            .document
            .cells_referencing(&notice.content)
            .into_iter()
            .filter(|cell_id| {
                self.bridge
                    .context(cell_id)
                    .is_some_and(|ctx| ctx.content_state == ContentState::Missing)
            })
            .collect();
        for cell_id in &stale {
            self.remount_cell(cell_id);
        }

        let pending = self.bridge.notify_content_modified(&notice.content);
        for cell_id in &pending {
            self.remount_cell(cell_id);
        }
        Ok(pending)
    }

    /// Replace the document-level overrides, persist them and remount every
    /// cell.
    pub fn set_document_settings(
        &mut self,
        settings: Option<DocumentSettings>,
    ) -> Result<(), ViewError> {
        self.ensure_open()?;
        let (written, _) = self.persist(move |fresh| {
            fresh.settings = settings;
            Ok(())
        })?;
        self.document = written;
        self.remount_all();
        Ok(())
    }

    /// Replace the host-wide settings and remount every cell.
    pub fn set_global_settings(&mut self, globals: GlobalSettings) -> Result<(), ViewError> {
        self.ensure_open()?;
        self.globals = globals;
        self.remount_all();
        Ok(())
    }

    fn reload(&mut self) -> Result<(), ViewError> {
        let text = self.storage.read(&self.locator)?;
        self.document = codec::decode(&text);
        self.fingerprint = ContentFingerprint::from_content(&text);
        Ok(())
    }

    /// Reload and remount everything if the stored document changed since
    /// it was last read or written here.
    pub fn refresh_if_changed(&mut self) -> Result<bool, ViewError> {
        self.ensure_open()?;
        let text = self.storage.read(&self.locator)?;
        if ContentFingerprint::from_content(&text) == self.fingerprint {
            return Ok(false);
        }
        log::info!("[tessera.view.refresh] {} changed externally", self.locator);
        self.document = codec::decode(&text);
        self.fingerprint = ContentFingerprint::from_content(&text);
        self.remount_all();
        Ok(true)
    }

    /// Unmount every cell. Later operations fail with `ViewError::Closed`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.bridge.unmount_all();
        self.closed = true;
        log::debug!("[tessera.view.close] {}", self.locator);
    }
}

impl Drop for DashboardView {
    fn drop(&mut self) {
        self.close();
    }
}
