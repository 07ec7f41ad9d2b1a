/// Per-cell renderer state machine.
///
/// Each cell is either unmounted or bound to exactly one mounted renderer.
/// Every path that replaces a renderer unmounts the old one before the
/// registry is asked for the new one, so two instances never coexist for a
/// cell.
use std::collections::BTreeMap;

use super::registry::RendererRegistry;
use super::{CellRenderer, RenderContext, RenderError};
use crate::locator::Locator;

struct MountedCell {
    renderer: Box<dyn CellRenderer>,
    context: RenderContext,
}

/// How a context change reached the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Updated,
    Remounted,
}

pub struct RendererBridge {
    registry: RendererRegistry,
    cells: BTreeMap<String, MountedCell>,
}

impl RendererBridge {
    pub fn new(registry: RendererRegistry) -> Self {
        Self {
            registry,
            cells: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RendererRegistry {
        &mut self.registry
    }

    /// Mount a renderer from the registry. A renderer already mounted for the
    /// cell is unmounted first. On failure the cell stays unmounted.
    pub fn mount(&mut self, ctx: RenderContext) -> Result<(), RenderError> {
        self.unmount(&ctx.cell_id);
        let renderer = self.registry.create(&ctx).map_err(|e| {
            log::warn!("[tessera.render.mount] Cell {}: {}", ctx.cell_id, e);
            e
        })?;
        self.attach(ctx, renderer)
    }

    /// Mount a caller-supplied renderer, e.g. an `ErrorRenderer` after
    /// `mount` failed.
    pub fn mount_with(
        &mut self,
        ctx: RenderContext,
        renderer: Box<dyn CellRenderer>,
    ) -> Result<(), RenderError> {
        self.unmount(&ctx.cell_id);
        self.attach(ctx, renderer)
    }

    fn attach(
        &mut self,
        ctx: RenderContext,
        mut renderer: Box<dyn CellRenderer>,
    ) -> Result<(), RenderError> {
        if let Err(e) = renderer.mount(&ctx) {
            log::warn!("[tessera.render.mount] Cell {}: {}", ctx.cell_id, e);
            return Err(e);
        }
        log::trace!(
            "[tessera.render.mount] Cell {} mounted as {}",
            ctx.cell_id,
            renderer.kind()
        );
        self.cells.insert(
            ctx.cell_id.clone(),
            MountedCell {
                renderer,
                context: ctx,
            },
        );
        Ok(())
    }

    /// Apply a user edit synchronously: update in place when the content
    /// kind is unchanged and the renderer supports it, remount otherwise.
    pub fn apply_user_edit(&mut self, ctx: RenderContext) -> Result<EditOutcome, RenderError> {
        if let Some(mounted) = self.cells.get_mut(&ctx.cell_id) {
            if mounted.context.config.content_kind == ctx.config.content_kind {
                match mounted.renderer.update(&ctx) {
                    Ok(true) => {
                        mounted.context = ctx;
                        return Ok(EditOutcome::Updated);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        log::debug!(
                            "[tessera.render.update] Cell {} update failed ({}), remounting",
                            ctx.cell_id,
                            e
                        );
                    }
                }
            }
        }
        self.mount(ctx)?;
        Ok(EditOutcome::Remounted)
    }

    /// Content behind `content` changed. Renderers that can update do so;
    /// the ids of the cells that need a remount are returned.
    pub fn notify_content_modified(&mut self, content: &Locator) -> Vec<String> {
        let mut needs_remount = Vec::new();
        for (cell_id, mounted) in self.cells.iter_mut() {
            if mounted.context.config.content.as_ref() != Some(content) {
                continue;
            }
            match mounted.renderer.update(&mounted.context) {
                Ok(true) => {}
                Ok(false) => needs_remount.push(cell_id.clone()),
                Err(e) => {
                    log::debug!(
                        "[tessera.render.update] Cell {} refresh failed: {}",
                        cell_id,
                        e
                    );
                    needs_remount.push(cell_id.clone());
                }
            }
        }
        needs_remount
    }

    /// Unmount and mount a cell again with its current context.
    pub fn remount(&mut self, cell_id: &str) -> Result<(), RenderError> {
        let ctx = self
            .cells
            .get(cell_id)
            .map(|mounted| mounted.context.clone())
            .ok_or_else(|| RenderError::NotMounted(cell_id.to_string()))?;
        self.mount(ctx)
    }

    /// Unmount every active cell, then mount each context. Returns the cells
    /// that failed to mount.
    pub fn remount_all(&mut self, contexts: Vec<RenderContext>) -> Vec<(String, RenderError)> {
        self.unmount_all();
        let mut failures = Vec::new();
        for ctx in contexts {
            let cell_id = ctx.cell_id.clone();
            if let Err(e) = self.mount(ctx) {
                failures.push((cell_id, e));
            }
        }
        failures
    }

    /// Returns true if a renderer was mounted for the cell.
    pub fn unmount(&mut self, cell_id: &str) -> bool {
        match self.cells.remove(cell_id) {
            Some(mut mounted) => {
                mounted.renderer.unmount();
                true
            }
            None => false,
        }
    }

    pub fn unmount_all(&mut self) {
        for (_, mut mounted) in std::mem::take(&mut self.cells) {
            mounted.renderer.unmount();
        }
    }

    /// Lock or unlock a cell's renderer. Returns false if the cell is not
    /// mounted or its renderer has no lock capability.
    pub fn set_locked(&mut self, cell_id: &str, locked: bool) -> bool {
        let Some(mounted) = self.cells.get_mut(cell_id) else {
            return false;
        };
        match mounted.renderer.as_lockable() {
            Some(lockable) => {
                lockable.set_locked(locked);
                mounted.context.config.locked = locked;
                true
            }
            None => false,
        }
    }

    pub fn is_mounted(&self, cell_id: &str) -> bool {
        self.cells.contains_key(cell_id)
    }

    pub fn mounted_count(&self) -> usize {
        self.cells.len()
    }

    pub fn mounted_cells(&self) -> Vec<String> {
        self.cells.keys().cloned().collect()
    }

    pub fn context(&self, cell_id: &str) -> Option<&RenderContext> {
        self.cells.get(cell_id).map(|mounted| &mounted.context)
    }

    /// Kind of the renderer mounted for a cell.
    pub fn renderer_kind(&self, cell_id: &str) -> Option<&str> {
        self.cells.get(cell_id).map(|mounted| mounted.renderer.kind())
    }
}

impl Drop for RendererBridge {
    fn drop(&mut self) {
        self.unmount_all();
    }
}
