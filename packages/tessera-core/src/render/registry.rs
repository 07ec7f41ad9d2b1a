/// Content kind → renderer factory lookup.
///
/// Lookup is total: a kind with no registered factory (including the empty
/// kind) gets the neutral `EmptyStateRenderer`.
use std::collections::HashMap;

use super::{CellRenderer, RenderContext, RenderError};
use crate::types::EMPTY_CONTENT_KIND;

pub type RendererFactory =
    Box<dyn Fn(&RenderContext) -> Result<Box<dyn CellRenderer>, RenderError> + Send + Sync>;

pub struct RendererRegistry {
    factories: HashMap<String, RendererFactory>,
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&RenderContext) -> Result<Box<dyn CellRenderer>, RenderError> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(kind.to_string(), Box::new(factory))
            .is_some()
        {
            log::debug!("[tessera.render.registry] Replaced renderer for {}", kind);
        }
    }

    pub fn unregister(&mut self, kind: &str) -> bool {
        self.factories.remove(kind).is_some()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Create a renderer for the context's content kind.
    pub fn create(&self, ctx: &RenderContext) -> Result<Box<dyn CellRenderer>, RenderError> {
        match self.factories.get(ctx.content_kind()) {
            Some(factory) => factory(ctx),
            None => {
                if ctx.content_kind() != EMPTY_CONTENT_KIND {
                    log::debug!(
                        "[tessera.render.registry] No renderer for {}, using empty state",
                        ctx.content_kind()
                    );
                }
                Ok(Box::new(EmptyStateRenderer::new()))
            }
        }
    }
}

/// Neutral placeholder for cells without a usable renderer.
#[derive(Debug, Default)]
pub struct EmptyStateRenderer {
    mounted: Option<RenderContext>,
}

impl EmptyStateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> Option<&RenderContext> {
        self.mounted.as_ref()
    }
}

impl CellRenderer for EmptyStateRenderer {
    fn kind(&self) -> &str {
        EMPTY_CONTENT_KIND
    }

    fn mount(&mut self, ctx: &RenderContext) -> Result<(), RenderError> {
        self.mounted = Some(ctx.clone());
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = None;
    }

    fn update(&mut self, ctx: &RenderContext) -> Result<bool, RenderError> {
        self.mounted = Some(ctx.clone());
        Ok(true)
    }
}

/// Shown in place of a renderer that failed to mount.
#[derive(Debug)]
pub struct ErrorRenderer {
    message: String,
    mounted: bool,
}

impl ErrorRenderer {
    pub fn new(error: &RenderError) -> Self {
        Self {
            message: error.to_string(),
            mounted: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl CellRenderer for ErrorRenderer {
    fn kind(&self) -> &str {
        "error"
    }

    fn mount(&mut self, ctx: &RenderContext) -> Result<(), RenderError> {
        log::warn!(
            "[tessera.render.error] Cell {} shows error: {}",
            ctx.cell_id,
            self.message
        );
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }
}
