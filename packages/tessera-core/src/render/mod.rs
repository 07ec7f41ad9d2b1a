//! Renderer lifecycle.
//!
//! A [`CellRenderer`] presents one cell. The [`bridge::RendererBridge`] keeps
//! at most one live renderer per cell and drives mount, update and unmount;
//! the [`registry::RendererRegistry`] picks a renderer for a content kind.

pub mod bridge;
pub mod registry;

use std::collections::BTreeMap;

use crate::cascade::{self, EffectiveCellConfig};
use crate::config::{DocumentSettings, GlobalSettings};
use crate::types::Cell;

/// Whether the cell's content reference can be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    /// The cell is not bound to any content.
    Unset,
    Available,
    /// The referenced object is gone; the renderer shows a broken reference.
    Missing,
}

/// Everything a renderer needs to present one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    pub cell_id: String,
    pub config: EffectiveCellConfig,
    pub content_state: ContentState,
    /// Extension keys from the cell's meta, for renderers that store their
    /// own state there.
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl RenderContext {
    pub fn for_cell(
        cell: &Cell,
        global: &GlobalSettings,
        document: Option<&DocumentSettings>,
        content_state: ContentState,
    ) -> Self {
        let config = cascade::resolve_cell(global, document, Some(cell));
        let content_state = if config.content.is_none() {
            ContentState::Unset
        } else {
            content_state
        };
        Self {
            cell_id: cell.id.clone(),
            config,
            content_state,
            extensions: cell.meta.extensions.clone(),
        }
    }

    pub fn content_kind(&self) -> &str {
        &self.config.content_kind
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Renderer for {kind} could not be created: {reason}")]
    Factory { kind: String, reason: String },

    #[error("Cell {cell_id} failed to mount: {reason}")]
    Mount { cell_id: String, reason: String },

    #[error("Cell {cell_id} failed to update: {reason}")]
    Update { cell_id: String, reason: String },

    #[error("Cell {0} is not mounted")]
    NotMounted(String),
}

/// A pluggable presentation for one cell.
pub trait CellRenderer: Send {
    /// Content kind this renderer presents.
    fn kind(&self) -> &str;

    fn mount(&mut self, ctx: &RenderContext) -> Result<(), RenderError>;

    fn unmount(&mut self);

    /// Apply a new context in place. `Ok(false)` means this renderer cannot
    /// update and must be remounted instead.
    fn update(&mut self, _ctx: &RenderContext) -> Result<bool, RenderError> {
        Ok(false)
    }

    /// Lock capability, if the renderer has one.
    fn as_lockable(&mut self) -> Option<&mut dyn Lockable> {
        None
    }
}

/// Renderers that can freeze their cell against user edits.
pub trait Lockable {
    fn set_locked(&mut self, locked: bool);

    fn is_locked(&self) -> bool;
}
