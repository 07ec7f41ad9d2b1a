use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{AnimationOverride, BorderOverride, DocumentSettings};
use crate::locator::Locator;

/// Latest on-disk document format version.
pub const CURRENT_VERSION: u32 = 1;

/// Content kind for cells that have nothing bound yet.
pub const EMPTY_CONTENT_KIND: &str = "empty";

fn current_version() -> u32 {
    CURRENT_VERSION
}

fn empty_kind() -> String {
    EMPTY_CONTENT_KIND.to_string()
}

/// Cell rectangle in percent of the dashboard area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 50.0,
            height: 50.0,
        }
    }
}

impl Geometry {
    /// Clamp every field into [0, 100]. Non-finite values become 0.
    pub fn clamped(self) -> Self {
        fn clamp(v: f64) -> f64 {
            if v.is_finite() {
                v.clamp(0.0, 100.0)
            } else {
                0.0
            }
        }
        Self {
            x: clamp(self.x),
            y: clamp(self.y),
            width: clamp(self.width),
            height: clamp(self.height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

/// Size limits handed to the layout engine. Not interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locked_edges: Vec<Edge>,
}

/// Per-cell metadata: the content binding, cell-level setting overrides, and
/// any keys third-party renderers store (kept verbatim in `extensions`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMeta {
    #[serde(default = "empty_kind")]
    pub content_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_locator: Option<Locator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<BorderOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationOverride>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl Default for CellMeta {
    fn default() -> Self {
        Self {
            content_kind: empty_kind(),
            content_locator: None,
            show_header: None,
            padding: None,
            background: None,
            border: None,
            animation: None,
            extensions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub id: String,
    #[serde(default)]
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default)]
    pub meta: CellMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<CellConstraints>,
}

impl Cell {
    /// A cell bound to `content` rendered as `kind`, with default geometry.
    pub fn new(id: &str, kind: &str, content: Option<Locator>) -> Self {
        Self {
            id: id.to_string(),
            geometry: Geometry::default(),
            locked: None,
            meta: CellMeta {
                content_kind: kind.to_string(),
                content_locator: content,
                ..CellMeta::default()
            },
            constraints: None,
        }
    }

    pub fn references(&self, locator: &Locator) -> bool {
        self.meta.content_locator.as_ref() == Some(locator)
    }
}

/// A dashboard document as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<DocumentSettings>,
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            settings: None,
            version: CURRENT_VERSION,
            cells: Vec::new(),
        }
    }
}

impl Document {
    pub fn cell(&self, id: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }

    pub fn cell_mut(&mut self, id: &str) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.id == id)
    }

    /// Content locators referenced by any cell, in cell order (may repeat).
    pub fn references(&self) -> impl Iterator<Item = &Locator> {
        self.cells
            .iter()
            .filter_map(|c| c.meta.content_locator.as_ref())
    }

    /// Ids of the cells bound to `locator`.
    pub fn cells_referencing(&self, locator: &Locator) -> Vec<String> {
        self.cells
            .iter()
            .filter(|c| c.references(locator))
            .map(|c| c.id.clone())
            .collect()
    }
}
