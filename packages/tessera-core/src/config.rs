/// Settings layers for the cascade.
///
/// `GlobalSettings` is the host-wide layer and is always complete (every field
/// has a serde default). `DocumentSettings` holds a document's optional
/// overrides. Cell overrides live on `CellMeta` (see `types`).
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderLine {
    #[default]
    Solid,
    Dashed,
    Dotted,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Border {
    pub width: u32,
    pub style: BorderLine,
    pub color: String,
}

impl Default for Border {
    fn default() -> Self {
        Self {
            width: 1,
            style: BorderLine::Solid,
            color: "#d0d0d0".to_string(),
        }
    }
}

/// Partial border: each sub-field cascades on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorderOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<BorderLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    pub enabled: bool,
    pub duration_ms: u32,
}

impl Default for Animation {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 150,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u32>,
}

fn default_gutter() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

fn default_padding() -> u32 {
    8
}

fn default_background() -> String {
    "transparent".to_string()
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_snap_step() -> f64 {
    1.0
}

/// Host-wide settings. Always fully defined.
///
/// `modify_debounce_ms` and `snap_step` are global-only: documents cannot
/// override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default = "default_gutter")]
    pub gutter: u32,
    #[serde(default = "default_true")]
    pub show_headers: bool,
    #[serde(default = "default_padding")]
    pub padding: u32,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default)]
    pub border: Border,
    #[serde(default)]
    pub animation: Animation,
    #[serde(default = "default_debounce_ms")]
    pub modify_debounce_ms: u64,
    /// Grid step in percent used by the layout engine when snapping.
    #[serde(default = "default_snap_step")]
    pub snap_step: f64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            gutter: default_gutter(),
            show_headers: default_true(),
            padding: default_padding(),
            background: default_background(),
            border: Border::default(),
            animation: Animation::default(),
            modify_debounce_ms: default_debounce_ms(),
            snap_step: default_snap_step(),
        }
    }
}

impl GlobalSettings {
    /// Window for coalescing content modify notifications.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.modify_debounce_ms)
    }
}

/// Document-level overrides, stored inside the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gutter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_headers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<BorderOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationOverride>,
}

/// Load global settings from a JSON file. Returns defaults if the file is
/// missing or malformed.
pub fn load_settings(path: &Path) -> GlobalSettings {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(
                "[tessera.config.load] Failed to parse settings {}: {}",
                path.display(),
                e
            );
            GlobalSettings::default()
        }),
        Err(_) => {
            log::info!(
                "[tessera.config.load] No settings at {}, using defaults",
                path.display()
            );
            GlobalSettings::default()
        }
    }
}
