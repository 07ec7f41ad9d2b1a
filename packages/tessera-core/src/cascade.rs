//! Settings cascade: global → document → cell.
//!
//! Every field resolves to the most specific layer that sets it:
//! `cell ?? document ?? global` for cell fields, `document ?? global` for
//! document fields. Composite settings (border, animation) resolve each
//! sub-field on its own, so a document can change the border colour and
//! keep the global width.
//!
//! | field        | cell | document | global |
//! |--------------|------|----------|--------|
//! | show header  | yes  | yes      | yes    |
//! | padding      | yes  | yes      | yes    |
//! | background   | yes  | yes      | yes    |
//! | border.*     | yes  | yes      | yes    |
//! | animation.*  | yes  | yes      | yes    |
//! | gutter       | –    | yes      | yes    |
//! | debounce     | –    | –        | yes    |
//! | snap step    | –    | –        | yes    |
//!
//! Content kind, content locator and the lock flag belong to the cell alone.

use crate::config::{
    Animation, AnimationOverride, Border, BorderOverride, DocumentSettings, GlobalSettings,
};
use crate::locator::Locator;
use crate::types::{Cell, Document};

/// Fully resolved document-level settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveDocumentConfig {
    pub gutter: u32,
    pub show_headers: bool,
    pub padding: u32,
    pub background: String,
    pub border: Border,
    pub animation: Animation,
    /// Global-only.
    pub modify_debounce_ms: u64,
    /// Global-only.
    pub snap_step: f64,
}

/// Fully resolved settings for one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveCellConfig {
    pub show_header: bool,
    pub padding: u32,
    pub background: String,
    pub border: Border,
    pub animation: Animation,
    pub content_kind: String,
    pub content: Option<Locator>,
    pub locked: bool,
}

fn resolve_border(layers: &[Option<&BorderOverride>], base: &Border) -> Border {
    Border {
        width: layers
            .iter()
            .flatten()
            .find_map(|b| b.width)
            .unwrap_or(base.width),
        style: layers
            .iter()
            .flatten()
            .find_map(|b| b.style)
            .unwrap_or(base.style),
        color: layers
            .iter()
            .flatten()
            .find_map(|b| b.color.clone())
            .unwrap_or_else(|| base.color.clone()),
    }
}

fn resolve_animation(layers: &[Option<&AnimationOverride>], base: &Animation) -> Animation {
    Animation {
        enabled: layers
            .iter()
            .flatten()
            .find_map(|a| a.enabled)
            .unwrap_or(base.enabled),
        duration_ms: layers
            .iter()
            .flatten()
            .find_map(|a| a.duration_ms)
            .unwrap_or(base.duration_ms),
    }
}

/// Resolve document-level settings.
pub fn resolve_document(
    global: &GlobalSettings,
    document: Option<&DocumentSettings>,
) -> EffectiveDocumentConfig {
    let doc_border = document.and_then(|d| d.border.as_ref());
    let doc_animation = document.and_then(|d| d.animation.as_ref());

    EffectiveDocumentConfig {
        gutter: document.and_then(|d| d.gutter).unwrap_or(global.gutter),
        show_headers: document
            .and_then(|d| d.show_headers)
            .unwrap_or(global.show_headers),
        padding: document.and_then(|d| d.padding).unwrap_or(global.padding),
        background: document
            .and_then(|d| d.background.clone())
            .unwrap_or_else(|| global.background.clone()),
        border: resolve_border(&[doc_border], &global.border),
        animation: resolve_animation(&[doc_animation], &global.animation),
        modify_debounce_ms: global.modify_debounce_ms,
        snap_step: global.snap_step,
    }
}

/// Resolve one cell. Without a cell, the cascading fields come from the
/// document and global layers and the cell-only fields are unset.
pub fn resolve_cell(
    global: &GlobalSettings,
    document: Option<&DocumentSettings>,
    cell: Option<&Cell>,
) -> EffectiveCellConfig {
    let meta = cell.map(|c| &c.meta);
    let cell_border = meta.and_then(|m| m.border.as_ref());
    let cell_animation = meta.and_then(|m| m.animation.as_ref());
    let doc_border = document.and_then(|d| d.border.as_ref());
    let doc_animation = document.and_then(|d| d.animation.as_ref());

    EffectiveCellConfig {
        show_header: meta
            .and_then(|m| m.show_header)
            .or_else(|| document.and_then(|d| d.show_headers))
            .unwrap_or(global.show_headers),
        padding: meta
            .and_then(|m| m.padding)
            .or_else(|| document.and_then(|d| d.padding))
            .unwrap_or(global.padding),
        background: meta
            .and_then(|m| m.background.clone())
            .or_else(|| document.and_then(|d| d.background.clone()))
            .unwrap_or_else(|| global.background.clone()),
        border: resolve_border(&[cell_border, doc_border], &global.border),
        animation: resolve_animation(&[cell_animation, doc_animation], &global.animation),
        content_kind: meta
            .map(|m| m.content_kind.clone())
            .unwrap_or_else(|| crate::types::EMPTY_CONTENT_KIND.to_string()),
        content: meta.and_then(|m| m.content_locator.clone()),
        locked: cell.and_then(|c| c.locked).unwrap_or(false),
    }
}

/// Resolve every cell of a document, in cell order.
pub fn resolve_cells(global: &GlobalSettings, doc: &Document) -> Vec<(String, EffectiveCellConfig)> {
    doc.cells
        .iter()
        .map(|cell| {
            (
                cell.id.clone(),
                resolve_cell(global, doc.settings.as_ref(), Some(cell)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BorderLine;
    use crate::types::{CellMeta, EMPTY_CONTENT_KIND};

    fn cell_with(meta: CellMeta) -> Cell {
        Cell {
            meta,
            ..Cell::new("c", "markdown", None)
        }
    }

    #[test]
    fn test_document_gutter_override() {
        let global = GlobalSettings {
            gutter: 4,
            ..Default::default()
        };
        let doc = DocumentSettings {
            gutter: Some(8),
            ..Default::default()
        };
        assert_eq!(resolve_document(&global, Some(&doc)).gutter, 8);
        assert_eq!(resolve_document(&global, None).gutter, 4);
    }

    #[test]
    fn test_cell_show_header_beats_document() {
        let global = GlobalSettings {
            show_headers: true,
            ..Default::default()
        };
        let doc = DocumentSettings {
            show_headers: Some(false),
            ..Default::default()
        };
        let cell = cell_with(CellMeta {
            show_header: Some(true),
            ..Default::default()
        });
        assert!(resolve_cell(&global, Some(&doc), Some(&cell)).show_header);

        let plain = cell_with(CellMeta::default());
        assert!(!resolve_cell(&global, Some(&doc), Some(&plain)).show_header);
    }

    #[test]
    fn test_composite_subfields_cascade_independently() {
        let global = GlobalSettings {
            border: Border {
                width: 1,
                style: BorderLine::Solid,
                color: "grey".to_string(),
            },
            ..Default::default()
        };
        let doc = DocumentSettings {
            border: Some(BorderOverride {
                color: Some("blue".to_string()),
                ..Default::default()
            }),
            animation: Some(AnimationOverride {
                duration_ms: Some(400),
                enabled: None,
            }),
            ..Default::default()
        };
        let cell = cell_with(CellMeta {
            border: Some(BorderOverride {
                width: Some(3),
                ..Default::default()
            }),
            animation: Some(AnimationOverride {
                enabled: Some(false),
                duration_ms: None,
            }),
            ..Default::default()
        });

        let effective = resolve_cell(&global, Some(&doc), Some(&cell));
        assert_eq!(
            effective.border,
            Border {
                width: 3,
                style: BorderLine::Solid,
                color: "blue".to_string(),
            }
        );
        assert_eq!(
            effective.animation,
            Animation {
                enabled: false,
                duration_ms: 400,
            }
        );
    }

    #[test]
    fn test_cascade_law_over_all_layer_combinations() {
        let global = GlobalSettings::default();
        for doc_padding in [None, Some(20u32)] {
            for cell_padding in [None, Some(30u32)] {
                let doc = DocumentSettings {
                    padding: doc_padding,
                    ..Default::default()
                };
                let cell = cell_with(CellMeta {
                    padding: cell_padding,
                    ..Default::default()
                });
                let effective = resolve_cell(&global, Some(&doc), Some(&cell));
                assert_eq!(
                    effective.padding,
                    cell_padding.or(doc_padding).unwrap_or(global.padding)
                );
            }
        }
    }

    #[test]
    fn test_totality_without_document_or_cell() {
        let global = GlobalSettings::default();
        let effective = resolve_cell(&global, None, None);
        assert_eq!(effective.padding, global.padding);
        assert_eq!(effective.border, global.border);
        assert_eq!(effective.animation, global.animation);
        assert_eq!(effective.content_kind, EMPTY_CONTENT_KIND);
        assert_eq!(effective.content, None);
        assert!(!effective.locked);

        let doc = resolve_document(&global, None);
        assert_eq!(doc.background, global.background);
        assert_eq!(doc.modify_debounce_ms, global.modify_debounce_ms);
    }

    #[test]
    fn test_deterministic() {
        let global = GlobalSettings::default();
        let doc = DocumentSettings {
            background: Some("#fff".to_string()),
            ..Default::default()
        };
        let cell = cell_with(CellMeta::default());
        assert_eq!(
            resolve_cell(&global, Some(&doc), Some(&cell)),
            resolve_cell(&global, Some(&doc), Some(&cell))
        );
    }

    #[test]
    fn test_cell_only_fields_not_inherited() {
        let global = GlobalSettings::default();
        let mut cell = Cell::new("c", "chart", Some(Locator::new("data.csv")));
        cell.locked = Some(true);
        let effective = resolve_cell(&global, None, Some(&cell));
        assert_eq!(effective.content_kind, "chart");
        assert_eq!(effective.content, Some(Locator::new("data.csv")));
        assert!(effective.locked);
    }

    #[test]
    fn test_resolve_cells_in_order() {
        let doc = Document {
            cells: vec![Cell::new("a", "markdown", None), Cell::new("b", "chart", None)],
            ..Document::default()
        };
        let resolved = resolve_cells(&GlobalSettings::default(), &doc);
        let ids: Vec<&str> = resolved.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
