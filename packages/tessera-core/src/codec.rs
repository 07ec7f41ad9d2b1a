/// Tolerant JSON codec for dashboard documents.
///
/// Decoding never fails: empty or malformed text yields an empty document,
/// a malformed cell is skipped, a malformed settings block is dropped.
/// Geometry is clamped into [0, 100] and duplicate or blank cell ids are
/// replaced with `cell-<position>`, the same ids on every decode of the same
/// text. Everything the core writes survives a
/// decode/encode round trip, including unknown meta keys.
use std::collections::HashSet;

use serde_json::Value;

use crate::config::DocumentSettings;
use crate::types::{Cell, Document, CURRENT_VERSION};

/// Replacement id for the cell at `position`, avoiding every id in `taken`.
fn repaired_id(position: usize, taken: &HashSet<String>) -> String {
    let base = format!("cell-{}", position);
    if !taken.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Decode document text. Never fails.
pub fn decode(text: &str) -> Document {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Document::default();
    }

    let root = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(root)) => root,
        Ok(other) => {
            log::warn!(
                "[tessera.codec.decode] Expected an object, found {}; using empty document",
                json_kind(&other)
            );
            return Document::default();
        }
        Err(e) => {
            log::warn!(
                "[tessera.codec.decode] Malformed document ({}); using empty document",
                e
            );
            return Document::default();
        }
    };

    let settings = match root.get("settings") {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<DocumentSettings>(value.clone()) {
            Ok(settings) => Some(settings),
            Err(e) => {
                log::warn!("[tessera.codec.decode] Dropping malformed settings: {}", e);
                None
            }
        },
    };

    let version = root
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(CURRENT_VERSION);
    if version > CURRENT_VERSION {
        log::warn!(
            "[tessera.codec.decode] Document version {} is newer than {}",
            version,
            CURRENT_VERSION
        );
    }

    let mut cells = Vec::new();
    match root.get("cells") {
        Some(Value::Array(items)) => {
            for (position, item) in items.iter().enumerate() {
                match serde_json::from_value::<Cell>(item.clone()) {
                    Ok(mut cell) => {
                        cell.geometry = cell.geometry.clamped();
                        cells.push((position, cell));
                    }
                    Err(e) => {
                        log::warn!(
                            "[tessera.codec.decode] Skipping malformed cell {}: {}",
                            position,
                            e
                        );
                    }
                }
            }
        }
        None | Some(Value::Null) => {}
        Some(other) => {
            log::warn!(
                "[tessera.codec.decode] Expected a cell list, found {}",
                json_kind(other)
            );
        }
    }

    let mut taken: HashSet<String> = cells.iter().map(|(_, cell)| cell.id.clone()).collect();
    let mut seen = HashSet::new();
    for (position, cell) in cells.iter_mut() {
        if cell.id.trim().is_empty() || !seen.insert(cell.id.clone()) {
            let fresh = repaired_id(*position, &taken);
            log::warn!(
                "[tessera.codec.decode] Cell {} has a blank or duplicate id {:?}, assigned {}",
                position,
                cell.id,
                fresh
            );
            taken.insert(fresh.clone());
            seen.insert(fresh.clone());
            cell.id = fresh;
        }
    }
    let cells = cells.into_iter().map(|(_, cell)| cell).collect();

    Document {
        settings,
        version,
        cells,
    }
}

/// Encode a document as pretty-printed JSON.
pub fn encode(doc: &Document) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(doc)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnimationOverride, BorderLine, BorderOverride};
    use crate::locator::Locator;
    use crate::types::{CellConstraints, Edge, Geometry};

    const SAMPLE: &str = r#"{
  "settings": { "gutter": 8, "border": { "color": "blue" } },
  "version": 1,
  "cells": [
    {
      "id": "notes",
      "geometry": { "x": 0, "y": 0, "width": 50, "height": 100 },
      "meta": { "contentKind": "markdown", "contentLocator": "notes/today.md", "showHeader": true }
    },
    {
      "id": "chart",
      "geometry": { "x": 50, "y": 0, "width": 50, "height": 100 },
      "locked": true,
      "meta": { "contentKind": "chart", "contentLocator": "data/q1.csv", "series": [1, 2] },
      "constraints": { "minWidth": 20, "lockedEdges": ["left"] }
    }
  ]
}"#;

    #[test]
    fn test_decode_sample() {
        let doc = decode(SAMPLE);
        assert_eq!(doc.version, 1);
        assert_eq!(doc.cells.len(), 2);
        assert_eq!(doc.settings.as_ref().and_then(|s| s.gutter), Some(8));
        let chart = doc.cell("chart").unwrap();
        assert_eq!(chart.locked, Some(true));
        assert_eq!(
            chart.meta.content_locator,
            Some(Locator::new("data/q1.csv"))
        );
        assert_eq!(
            chart.constraints.as_ref().unwrap().locked_edges,
            vec![Edge::Left]
        );
        assert!(chart.meta.extensions.contains_key("series"));
    }

    #[test]
    fn test_decode_empty_and_malformed() {
        assert_eq!(decode(""), Document::default());
        assert_eq!(decode("   \n"), Document::default());
        assert_eq!(decode("{ not json"), Document::default());
        assert_eq!(decode("[1, 2, 3]"), Document::default());
    }

    #[test]
    fn test_decode_missing_fields_default() {
        let doc = decode(r#"{"settings": {"gutter": 2}}"#);
        assert_eq!(doc.version, CURRENT_VERSION);
        assert!(doc.cells.is_empty());
    }

    #[test]
    fn test_decode_skips_malformed_cell() {
        let doc = decode(
            r#"{"cells": [{"id": "ok", "meta": {"contentKind": "markdown"}}, {"geometry": 5}, 42]}"#,
        );
        assert_eq!(doc.cells.len(), 1);
        assert_eq!(doc.cells[0].id, "ok");
    }

    #[test]
    fn test_decode_drops_malformed_settings() {
        let doc = decode(r#"{"settings": {"gutter": "wide"}, "cells": []}"#);
        assert!(doc.settings.is_none());
    }

    #[test]
    fn test_decode_clamps_geometry() {
        let doc = decode(
            r#"{"cells": [{"id": "a", "geometry": {"x": -10, "y": 5, "width": 140, "height": 20}}]}"#,
        );
        assert_eq!(
            doc.cells[0].geometry,
            Geometry {
                x: 0.0,
                y: 5.0,
                width: 100.0,
                height: 20.0
            }
        );
    }

    #[test]
    fn test_decode_replaces_duplicate_ids() {
        let text = r#"{"cells": [{"id": "a"}, {"id": "a"}, {"id": ""}, {"id": "cell-1"}]}"#;
        let doc = decode(text);
        let ids: Vec<&str> = doc.cells.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "cell-1-2", "cell-2", "cell-1"]);
        assert_eq!(decode(text), doc);
        assert_eq!(decode(&encode(&doc).unwrap()), doc);
    }

    #[test]
    fn test_roundtrip_keeps_literal_percent_locators() {
        let doc = Document {
            cells: vec![
                Cell::new("a", "markdown", Some(Locator::new("100%2541.md"))),
                Cell::new("b", "markdown", Some(Locator::from_storage("Q3%20plan.md"))),
                Cell::new("c", "markdown", Some(Locator::new("My%20Note.md"))),
            ],
            ..Document::default()
        };
        let reparsed = decode(&encode(&doc).unwrap());
        assert_eq!(reparsed, doc);
        assert_eq!(
            reparsed.cells[0].meta.content_locator,
            Some(Locator::from_storage("100%41.md"))
        );
    }

    #[test]
    fn test_roundtrip() {
        let mut doc = decode(SAMPLE);
        let cell = doc.cell_mut("notes").unwrap();
        cell.meta.border = Some(BorderOverride {
            style: Some(BorderLine::Dotted),
            ..Default::default()
        });
        cell.meta.animation = Some(AnimationOverride {
            enabled: Some(false),
            duration_ms: None,
        });
        cell.geometry = Geometry {
            x: 33.333333333333336,
            y: 0.1,
            width: 66.66666666666667,
            height: 12.5,
        };
        cell.constraints = Some(CellConstraints {
            max_height: Some(80.0),
            ..Default::default()
        });

        let text = encode(&doc).unwrap();
        let reparsed = decode(&text);
        assert_eq!(reparsed, doc);
    }
}
