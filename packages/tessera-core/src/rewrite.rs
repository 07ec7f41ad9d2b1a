/// Keep stored references correct after a content rename.
///
/// `persist_rewrite` always reads the document fresh from storage, so a rename
/// never writes back a stale cached copy. Documents that do not reference the
/// old locator are left untouched on disk.
use crate::codec;
use crate::locator::Locator;
use crate::storage::{DocumentStorage, StorageError};
use crate::types::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The document was written back with `cells` updated cells.
    Rewritten { cells: usize },
    /// No cell referenced the old locator; nothing was written.
    Unchanged,
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Point every cell bound to `old` at `new`. Returns how many cells changed.
pub fn rewrite_reference(doc: &mut Document, old: &Locator, new: &Locator) -> usize {
    if old == new {
        return 0;
    }
    let mut changed = 0;
    for cell in doc.cells.iter_mut().filter(|c| c.references(old)) {
        cell.meta.content_locator = Some(new.clone());
        changed += 1;
    }
    changed
}

/// Read `document` fresh, rewrite `old` to `new`, and write it back when at
/// least one cell changed.
pub fn persist_rewrite(
    storage: &dyn DocumentStorage,
    document: &Locator,
    old: &Locator,
    new: &Locator,
) -> Result<RewriteOutcome, RewriteError> {
    let text = storage.read(document)?;
    let mut doc = codec::decode(&text);

    let cells = rewrite_reference(&mut doc, old, new);
    if cells == 0 {
        log::debug!(
            "[tessera.rewrite] {} has no reference to {}, not writing",
            document,
            old
        );
        return Ok(RewriteOutcome::Unchanged);
    }

    let encoded = codec::encode(&doc)?;
    storage.write(document, &encoded)?;
    log::info!(
        "[tessera.rewrite] {}: {} cell(s) moved from {} to {}",
        document,
        cells,
        old,
        new
    );
    Ok(RewriteOutcome::Rewritten { cells })
}
