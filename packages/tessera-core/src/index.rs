/// Reverse reference index.
///
/// ReferenceIndex tracks:
/// - document -> set of content locators its cells reference
/// - content  -> set of documents that reference it
///
/// Both directions always mirror each other and neither keeps empty sets.
/// The index is a soft cache: it can drift from the stored documents and is
/// reconciled by a full rescan.
use std::collections::{BTreeSet, HashMap};

use crate::locator::Locator;
use crate::types::Document;

/// Bidirectional mapping between documents and the content they reference.
#[derive(Debug, Default, Clone)]
pub struct ReferenceIndex {
    /// document -> content locators referenced by its cells
    document_to_content: HashMap<Locator, BTreeSet<Locator>>,
    /// content -> documents that reference it
    content_to_documents: HashMap<Locator, BTreeSet<Locator>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a document's contribution with the references found in its
    /// cells. Idempotent.
    pub fn register_document(&mut self, document: &Locator, doc: &Document) {
        let references = extract_references(doc);
        self.register_references(document, references);
    }

    /// Replace a document's contribution with an explicit reference set.
    pub fn register_references(&mut self, document: &Locator, references: BTreeSet<Locator>) {
        self.remove_document(document);

        for content in &references {
            self.content_to_documents
                .entry(content.clone())
                .or_default()
                .insert(document.clone());
        }

        if !references.is_empty() {
            self.document_to_content
                .insert(document.clone(), references);
        }
    }

    /// Remove all mappings for a document.
    pub fn remove_document(&mut self, document: &Locator) {
        if let Some(references) = self.document_to_content.remove(document) {
            for content in &references {
                if let Some(documents) = self.content_to_documents.get_mut(content) {
                    documents.remove(document);
                    if documents.is_empty() {
                        self.content_to_documents.remove(content);
                    }
                }
            }
        }
    }

    /// Documents that reference `content`, sorted. Empty if none.
    pub fn referencing_documents(&self, content: &Locator) -> Vec<Locator> {
        self.content_to_documents
            .get(content)
            .map(|documents| documents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Content referenced by `document`, sorted. Empty if none.
    pub fn references_of(&self, document: &Locator) -> Vec<Locator> {
        self.document_to_content
            .get(document)
            .map(|references| references.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Move a document's membership to a new locator. Its references are
    /// untouched.
    pub fn relabel_document(&mut self, old: &Locator, new: &Locator) {
        if old == new {
            return;
        }
        let Some(references) = self.document_to_content.get(old).cloned() else {
            return;
        };
        self.remove_document(old);
        self.register_references(new, references);
    }

    /// Rewrite `old` to `new` in one document's contribution only.
    pub fn relabel_reference(&mut self, document: &Locator, old: &Locator, new: &Locator) {
        if old == new {
            return;
        }
        let Some(references) = self.document_to_content.get_mut(document) else {
            return;
        };
        if !references.remove(old) {
            return;
        }
        references.insert(new.clone());

        if let Some(documents) = self.content_to_documents.get_mut(old) {
            documents.remove(document);
            if documents.is_empty() {
                self.content_to_documents.remove(old);
            }
        }
        self.content_to_documents
            .entry(new.clone())
            .or_default()
            .insert(document.clone());
    }

    /// Drop a content key entirely. Returns the documents that referenced it.
    pub fn remove_content(&mut self, content: &Locator) -> Vec<Locator> {
        let Some(documents) = self.content_to_documents.remove(content) else {
            return Vec::new();
        };
        for document in &documents {
            if let Some(references) = self.document_to_content.get_mut(document) {
                references.remove(content);
                if references.is_empty() {
                    self.document_to_content.remove(document);
                }
            }
        }
        documents.into_iter().collect()
    }

    /// Indexed content keys lying inside `folder`, sorted.
    pub fn content_inside(&self, folder: &Locator) -> Vec<Locator> {
        let mut found: Vec<Locator> = self
            .content_to_documents
            .keys()
            .filter(|content| content.is_inside(folder))
            .cloned()
            .collect();
        found.sort();
        found
    }

    /// Indexed documents lying inside `folder`, sorted.
    pub fn documents_inside(&self, folder: &Locator) -> Vec<Locator> {
        let mut found: Vec<Locator> = self
            .document_to_content
            .keys()
            .filter(|document| document.is_inside(folder))
            .cloned()
            .collect();
        found.sort();
        found
    }

    /// Check if a locator is referenced by any document.
    pub fn is_referenced(&self, content: &Locator) -> bool {
        self.content_to_documents.contains_key(content)
    }

    /// Check if a document contributes any reference.
    pub fn has_document(&self, document: &Locator) -> bool {
        self.document_to_content.contains_key(document)
    }

    /// Number of distinct referenced content locators.
    pub fn content_count(&self) -> usize {
        self.content_to_documents.len()
    }

    /// Number of documents with at least one reference.
    pub fn document_count(&self) -> usize {
        self.document_to_content.len()
    }

    /// Total (document, content) pairs.
    pub fn reference_count(&self) -> usize {
        self.document_to_content.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.content_to_documents.is_empty()
    }

    pub fn clear(&mut self) {
        self.document_to_content.clear();
        self.content_to_documents.clear();
    }
}

/// Distinct content locators referenced by a document's cells.
pub fn extract_references(doc: &Document) -> BTreeSet<Locator> {
    doc.references()
        .filter(|locator| !locator.is_empty())
        .cloned()
        .collect()
}
