pub mod cascade;
pub mod codec;
pub mod config;
pub mod debounce;
pub mod index;
pub mod listeners;
pub mod locator;
pub mod render;
pub mod rewrite;
pub mod storage;
pub mod tracker;
pub mod types;
pub mod view;
pub mod watcher;

pub use cascade::{resolve_cell, resolve_document, EffectiveCellConfig, EffectiveDocumentConfig};
pub use config::{DocumentSettings, GlobalSettings};
pub use listeners::Subscription;
pub use locator::Locator;
pub use storage::{DocumentStorage, StorageError};
pub use tracker::{ContentModified, ReferenceChange, ReferenceTracker, RenameReport};
pub use types::{Cell, CellMeta, Document, Geometry};
pub use view::{CellEdit, DashboardView, ViewError};
pub use watcher::types::StorageEvent;
