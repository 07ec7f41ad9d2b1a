//! Callback registration with explicit disposal.
//!
//! `ListenerSet::add` returns a [`Subscription`]. Calling
//! [`Subscription::dispose`] (or dropping it) removes the callback before the
//! next emit. `close` removes everything and makes later `add`s inert; it is
//! how a tracker or view tears down.

use std::sync::{Arc, Mutex, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct ListenerTable<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
    closed: bool,
}

impl<E> ListenerTable<E> {
    fn remove(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }
}

pub struct ListenerSet<E> {
    table: Arc<Mutex<ListenerTable<E>>>,
}

impl<E> Default for ListenerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ListenerSet<E> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(ListenerTable {
                next_id: 0,
                entries: Vec::new(),
                closed: false,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every listener in registration order. Listeners run outside
    /// the table lock, so they may dispose subscriptions.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = {
            let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if table.closed {
                return;
            }
            table.entries.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in snapshot {
            callback(event);
        }
    }

    /// Drop every listener and refuse new ones.
    pub fn close(&self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.closed = true;
        table.entries.clear();
    }
}

impl<E: 'static> ListenerSet<E> {
    pub fn add<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table.closed {
            log::debug!("[tessera.listeners] add after close ignored");
            return Subscription { remove: None };
        }
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, Arc::new(callback)));

        let weak: Weak<Mutex<ListenerTable<E>>> = Arc::downgrade(&self.table);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(table) = weak.upgrade() {
                    table.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
                }
            })),
        }
    }
}

/// Handle returned by `ListenerSet::add`.
#[must_use = "dropping a Subscription unsubscribes the callback"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn dispose(mut self) {
        self.release();
    }

    /// Whether the callback is still registered with a live set.
    pub fn is_active(&self) -> bool {
        self.remove.is_some()
    }

    fn release(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
