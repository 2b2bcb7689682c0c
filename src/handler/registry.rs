//! Registry of in-flight requests
//!
//! Entries exist exactly between admission-slot acquisition and request
//! completion. Only the handler inserts and removes; cancellation requests
//! read through [`get`](RequestRegistry::get).

use dashmap::DashMap;
use std::sync::Arc;

use crate::request::{RequestCore, RequestKind, RequestSnapshot};

/// Thread-safe mapping from request id to live request state
#[derive(Debug, Default)]
pub struct RequestRegistry {
    entries: DashMap<String, Arc<RequestCore>>,
}

impl RequestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, core: Arc<RequestCore>) {
        self.entries.insert(core.id().to_string(), core);
    }

    pub(crate) fn remove(&self, id: &str) {
        self.entries.remove(id);
    }

    /// Look up a live request
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<RequestCore>> {
        self.entries.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Snapshot every live request, optionally filtered by kind
    #[must_use]
    pub fn list(&self, kind: Option<RequestKind>) -> Vec<RequestSnapshot> {
        self.entries
            .iter()
            .filter(|e| kind.is_none_or(|k| e.value().kind() == k))
            .map(|e| e.value().snapshot())
            .collect()
    }

    /// All live cancellable requests, for the shutdown cancel sweep
    pub(crate) fn cancellable(&self) -> Vec<Arc<RequestCore>> {
        self.entries
            .iter()
            .filter(|e| e.value().is_cancellable())
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
