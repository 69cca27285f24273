use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use crate::domain::models::{PendingRequest, RequestDescriptor};

/// Requests relayed to the extension that have not been answered yet, keyed by
/// the console-generated request id.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `descriptor` under its id. A reused id replaces the previous
    /// entry, which is returned.
    pub fn insert(&self, descriptor: RequestDescriptor, now: Instant) -> Option<PendingRequest> {
        let id = descriptor.id.clone();
        self.lock().insert(
            id,
            PendingRequest {
                descriptor,
                submitted_at: now,
            },
        )
    }

    pub fn take(&self, id: &str) -> Option<PendingRequest> {
        self.lock().remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<RequestDescriptor> {
        self.lock().get(id).map(|entry| entry.descriptor.clone())
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids = self.lock().keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every entry submitted more than `ttl` before `now` and returns the
    /// dropped ids, oldest first.
    pub fn sweep_expired(&self, now: Instant, ttl: Duration) -> Vec<String> {
        let Some(cutoff) = now.checked_sub(ttl) else {
            return Vec::new();
        };

        let mut guard = self.lock();
        let mut expired = guard
            .iter()
            .filter(|(_, entry)| entry.submitted_at < cutoff)
            .map(|(id, entry)| (entry.submitted_at, id.clone()))
            .collect::<Vec<_>>();
        expired.sort();
        for (_, id) in &expired {
            guard.remove(id);
        }
        expired.into_iter().map(|(_, id)| id).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
