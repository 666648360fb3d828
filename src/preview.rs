//! Preview resources
//!
//! Renderable references (`blob:bgtify/<uuid>`) to image payloads, the
//! equivalent of browser object URLs. Every reference is acquired as a
//! [`PreviewLease`] that revokes itself on drop unless committed, so a run that
//! fails half-way through building its previews leaks nothing.

use crate::error::{BgtifyError, Result};
use crate::types::MediaType;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// URL scheme prefix of every preview reference
pub const PREVIEW_URL_PREFIX: &str = "blob:bgtify/";

/// Default bound on simultaneously live previews
pub const DEFAULT_PREVIEW_CAPACITY: usize = 64;

/// A payload reachable through a preview URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewResource {
    pub media_type: MediaType,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug, Default)]
struct Registry {
    live: HashMap<String, PreviewResource>,
    created: u64,
    revoked: u64,
}

/// Shared registry of live preview references
#[derive(Debug, Clone)]
pub struct PreviewStore {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
}

impl Default for PreviewStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PREVIEW_CAPACITY)
    }
}

impl PreviewStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store refusing to hold more than `capacity` live previews
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            capacity,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a payload and return an uncommitted lease on its URL
    ///
    /// # Errors
    /// - Empty payload
    /// - Store at capacity
    pub fn create(&self, media_type: MediaType, bytes: Arc<[u8]>) -> Result<PreviewLease> {
        if bytes.is_empty() {
            return Err(BgtifyError::preview("Cannot build a preview from an empty payload"));
        }

        let mut registry = self.registry();
        if registry.live.len() >= self.capacity {
            return Err(BgtifyError::preview(format!(
                "Preview limit reached ({} live references)",
                self.capacity
            )));
        }

        let url = format!("{PREVIEW_URL_PREFIX}{}", Uuid::new_v4());
        registry
            .live
            .insert(url.clone(), PreviewResource { media_type, bytes });
        registry.created += 1;
        drop(registry);

        tracing::trace!(%url, "Preview created");
        Ok(PreviewLease {
            store: self.clone(),
            url: Some(url),
        })
    }

    /// Release a reference. Returns `false` if it was not live.
    pub fn revoke(&self, url: &str) -> bool {
        let mut registry = self.registry();
        let removed = registry.live.remove(url).is_some();
        if removed {
            registry.revoked += 1;
            tracing::trace!(%url, "Preview revoked");
        }
        removed
    }

    /// Look up the payload behind a live reference
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<PreviewResource> {
        self.registry().live.get(url).cloned()
    }

    #[must_use]
    pub fn is_live(&self, url: &str) -> bool {
        self.registry().live.contains_key(url)
    }

    /// Number of references currently live
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.registry().live.len()
    }

    /// Lifetime (created, revoked) counters
    #[must_use]
    pub fn totals(&self) -> (u64, u64) {
        let registry = self.registry();
        (registry.created, registry.revoked)
    }
}

/// Scoped ownership of a preview reference; revoked on drop unless committed
#[derive(Debug)]
pub struct PreviewLease {
    store: PreviewStore,
    url: Option<String>,
}

impl PreviewLease {
    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }

    /// Keep the reference alive past the lease; the caller now owns revocation
    #[must_use]
    pub fn commit(mut self) -> String {
        self.url.take().unwrap_or_default()
    }
}

impl Drop for PreviewLease {
    fn drop(&mut self) {
        if let Some(url) = self.url.take() {
            self.store.revoke(&url);
        }
    }
}
