use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::SchemaDocument;
use crate::error::SearchError;

/// A published schema snapshot and when it was discovered.
struct Slot {
    document: Arc<SchemaDocument>,
    discovered_at: Instant,
}

/// Process-wide schema snapshots, one per visibility level.
///
/// Published documents are never mutated; a refresh swaps the `Arc` in the slot,
/// so readers holding an older snapshot keep a consistent view.
pub struct SchemaCache {
    ttl: Option<Duration>,
    standard: RwLock<Option<Slot>>,
    elevated: RwLock<Option<Slot>>,
}

impl SchemaCache {
    /// `ttl` of `None` keeps snapshots until [`invalidate`](Self::invalidate).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            standard: RwLock::new(None),
            elevated: RwLock::new(None),
        }
    }

    /// Cache with a TTL in seconds; `0` disables caching entirely.
    pub fn from_ttl_secs(secs: u64) -> Self {
        Self::new(Some(Duration::from_secs(secs)))
    }

    fn slot(&self, elevated: bool) -> &RwLock<Option<Slot>> {
        if elevated {
            &self.elevated
        } else {
            &self.standard
        }
    }

    fn is_fresh(&self, slot: &Slot) -> bool {
        match self.ttl {
            Some(ttl) => slot.discovered_at.elapsed() < ttl,
            None => true,
        }
    }

    /// Current snapshot, if one exists and has not expired.
    pub fn get(&self, elevated: bool) -> Option<Arc<SchemaDocument>> {
        let guard = self.slot(elevated).read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|slot| self.is_fresh(slot))
            .map(|slot| Arc::clone(&slot.document))
    }

    /// Publish a new snapshot, replacing the previous one atomically.
    pub fn install(&self, elevated: bool, document: SchemaDocument) -> Arc<SchemaDocument> {
        let document = Arc::new(document);
        let mut guard = self.slot(elevated).write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Slot {
            document: Arc::clone(&document),
            discovered_at: Instant::now(),
        });
        document
    }

    /// Return the cached snapshot or run `discover` and publish its result.
    /// A failed discovery leaves the previous slot untouched.
    pub fn get_or_discover<F>(&self, elevated: bool, discover: F) -> Result<Arc<SchemaDocument>, SearchError>
    where
        F: FnOnce() -> Result<SchemaDocument, SearchError>,
    {
        if let Some(document) = self.get(elevated) {
            tracing::debug!(elevated, entities = document.len(), "Schema cache hit");
            return Ok(document);
        }
        let document = discover()?;
        Ok(self.install(elevated, document))
    }

    pub fn invalidate(&self) {
        for slot in [&self.standard, &self.elevated] {
            *slot.write().unwrap_or_else(|e| e.into_inner()) = None;
        }
        tracing::debug!("Schema cache invalidated");
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityType;

    fn doc(ids: &[&str]) -> SchemaDocument {
        ids.iter().map(|id| EntityType::new(*id, *id, vec![])).collect()
    }

    #[test]
    fn test_discovers_once() {
        let cache = SchemaCache::default();
        let mut calls = 0;
        for _ in 0..3 {
            let d = cache
                .get_or_discover(false, || {
                    calls += 1;
                    Ok(doc(&["res.partner"]))
                })
                .unwrap();
            assert!(d.contains("res.partner"));
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_levels_are_separate() {
        let cache = SchemaCache::default();
        cache.install(false, doc(&["res.partner"]));
        cache.install(true, doc(&["res.partner", "ir.model"]));
        assert_eq!(cache.get(false).unwrap().len(), 1);
        assert_eq!(cache.get(true).unwrap().len(), 2);
    }

    #[test]
    fn test_install_does_not_touch_published_snapshot() {
        let cache = SchemaCache::default();
        let old = cache.install(false, doc(&["res.partner"]));
        cache.install(false, doc(&["res.partner", "res.users"]));
        assert_eq!(old.len(), 1);
        assert_eq!(cache.get(false).unwrap().len(), 2);
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache = SchemaCache::from_ttl_secs(0);
        cache.install(false, doc(&["res.partner"]));
        assert!(cache.get(false).is_none());
    }

    #[test]
    fn test_failed_discovery_keeps_nothing() {
        let cache = SchemaCache::default();
        let err = cache
            .get_or_discover(false, || Err(SearchError::Execution("boom".into())))
            .unwrap_err();
        assert_eq!(err.kind(), "execution");
        assert!(cache.get(false).is_none());

        cache.install(false, doc(&["a.b"]));
        cache.invalidate();
        assert!(cache.get(false).is_none());
    }
}
