//! Live-state lookups (`spec.md §4.5`): entity state enrichment prefers a
//! time-series store when configured, falling back to the controller's
//! current-state snapshot, with a short TTL cache in front of both.

use crate::error::Result;
use async_trait::async_trait;
use hearth_core::EntityState;
use hearth_utils::TtlCache;
use std::time::Duration;

/// Reads current or recent entity state from the underlying controller.
#[async_trait]
pub trait LiveStateService: Send + Sync {
    /// Look up the controller's current snapshot for `entity_id`.
    async fn current_state(&self, entity_id: &str) -> Result<Option<EntityState>>;

    /// Look up the most recent time-series sample for `entity_id`, if a
    /// time-series backend is configured. Implementations without one should
    /// return `Ok(None)` so callers fall back to [`Self::current_state`].
    async fn latest_time_series_sample(&self, entity_id: &str) -> Result<Option<EntityState>>;
}

/// Wraps a [`LiveStateService`] with a short-lived cache, since C8/C9 retrieval
/// can ask for the same entity's state many times within a single request.
pub struct CachedLiveState<S: LiveStateService> {
    inner: S,
    cache: TtlCache<String, EntityState>,
}

impl<S: LiveStateService> CachedLiveState<S> {
    /// Wrap `inner`, caching each resolved state for `ttl`.
    #[must_use]
    pub fn new(inner: S, ttl: Duration, max_entries: usize) -> Self {
        Self { inner, cache: TtlCache::new(ttl, max_entries) }
    }

    /// Resolve the best-known state for `entity_id`: a cached value if fresh,
    /// else the time-series sample if available, else the current snapshot.
    pub async fn resolve(&self, entity_id: &str) -> Result<Option<EntityState>> {
        if let Some(cached) = self.cache.get(&entity_id.to_string()) {
            return Ok(Some(cached));
        }
        let resolved = match self.inner.latest_time_series_sample(entity_id).await? {
            Some(state) => Some(state),
            None => self.inner.current_state(entity_id).await?,
        };
        if let Some(ref state) = resolved {
            self.cache.insert(entity_id.to_string(), state.clone());
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingService {
        time_series_calls: Arc<AtomicUsize>,
        time_series_value: Option<EntityState>,
    }

    #[async_trait]
    impl LiveStateService for CountingService {
        async fn current_state(&self, _entity_id: &str) -> Result<Option<EntityState>> {
            Ok(Some(EntityState {
                state: "fallback".to_string(),
                unit: None,
                attributes: serde_json::json!({}),
            }))
        }

        async fn latest_time_series_sample(&self, _entity_id: &str) -> Result<Option<EntityState>> {
            self.time_series_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.time_series_value.clone())
        }
    }

    #[tokio::test]
    async fn prefers_time_series_sample_when_present() {
        let service = CountingService {
            time_series_calls: Arc::new(AtomicUsize::new(0)),
            time_series_value: Some(EntityState {
                state: "22.5".to_string(),
                unit: Some("C".to_string()),
                attributes: serde_json::json!({}),
            }),
        };
        let cached = CachedLiveState::new(service, Duration::from_secs(30), 64);
        let resolved = cached.resolve("sensor.kert_homerseklet").await.unwrap().unwrap();
        assert_eq!(resolved.state, "22.5");
    }

    #[tokio::test]
    async fn falls_back_to_current_state_without_time_series() {
        let service = CountingService {
            time_series_calls: Arc::new(AtomicUsize::new(0)),
            time_series_value: None,
        };
        let cached = CachedLiveState::new(service, Duration::from_secs(30), 64);
        let resolved = cached.resolve("sensor.kert_homerseklet").await.unwrap().unwrap();
        assert_eq!(resolved.state, "fallback");
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = CountingService {
            time_series_calls: calls.clone(),
            time_series_value: Some(EntityState {
                state: "1".to_string(),
                unit: None,
                attributes: serde_json::json!({}),
            }),
        };
        let cached = CachedLiveState::new(service, Duration::from_secs(30), 64);
        cached.resolve("sensor.x").await.unwrap();
        cached.resolve("sensor.x").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
