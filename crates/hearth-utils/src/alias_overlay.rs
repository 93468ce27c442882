//! Merges the static area pattern table with a TTL-refreshed, DB-sourced alias
//! list (`spec.md §4.2` step 2, §3 "alias tables ... refresh-on-TTL cache").

use crate::patterns::area_patterns;
use crate::ttl_cache::TtlCache;
use std::collections::HashMap;
use std::time::Duration;

/// Source of additional, dynamically-discovered area aliases (e.g. entities whose
/// `text` embeds an `Aliases: ...` section). The core only ever reads from it.
pub trait AliasSource: Send + Sync {
    /// Fetch the current area → extra-alias map. May be expensive; callers cache
    /// the result behind the configured TTL.
    fn load_area_aliases(&self) -> HashMap<String, Vec<String>>;
}

/// An [`AliasSource`] that contributes nothing extra (static patterns only).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAliasSource;

impl AliasSource for NoopAliasSource {
    fn load_area_aliases(&self) -> HashMap<String, Vec<String>> {
        HashMap::new()
    }
}

/// Read-through cache combining the static area table with a refreshable alias
/// source. A single cache slot ("area_aliases") is refreshed whenever it expires.
pub struct AliasOverlay<S: AliasSource> {
    source: S,
    cache: TtlCache<&'static str, HashMap<String, Vec<String>>>,
}

const CACHE_KEY: &str = "area_aliases";

impl<S: AliasSource> AliasOverlay<S> {
    /// Build an overlay refreshing from `source` no more often than `ttl`.
    #[must_use]
    pub fn new(source: S, ttl: Duration) -> Self {
        Self { source, cache: TtlCache::new(ttl, 1) }
    }

    /// Return the merged area → patterns map, refreshing from the alias source if
    /// the cached copy has expired.
    pub fn area_patterns(&self) -> HashMap<String, Vec<String>> {
        if let Some(cached) = self.cache.get(&CACHE_KEY) {
            return cached;
        }
        let mut merged: HashMap<String, Vec<String>> = area_patterns()
            .into_iter()
            .map(|(area, patterns)| {
                (area.to_string(), patterns.into_iter().map(str::to_string).collect())
            })
            .collect();
        for (area, extra) in self.source.load_area_aliases() {
            let entry = merged.entry(area).or_default();
            for alias in extra {
                if !entry.contains(&alias) {
                    entry.push(alias);
                }
            }
        }
        self.cache.insert(CACHE_KEY, merged.clone());
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource;
    impl AliasSource for FakeSource {
        fn load_area_aliases(&self) -> HashMap<String, Vec<String>> {
            HashMap::from([("kert".to_string(), vec!["backyard".to_string()])])
        }
    }

    #[test]
    fn merges_static_and_dynamic_aliases() {
        let overlay = AliasOverlay::new(FakeSource, Duration::from_secs(60));
        let merged = overlay.area_patterns();
        assert!(merged["kert"].contains(&"kert".to_string()));
        assert!(merged["kert"].contains(&"backyard".to_string()));
    }

    #[test]
    fn noop_source_keeps_static_patterns_only() {
        let overlay = AliasOverlay::new(NoopAliasSource, Duration::from_secs(60));
        let merged = overlay.area_patterns();
        assert!(merged.contains_key("kert"));
        assert_eq!(merged["kert"].iter().filter(|p| *p == "backyard").count(), 0);
    }

    #[test]
    fn second_read_is_served_from_cache() {
        let overlay = AliasOverlay::new(FakeSource, Duration::from_secs(60));
        let first = overlay.area_patterns();
        let second = overlay.area_patterns();
        assert_eq!(first, second);
    }
}
