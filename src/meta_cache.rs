// Stack Sage: Meta Cache
// Per-format metagame snapshots with TTL bands: fresh under 24 hours, served
// stale up to 7 days, refetched beyond that.

use crate::config::{META_FRESH_TTL_SECS, META_STALE_HORIZON_SECS};
use crate::state::MetaEvidence;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// How old a cached snapshot is relative to the TTL bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

struct Entry {
    snapshot: MetaEvidence,
    stored_at: DateTime<Utc>,
}

/// Process-wide snapshot cache. Entries survive across requests and are
/// rebuilt on restart.
pub struct MetaCache {
    entries: Mutex<HashMap<String, Entry>>,
    fresh_ttl: Duration,
    stale_horizon: Duration,
}

impl Default for MetaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fresh_ttl: Duration::seconds(META_FRESH_TTL_SECS),
            stale_horizon: Duration::seconds(META_STALE_HORIZON_SECS),
        }
    }

    /// Look up a snapshot together with its freshness band. Entries past the
    /// stale horizon report `Expired` and should be refetched.
    pub fn get(&self, format: &str) -> Option<(MetaEvidence, Freshness)> {
        self.get_at(format, Utc::now())
    }

    fn get_at(&self, format: &str, now: DateTime<Utc>) -> Option<(MetaEvidence, Freshness)> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(&format.to_lowercase())?;
        let age = now - entry.stored_at;

        let freshness = if age <= self.fresh_ttl {
            Freshness::Fresh
        } else if age <= self.stale_horizon {
            Freshness::Stale
        } else {
            Freshness::Expired
        };
        Some((entry.snapshot.clone(), freshness))
    }

    pub fn insert(&self, format: &str, snapshot: MetaEvidence) {
        self.insert_at(format, snapshot, Utc::now());
    }

    fn insert_at(&self, format: &str, snapshot: MetaEvidence, stored_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(format.to_lowercase(), Entry { snapshot, stored_at });
        log::debug!("cached meta snapshot for '{}'", format.to_lowercase());
    }

    pub fn clear(&self, format: Option<&str>) {
        let mut entries = self.entries.lock().unwrap();
        match format {
            Some(f) => {
                entries.remove(&f.to_lowercase());
            }
            None => entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(format: &str) -> MetaEvidence {
        MetaEvidence {
            format: format.to_string(),
            snapshot_date: Utc::now(),
            summary: "aggro is everywhere".to_string(),
            sources: Vec::new(),
            stale: false,
        }
    }

    #[test]
    fn test_freshness_bands() {
        let cache = MetaCache::new();
        let now = Utc::now();
        cache.insert_at("modern", snapshot("modern"), now);

        let (_, fresh) = cache.get_at("modern", now + Duration::hours(1)).unwrap();
        assert_eq!(fresh, Freshness::Fresh);

        let (_, stale) = cache.get_at("modern", now + Duration::hours(48)).unwrap();
        assert_eq!(stale, Freshness::Stale);

        let (_, expired) = cache.get_at("modern", now + Duration::days(8)).unwrap();
        assert_eq!(expired, Freshness::Expired);
    }

    #[test]
    fn test_keys_are_case_folded() {
        let cache = MetaCache::new();
        cache.insert("Standard", snapshot("standard"));
        assert!(cache.get("STANDARD").is_some());
    }

    #[test]
    fn test_missing_format() {
        let cache = MetaCache::new();
        assert!(cache.get("pauper").is_none());
    }
}
