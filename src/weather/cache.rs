use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::weather::models::ForecastEntry;

/// Time- and capacity-bounded forecast cache keyed by node id. Entries age
/// out by fetch time; at capacity the oldest-fetched entry is evicted first.
/// Each operation holds the lock across its whole read-check-evict-write
/// sequence.
pub struct ForecastCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, ForecastEntry>>,
}

impl ForecastCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached entry if it is still within its TTL; an expired
    /// entry is removed on access.
    pub async fn get(&self, node_id: &str) -> Option<ForecastEntry> {
        let mut entries = self.entries.lock().await;
        match entries.get(node_id) {
            Some(entry) if Utc::now() - entry.fetched_at <= self.ttl => Some(entry.clone()),
            Some(_) => {
                debug!(node_id, "Cached forecast expired; evicting.");
                entries.remove(node_id);
                None
            }
            None => None,
        }
    }

    /// Inserts an entry, evicting the oldest-fetched one first when a new
    /// key would push the cache over capacity.
    pub async fn put(&self, node_id: &str, entry: ForecastEntry) {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(node_id) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                debug!(node_id = %key, "Forecast cache at capacity; evicting oldest entry.");
                entries.remove(&key);
            }
        }
        entries.insert(node_id.to_string(), entry);
    }

    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::models::WeatherForecast;
    use chrono::{DateTime, Utc};

    fn forecast(node_id: &str) -> WeatherForecast {
        WeatherForecast {
            node_id: node_id.to_string(),
            location_name: "Bed".to_string(),
            lat: 0.0,
            lon: 0.0,
            forecast_hours: 24,
            precipitation_expected: false,
            precipitation_probability: 0.0,
            precipitation_amount_mm: 0.0,
            precipitation_types: Vec::new(),
            temperature_avg: None,
            description: "No significant precipitation expected".to_string(),
        }
    }

    fn entry(node_id: &str, fetched_at: DateTime<Utc>) -> ForecastEntry {
        ForecastEntry::new(forecast(node_id), fetched_at)
    }

    #[tokio::test]
    async fn fresh_entry_is_returned() {
        let cache = ForecastCache::new(Duration::minutes(30), 10);
        cache.put("!a", entry("!a", Utc::now())).await;
        assert!(cache.get("!a").await.is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_on_access() {
        let cache = ForecastCache::new(Duration::minutes(30), 10);
        cache
            .put("!a", entry("!a", Utc::now() - Duration::minutes(31)))
            .await;
        assert!(cache.get("!a").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn capacity_eviction_removes_oldest_fetched() {
        let cache = ForecastCache::new(Duration::hours(6), 2);
        let now = Utc::now();
        // "!b" is the oldest fetch even though it is not the oldest insert.
        cache.put("!a", entry("!a", now - Duration::minutes(5))).await;
        cache.put("!b", entry("!b", now - Duration::minutes(20))).await;
        cache.put("!c", entry("!c", now)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("!b").await.is_none());
        assert!(cache.get("!a").await.is_some());
        assert!(cache.get("!c").await.is_some());
    }

    #[tokio::test]
    async fn replacing_existing_key_does_not_evict() {
        let cache = ForecastCache::new(Duration::hours(6), 2);
        let now = Utc::now();
        cache.put("!a", entry("!a", now - Duration::minutes(10))).await;
        cache.put("!b", entry("!b", now - Duration::minutes(5))).await;
        cache.put("!a", entry("!a", now)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("!a").await.is_some());
        assert!(cache.get("!b").await.is_some());
    }

    #[tokio::test]
    async fn clear_reports_count() {
        let cache = ForecastCache::new(Duration::minutes(30), 10);
        cache.put("!a", entry("!a", Utc::now())).await;
        cache.put("!b", entry("!b", Utc::now())).await;
        assert_eq!(cache.clear().await, 2);
        assert!(cache.get("!a").await.is_none());
    }
}
