use crate::driver::{Driver, ObjectKey};
use crate::error::HubResult;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;

const AUTH_TIMESTAMP_KEY: &str = ".authTimestamp";

#[derive(Serialize, Deserialize)]
struct AuthTimestampDoc {
    timestamp: i64,
}

/// A bounded-capacity mapping from principal to a Unix-millis revocation
/// timestamp, backed by a persistent `<principal>/.authTimestamp` object in
/// the driver (§4.3). The in-memory LRU is guarded by a `std::sync::Mutex`
/// so the cache is safe to share behind an `Arc` across concurrent request
/// handlers.
pub struct RevocationClock {
    cache: Mutex<LruCache<String, i64>>,
    driver: Arc<dyn Driver>,
}

impl RevocationClock {
    pub fn new(driver: Arc<dyn Driver>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            driver,
        }
    }

    /// Returns the cached value if present; otherwise reads the driver key.
    /// A `DoesNotExist` driver response means the effective value is 0.
    pub async fn get(&self, principal: &str) -> HubResult<i64> {
        if let Some(cached) = self.cache.lock().unwrap().get(principal).copied() {
            return Ok(cached);
        }

        let key = ObjectKey {
            storage_top_level: principal.to_string(),
            path: AUTH_TIMESTAMP_KEY.to_string(),
        };
        let value = match crate::driver::read_to_bytes(self.driver.as_ref(), key).await {
            Ok(bytes) => {
                let doc: AuthTimestampDoc =
                    serde_json::from_slice(&bytes).unwrap_or(AuthTimestampDoc { timestamp: 0 });
                doc.timestamp
            }
            Err(e) if e.is_does_not_exist() => 0,
            Err(e) => return Err(e),
        };

        self.cache.lock().unwrap().put(principal.to_string(), value);
        Ok(value)
    }

    /// Sets the revocation timestamp for `principal`. Monotonic: a value
    /// lower than the current one is silently ignored.
    pub async fn set(&self, principal: &str, ts: i64) -> HubResult<()> {
        let current = self.get(principal).await?;
        if ts < current {
            return Ok(());
        }

        let key = ObjectKey {
            storage_top_level: principal.to_string(),
            path: AUTH_TIMESTAMP_KEY.to_string(),
        };
        let doc = AuthTimestampDoc { timestamp: ts };
        let body = serde_json::to_vec(&doc).expect("AuthTimestampDoc always serializes");
        let stream: crate::driver::WriteStream = Box::pin(std::io::Cursor::new(body.clone()));
        let req = crate::driver::WriteRequest {
            storage_top_level: principal.to_string(),
            path: AUTH_TIMESTAMP_KEY.to_string(),
            content_type: "application/json".to_string(),
            content_length: Some(body.len() as u64),
        };
        self.driver.perform_write(req, stream).await?;

        self.cache.lock().unwrap().put(principal.to_string(), ts);
        tracing::info!(principal, ts, "revocation clock bumped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryDriver;

    #[tokio::test]
    async fn defaults_to_zero_when_unset() {
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        let clock = RevocationClock::new(driver, 16);
        assert_eq!(clock.get("principal1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        let clock = RevocationClock::new(driver, 16);
        clock.set("principal1", 1000).await.unwrap();
        assert_eq!(clock.get("principal1").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn lower_timestamp_is_ignored() {
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        let clock = RevocationClock::new(driver, 16);
        clock.set("principal1", 1000).await.unwrap();
        clock.set("principal1", 500).await.unwrap();
        assert_eq!(clock.get("principal1").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn persists_across_cache_eviction() {
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        let clock = RevocationClock::new(driver.clone(), 1);
        clock.set("principal1", 1000).await.unwrap();
        // Evict principal1 from the bounded cache by touching a second key.
        clock.set("principal2", 1).await.unwrap();
        assert_eq!(clock.get("principal1").await.unwrap(), 1000);
    }
}
