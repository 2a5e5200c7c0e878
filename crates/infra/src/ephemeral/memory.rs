//! In-memory ephemeral store (dev profile and tests).
//!
//! Expiry is driven by the injected clock so tests control time. Atomicity
//! of the check-and-mutate operations is satisfied by holding the map lock
//! across each operation; no await point ever sits inside the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fleetgate_auth::{AuthResult, EphemeralStore};
use fleetgate_core::Clock;

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

pub struct InMemoryEphemeralStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryEphemeralStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        ttl.map(|ttl| self.clock.now() + chrono::Duration::seconds(ttl.as_secs() as i64))
    }

    /// Drop the entry if its TTL has lapsed; report whether a live entry
    /// remains.
    fn purge(&self, entries: &mut HashMap<String, Entry>, key: &str) -> bool {
        match entries.get(key) {
            Some(entry) => {
                let expired = entry
                    .expires_at
                    .is_some_and(|expires_at| expires_at <= self.clock.now());
                if expired {
                    entries.remove(key);
                }
                !expired
            }
            None => false,
        }
    }
}

#[async_trait]
impl EphemeralStore for InMemoryEphemeralStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Option<Duration>) -> AuthResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: self.expiry(ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AuthResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        if self.purge(&mut entries, key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: self.expiry(Some(ttl)),
            },
        );
        Ok(true)
    }

    async fn exists(&self, key: &str) -> AuthResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        Ok(self.purge(&mut entries, key))
    }

    async fn delete_if_present(&self, key: &str) -> AuthResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        if !self.purge(&mut entries, key) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }

    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        if !self.purge(&mut entries, key) {
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::ManualClock;

    use super::*;

    fn store() -> (InMemoryEphemeralStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
        (InMemoryEphemeralStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn ttl_expiry_is_clock_driven() {
        let (store, clock) = store();
        store
            .set_with_ttl("nonce", "1", Some(Duration::from_secs(300)))
            .await
            .unwrap();
        assert!(store.exists("nonce").await.unwrap());

        clock.advance(Duration::from_secs(301));
        assert!(!store.exists("nonce").await.unwrap());
        assert_eq!(store.get("nonce").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_is_single_winner() {
        let (store, _) = store();
        assert!(store.set_if_absent("jti", "1", Duration::from_secs(120)).await.unwrap());
        assert!(!store.set_if_absent("jti", "1", Duration::from_secs(120)).await.unwrap());
    }

    #[tokio::test]
    async fn expired_marker_can_be_reclaimed() {
        let (store, clock) = store();
        assert!(store.set_if_absent("jti", "1", Duration::from_secs(120)).await.unwrap());
        clock.advance(Duration::from_secs(121));
        assert!(store.set_if_absent("jti", "1", Duration::from_secs(120)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_if_present_reports_prior_existence() {
        let (store, _) = store();
        store.set_with_ttl("k", "v", None).await.unwrap();
        assert!(store.delete_if_present("k").await.unwrap());
        assert!(!store.delete_if_present("k").await.unwrap());
    }

    #[tokio::test]
    async fn no_ttl_means_no_expiry() {
        let (store, clock) = store();
        store.set_with_ttl("flag", "1", None).await.unwrap();
        clock.advance(Duration::from_secs(10_000_000));
        assert!(store.exists("flag").await.unwrap());
    }
}
