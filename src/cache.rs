//! Optional read-through cache for catalog lookups.
//!
//! Keys are `royal:<namespace>:<operation>:<args>`. A disabled cache, a
//! missing entry and an entry that no longer decodes all behave as a miss,
//! so callers always fall back to the store.

use std::{future::Future, time::Duration};

use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

const KEY_ROOT: &str = "royal";
const MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
pub struct ResponseCache {
    inner: Option<Cache<String, Value>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(ttl)
            .build();
        Self { inner: Some(cache) }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn key(namespace: &str, operation: &str, args: &str) -> String {
        format!("{KEY_ROOT}:{namespace}:{operation}:{args}")
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.inner.as_ref()?;
        let value = cache.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => {
                log::debug!("Cache hit: {key}");
                Some(decoded)
            }
            Err(err) => {
                log::warn!("Cache entry {key} did not decode: {err}");
                cache.invalidate(key).await;
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: String, value: &T) {
        let Some(cache) = self.inner.as_ref() else {
            return;
        };
        match serde_json::to_value(value) {
            Ok(encoded) => cache.insert(key, encoded).await,
            Err(err) => log::warn!("Cache store skipped for {key}: {err}"),
        }
    }

    /// Returns the cached value or runs `load` and stores its success.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: String, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }
        let value = load().await?;
        self.put(key, &value).await;
        Ok(value)
    }

    /// Drops every entry under `namespace`.
    pub async fn invalidate(&self, namespace: &str) {
        let Some(cache) = self.inner.as_ref() else {
            return;
        };
        let prefix = format!("{KEY_ROOT}:{namespace}:");
        let stale: Vec<String> = cache
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.to_string())
            .collect();
        for key in &stale {
            cache.invalidate(key).await;
        }
        log::info!("Invalidated {} cache entries for prefix: {namespace}", stale.len());
    }
}
