//! Cache coordination for campaign views.
//!
//! Reads go through [`CacheCoordinator::read`]: a hit is returned as stored,
//! without consulting the ledger; a miss runs the supplied computation and
//! stores its result for the configured TTL. Any successful ledger write calls
//! [`CacheCoordinator::invalidate_all`], which drops every key under
//! [`VIEW_PREFIX`]. Aggregate views can contain any campaign, so there is no
//! narrower set that is known to be safe.
//!
//! Cache trouble never fails a request. An unreachable store degrades to
//! direct computation and an entry that does not decode counts as a miss.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::errors::Result;

/// Namespace shared by every cached campaign view.
pub const VIEW_PREFIX: &str = "campaigns:";

/// Deterministic cache key for one query shape and its parameters.
///
/// Parameterised keys put the variable-length parameter last, after a fixed
/// numeric segment where there is one, so distinct parameters never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    All,
    LatestActive,
    Category(u64),
    Owner(String),
    Single { id: u64, viewer: String },
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "{VIEW_PREFIX}all"),
            Self::LatestActive => write!(f, "{VIEW_PREFIX}latest_active"),
            Self::Category(id) => write!(f, "{VIEW_PREFIX}category:{id}"),
            Self::Owner(address) => write!(f, "{VIEW_PREFIX}owner:{address}"),
            Self::Single { id, viewer } => write!(f, "{VIEW_PREFIX}one:{id}:viewer:{viewer}"),
        }
    }
}

#[derive(Clone)]
pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Serve `key` from the cache, or compute, store and return it.
    ///
    /// `None` marks an uncached shape and always computes.
    pub async fn read<T, F, Fut>(&self, key: Option<&CacheKey>, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(key) = key else {
            return compute().await;
        };
        let key = key.to_string();

        if let Some(hit) = self.lookup(&key).await {
            return Ok(hit);
        }

        let value = compute().await?;
        self.remember(&key, &value).await;
        Ok(value)
    }

    /// Drop every cached campaign view.
    pub async fn invalidate_all(&self) {
        match self.store.invalidate_prefix(VIEW_PREFIX).await {
            Ok(n) => info!("Invalidated {n} cached campaign views"),
            Err(e) => warn!("Cache invalidation failed; entries expire by TTL: {e}"),
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, "Discarding undecodable cache entry: {e}");
                    None
                }
            },
            Ok(None) => {
                debug!(key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key, "Cache read failed, computing directly: {e}");
                None
            }
        }
    }

    async fn remember<T: Serialize>(&self, key: &str, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, "Not caching unserialisable view: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(key, bytes, self.ttl).await {
            warn!(key, "Cache write failed: {e}");
        }
    }
}
