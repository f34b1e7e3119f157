use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use webclick_core::{normalize_url, ChildLink};
use webclick_logging::{webclick_debug, webclick_trace};

use crate::resolve::{LinkResolver, ResolveError};

/// The complete children list of one resolved page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub links: Vec<ChildLink>,
    pub fetched_at: DateTime<Utc>,
}

type Resolution = Shared<BoxFuture<'static, Result<Arc<CacheEntry>, ResolveError>>>;

enum Slot {
    Ready(Arc<CacheEntry>),
    InFlight(Resolution),
}

/// Single-flight memo of link resolutions keyed by normalized URL.
///
/// An entry is either absent, in flight, or complete. Callers that arrive
/// while a resolution is in flight await that same resolution. Failures are
/// handed to everyone who joined them and then forgotten, so the next call
/// fetches again.
pub struct DiscoveryCache {
    resolver: Arc<dyn LinkResolver>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl DiscoveryCache {
    pub fn new(resolver: Arc<dyn LinkResolver>) -> Self {
        Self {
            resolver,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Completed entry for `url`, if any.
    pub fn get(&self, url: &str) -> Option<Arc<CacheEntry>> {
        let key = normalize_url(url).ok()?;
        match self.slots().get(&key) {
            Some(Slot::Ready(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    pub async fn get_or_resolve(&self, url: &str) -> Result<Arc<CacheEntry>, ResolveError> {
        let key = normalize_url(url)?;
        let resolution = {
            let mut slots = self.slots();
            match slots.get(&key) {
                Some(Slot::Ready(entry)) => {
                    webclick_debug!("discovery cache hit for {key}");
                    return Ok(entry.clone());
                }
                Some(Slot::InFlight(pending)) => {
                    webclick_trace!("joining in-flight resolution of {key}");
                    pending.clone()
                }
                None => {
                    webclick_debug!("discovery cache miss for {key}");
                    let pending = self.start(key.clone());
                    slots.insert(key.clone(), Slot::InFlight(pending.clone()));
                    pending
                }
            }
        };

        let result = resolution.clone().await;

        let mut slots = self.slots();
        let settled_here = matches!(
            slots.get(&key),
            Some(Slot::InFlight(pending)) if pending.ptr_eq(&resolution)
        );
        if settled_here {
            match &result {
                Ok(entry) => {
                    slots.insert(key, Slot::Ready(entry.clone()));
                }
                Err(_) => {
                    slots.remove(&key);
                }
            }
        }
        result
    }

    /// Forgets every entry. In-flight resolutions still answer their callers
    /// but are not stored.
    pub fn clear(&self) {
        let mut slots = self.slots();
        webclick_debug!("clearing {} discovery cache slots", slots.len());
        slots.clear();
    }

    /// Number of completed entries.
    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start(&self, key: String) -> Resolution {
        let resolver = self.resolver.clone();
        async move {
            let links = resolver.resolve(&key).await?;
            Ok(Arc::new(CacheEntry {
                url: key,
                links,
                fetched_at: Utc::now(),
            }))
        }
        .boxed()
        .shared()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
