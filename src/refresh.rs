//! Background Refresh Module
//!
//! Stale-while-revalidate on top of a shared [`CacheStore`](crate::cache::CacheStore):
//! callers get whatever is cached right away while at most one fetch per
//! key refreshes it in the background.

use std::future::Future;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::cache::SharedCache;

type SuccessHook<V> = Box<dyn FnOnce(&V) + Send>;
type ErrorHook = Box<dyn FnOnce(&anyhow::Error) + Send>;

// == Refresh Hooks ==
/// Optional callbacks run when a background fetch settles.
pub struct RefreshHooks<V> {
    on_success: Option<SuccessHook<V>>,
    on_error: Option<ErrorHook>,
}

impl<V> RefreshHooks<V> {
    pub fn new() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }

    /// Called with the fresh value after it has been stored.
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&V) + Send + 'static,
    {
        self.on_success = Some(Box::new(hook));
        self
    }

    /// Called with the fetch error. Without it failures are logged.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&anyhow::Error) + Send + 'static,
    {
        self.on_error = Some(Box::new(hook));
        self
    }
}

impl<V> Default for RefreshHooks<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the in-flight mark however the refresh task ends, panics included.
struct InFlightGuard<V> {
    cache: SharedCache<V>,
    key: String,
}

impl<V> Drop for InFlightGuard<V> {
    fn drop(&mut self) {
        self.cache.lock().finish_refresh(&self.key);
    }
}

// == Refresh Coordinator ==
pub struct RefreshCoordinator<V> {
    cache: SharedCache<V>,
}

impl<V> Clone for RefreshCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<V> RefreshCoordinator<V>
where
    V: Clone + Send + 'static,
{
    pub fn new(cache: SharedCache<V>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &SharedCache<V> {
        &self.cache
    }

    // == Refresh In Background ==
    /// Returns the cached value for `key`, fresh or stale, and starts
    /// `fetch` in the background when the entry is missing or expired.
    pub fn refresh_in_background<F, Fut>(&self, key: &str, fetch: F) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.refresh_with_hooks(key, fetch, RefreshHooks::new())
    }

    /// Same as [`refresh_in_background`](Self::refresh_in_background) with
    /// success/error callbacks.
    ///
    /// Never blocks on the fetch. A failed fetch leaves the stale entry in
    /// place; a fetch that finishes after its key was evicted re-inserts it.
    pub fn refresh_with_hooks<F, Fut>(&self, key: &str, fetch: F, hooks: RefreshHooks<V>) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let (stale, runtime) = {
            let mut store = self.cache.lock();

            let (stale, fresh) = match store.peek_entry(key) {
                Some(entry) => (Some(entry.value.clone()), !entry.is_expired()),
                None => (None, false),
            };

            if fresh || store.is_refreshing(key) {
                return stale;
            }

            let runtime = match Handle::try_current() {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Skipping background refresh of '{}': {}", key, e);
                    return stale;
                }
            };

            store.begin_refresh(key);
            (stale, runtime)
        };

        let guard = InFlightGuard {
            cache: self.cache.clone(),
            key: key.to_string(),
        };

        debug!("Starting background refresh of '{}'", key);
        let future = fetch();
        let cache = self.cache.clone();
        let key = key.to_string();

        runtime.spawn(async move {
            let _guard = guard;

            match future.await {
                Ok(value) => {
                    let stored = cache.lock().set(key.clone(), value.clone(), None);
                    match stored {
                        Ok(()) => {
                            debug!("Background refresh of '{}' stored a fresh value", key);
                            if let Some(hook) = hooks.on_success {
                                hook(&value);
                            }
                        }
                        Err(e) => warn!("Background refresh of '{}' not stored: {}", key, e),
                    }
                }
                Err(e) => match hooks.on_error {
                    Some(hook) => hook(&e),
                    None => warn!("Background refresh of '{}' failed: {:#}", key, e),
                },
            }
        });

        stale
    }
}
