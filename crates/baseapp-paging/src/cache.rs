#![forbid(unsafe_code)]

//! Local object cache seam and reset-time reconciliation.
//!
//! A reset fetch asks the cache to drop items the fresh first page no longer
//! reports. Which items qualify is decided by the paginator's
//! [`CleanPolicy`]. The cache is touched nowhere else by the pagination
//! engine.
//!
//! Implementations own their mutation-safe context: `query` and `delete` may
//! be called from a fetch worker thread and must serialize internally.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{CacheError, ReconcileError};

/// Stable identity of a cached entity.
pub trait Identified {
    type Id: Eq + Hash + Clone + fmt::Debug;

    fn id(&self) -> Self::Id;
}

/// Local store of previously fetched entities.
pub trait LocalCache<T>: Send + Sync + 'static {
    /// All cached items matching `predicate`.
    fn query(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, CacheError>;

    /// Remove `item`. Removing an absent item succeeds.
    fn delete(&self, item: &T) -> Result<(), CacheError>;
}

impl<T, C: LocalCache<T>> LocalCache<T> for Arc<C> {
    fn query(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, CacheError> {
        (**self).query(predicate)
    }

    fn delete(&self, item: &T) -> Result<(), CacheError> {
        (**self).delete(item)
    }
}

/// Predicate deciding which cached items a reset fetch removes.
///
/// `Custom` receives a cached item and the freshly fetched page and returns
/// `true` when the cached item should be removed.
pub enum CleanPolicy<T> {
    /// Remove every cached item whose id is absent from the fresh page.
    RemoveStale,
    /// Never remove anything.
    KeepAll,
    Custom(Arc<dyn Fn(&T, &[T]) -> bool + Send + Sync>),
}

impl<T> Default for CleanPolicy<T> {
    fn default() -> Self {
        Self::RemoveStale
    }
}

impl<T> Clone for CleanPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            Self::RemoveStale => Self::RemoveStale,
            Self::KeepAll => Self::KeepAll,
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for CleanPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveStale => write!(f, "RemoveStale"),
            Self::KeepAll => write!(f, "KeepAll"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl<T> CleanPolicy<T> {
    pub fn custom(predicate: impl Fn(&T, &[T]) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }
}

/// Remove cached items the policy marks stale against `fresh`.
///
/// Every stale item is attempted even after a failure; successful deletions
/// are not rolled back. Returns the number removed.
pub fn reconcile<T: Identified + 'static>(
    cache: &dyn LocalCache<T>,
    policy: &CleanPolicy<T>,
    fresh: &[T],
) -> Result<usize, ReconcileError> {
    let stale = match policy {
        CleanPolicy::KeepAll => return Ok(0),
        CleanPolicy::RemoveStale => {
            let keep: HashSet<T::Id> = fresh.iter().map(Identified::id).collect();
            cache.query(&|item: &T| !keep.contains(&item.id()))
        }
        CleanPolicy::Custom(predicate) => cache.query(&|item: &T| predicate(item, fresh)),
    }
    .map_err(|cause| ReconcileError {
        removed: 0,
        failed: 0,
        cause,
    })?;

    let mut removed = 0;
    let mut failed = 0;
    let mut first_failure = None;
    for item in &stale {
        match cache.delete(item) {
            Ok(()) => removed += 1,
            Err(err) => {
                warn!(id = ?item.id(), error = %err, "stale cache entry not removed");
                failed += 1;
                first_failure.get_or_insert(err);
            }
        }
    }

    match first_failure {
        None => {
            debug!(removed, "cache reconciled");
            Ok(removed)
        }
        Some(cause) => Err(ReconcileError {
            removed,
            failed,
            cause,
        }),
    }
}

/// Cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl<T: 'static> LocalCache<T> for NoCache {
    fn query(&self, _predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, CacheError> {
        Ok(Vec::new())
    }

    fn delete(&self, _item: &T) -> Result<(), CacheError> {
        Ok(())
    }
}

/// In-memory cache keyed by [`Identified::id`], in insertion order.
#[derive(Debug)]
pub struct MemoryCache<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Identified + Clone> MemoryCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item`, replacing any entry with the same id in place.
    pub fn insert(&self, item: T) {
        let mut items = self.lock();
        let id = item.id();
        match items.iter_mut().find(|existing| existing.id() == id) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.insert(item);
        }
    }

    #[must_use]
    pub fn contains(&self, id: &T::Id) -> bool {
        self.lock().iter().any(|item| &item.id() == id)
    }

    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> LocalCache<T> for MemoryCache<T>
where
    T: Identified + Clone + Send + 'static,
{
    fn query(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, CacheError> {
        let items = self
            .items
            .lock()
            .map_err(|_| CacheError::new("memory cache lock poisoned"))?;
        Ok(items.iter().filter(|item| predicate(item)).cloned().collect())
    }

    fn delete(&self, item: &T) -> Result<(), CacheError> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| CacheError::new("memory cache lock poisoned"))?;
        let id = item.id();
        items.retain(|existing| existing.id() != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(u32);

    impl Identified for Item {
        type Id = u32;

        fn id(&self) -> u32 {
            self.0
        }
    }

    fn cache_with(ids: &[u32]) -> MemoryCache<Item> {
        let cache = MemoryCache::new();
        cache.extend(ids.iter().copied().map(Item));
        cache
    }

    fn ids(cache: &MemoryCache<Item>) -> Vec<u32> {
        cache.items().into_iter().map(|i| i.0).collect()
    }

    /// Deletes fail for the listed ids.
    struct Flaky {
        inner: MemoryCache<Item>,
        fail_on: Vec<u32>,
    }

    impl LocalCache<Item> for Flaky {
        fn query(&self, predicate: &dyn Fn(&Item) -> bool) -> Result<Vec<Item>, CacheError> {
            self.inner.query(predicate)
        }

        fn delete(&self, item: &Item) -> Result<(), CacheError> {
            if self.fail_on.contains(&item.0) {
                return Err(CacheError::new(format!("cannot delete {}", item.0)));
            }
            self.inner.delete(item)
        }
    }

    struct Unqueryable;

    impl LocalCache<Item> for Unqueryable {
        fn query(&self, _: &dyn Fn(&Item) -> bool) -> Result<Vec<Item>, CacheError> {
            Err(CacheError::new("store offline"))
        }

        fn delete(&self, _: &Item) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[test]
    fn remove_stale_keeps_only_fresh_ids() {
        let cache = cache_with(&[1, 2, 3, 4]);
        let removed = reconcile(&cache, &CleanPolicy::RemoveStale, &[Item(2), Item(4), Item(9)])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(ids(&cache), vec![2, 4]);
    }

    #[test]
    fn keep_all_never_touches_cache() {
        let cache = cache_with(&[1, 2]);
        assert_eq!(reconcile(&cache, &CleanPolicy::KeepAll, &[]).unwrap(), 0);
        assert_eq!(ids(&cache), vec![1, 2]);
        assert_eq!(reconcile(&Unqueryable, &CleanPolicy::KeepAll, &[]), Ok(0));
    }

    #[test]
    fn custom_policy_sees_fresh_page() {
        let cache = cache_with(&[1, 2, 3, 10]);
        let policy = CleanPolicy::custom(|cached: &Item, fresh: &[Item]| {
            let max = fresh.iter().map(|i| i.0).max().unwrap_or(0);
            cached.0 > max
        });
        assert_eq!(reconcile(&cache, &policy, &[Item(1), Item(3)]).unwrap(), 1);
        assert_eq!(ids(&cache), vec![1, 2, 3]);
    }

    #[test]
    fn partial_failure_keeps_applied_deletions() {
        let flaky = Flaky {
            inner: cache_with(&[1, 2, 3, 4]),
            fail_on: vec![2],
        };
        let err = reconcile(&flaky, &CleanPolicy::RemoveStale, &[Item(4)]).unwrap_err();
        assert_eq!(err.removed, 2);
        assert_eq!(err.failed, 1);
        assert_eq!(err.cause.message(), "cannot delete 2");
        assert_eq!(ids(&flaky.inner), vec![2, 4]);
    }

    #[test]
    fn query_failure_is_reported() {
        let err = reconcile(&Unqueryable, &CleanPolicy::RemoveStale, &[]).unwrap_err();
        assert_eq!(err.removed, 0);
        assert_eq!(err.cause.message(), "store offline");
    }

    #[test]
    fn memory_cache_insert_replaces_same_id() {
        let cache = MemoryCache::new();
        cache.insert(Item(1));
        cache.insert(Item(2));
        cache.insert(Item(1));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&2));
        assert!(!cache.contains(&3));
    }

    #[test]
    fn memory_cache_delete_absent_is_ok() {
        let cache = cache_with(&[1]);
        assert!(cache.delete(&Item(5)).is_ok());
        assert!(!cache.is_empty());
    }

    #[test]
    fn no_cache_is_always_empty() {
        let removed = reconcile(&NoCache, &CleanPolicy::<Item>::RemoveStale, &[Item(1)]).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn policy_debug() {
        assert_eq!(format!("{:?}", CleanPolicy::<Item>::default()), "RemoveStale");
        assert_eq!(
            format!("{:?}", CleanPolicy::<Item>::custom(|_, _| false)),
            "Custom(..)"
        );
    }
}
