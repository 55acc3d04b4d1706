//! Per-key async mutex whose entries disappear once nobody holds or waits on them

use std::hash::Hash;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

type LockMap<K> = Arc<DashMap<K, Weak<Mutex<()>>>>;

/// Guard for one key of a [`KeyedAsyncLock`].
///
/// Dropping the last guard (with no waiters left) removes the key from the map.
pub struct KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    guard: Option<OwnedMutexGuard<()>>,
    mutex: Arc<Mutex<()>>,
    key: K,
    locks: LockMap<K>,
}

impl<K> Drop for KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        self.guard.take();

        // Checked under the shard lock so a concurrent `lock` cannot upgrade in between.
        // A count of one means only `self.mutex` is left: no holder, no waiter.
        let mine = Arc::downgrade(&self.mutex);
        self.locks
            .remove_if(&self.key, |_, weak| weak.ptr_eq(&mine) && weak.strong_count() == 1);
    }
}

/// Serializes async work per key while unrelated keys proceed in parallel.
///
/// ```rust,ignore
/// let locks = KeyedAsyncLock::<String>::new();
/// let _guard = locks.lock(&claim_uid).await;
/// // prepare or unprepare the claim
/// ```
pub struct KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    locks: LockMap<K>,
}

impl<K> KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Waits until no other task holds `key`, then holds it until the guard drops.
    pub async fn lock(&self, key: &K) -> KeyedLockGuard<K> {
        let mutex = self.mutex_for(key);
        let guard = Arc::clone(&mutex).lock_owned().await;

        KeyedLockGuard {
            guard: Some(guard),
            mutex,
            key: key.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    fn mutex_for(&self, key: &K) -> Arc<Mutex<()>> {
        loop {
            match self.locks.entry(key.clone()) {
                Entry::Occupied(occupied) => {
                    if let Some(mutex) = occupied.get().upgrade() {
                        return mutex;
                    }
                    occupied.remove();
                }
                Entry::Vacant(vacant) => {
                    let mutex = Arc::new(Mutex::new(()));
                    vacant.insert(Arc::downgrade(&mutex));
                    return mutex;
                }
            }
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> Default for KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use test_log::test;
    use tokio::time::sleep;

    use super::*;

    #[test(tokio::test)]
    async fn same_claim_is_serialized() {
        let locks = Arc::new(KeyedAsyncLock::<String>::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&"claim-a".to_string()).await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test(tokio::test)]
    async fn distinct_claims_do_not_block_each_other() {
        let locks = KeyedAsyncLock::<String>::new();

        let first = locks.lock(&"claim-a".to_string()).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(&"claim-b".to_string()),
        )
        .await
        .expect("claim-b must not wait for claim-a");

        assert_eq!(locks.len(), 2);
        drop(first);
        drop(second);
        assert!(locks.is_empty());
    }

    #[test(tokio::test)]
    async fn entry_survives_while_a_waiter_is_queued() {
        let locks = Arc::new(KeyedAsyncLock::<u32>::new());
        let held = locks.lock(&7).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(&7).await;
            })
        };
        sleep(Duration::from_millis(10)).await;

        drop(held);
        assert_eq!(locks.len(), 1, "queued waiter keeps the entry alive");

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
