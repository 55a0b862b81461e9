//! Per-key single-flight execution.
//!
//! OAuth refresh tokens for the CRM and calendar integrations are
//! single-use: two concurrent refreshes for the same tenant would burn the
//! token and lock the integration out. Every refresh therefore runs through
//! [`SingleFlight::run`], which guarantees one critical section at a time
//! per key. The section must persist its result (the rotated tokens) before
//! returning, so the next waiter re-reads fresh state instead of refreshing
//! again.
//!
//! The registry lock (`tokio::sync::RwLock`) is never held across an
//! `.await` point; only the per-key `tokio::sync::Mutex` is, which is sound.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Clone, Default)]
pub struct SingleFlight<K: Eq + Hash + Clone> {
    locks: Arc<RwLock<HashMap<K, Arc<Mutex<()>>>>>,
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Run `f` as an exclusive async section for `key`. Concurrent callers
    /// with the same key queue behind each other; distinct keys do not
    /// interact.
    pub async fn run<F, Fut, T>(&self, key: K, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock_arc = {
            let read = self.locks.read().await;
            if let Some(lock) = read.get(&key) {
                lock.clone()
            } else {
                drop(read); // release read before write
                let mut write = self.locks.write().await;
                write
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };

        let out = {
            let _guard = lock_arc.lock().await;
            f().await
        };

        // prune when nobody else holds the lock:
        // exactly 2 = the map entry + this local clone
        if Arc::strong_count(&lock_arc) == 2 {
            let mut write = self.locks.write().await;
            write.remove(&key);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn same_key_sections_are_exclusive() {
        let flight: SingleFlight<String> = SingleFlight::new();
        let inside = Arc::new(AtomicU32::new(0));
        let max_inside = Arc::new(AtomicU32::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let flight = flight.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(async move {
                flight
                    .run("tenant-1:crm_b".to_string(), || async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_run_concurrently() {
        let flight: SingleFlight<u32> = SingleFlight::new();
        let (a, b) = tokio::join!(
            flight.run(1, || async { 1 }),
            flight.run(2, || async { 2 }),
        );
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn registry_is_pruned_after_use() {
        let flight: SingleFlight<u32> = SingleFlight::new();
        flight.run(7, || async {}).await;
        assert!(flight.locks.read().await.is_empty());
    }
}
