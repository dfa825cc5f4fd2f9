//! Process-local serialization of balance read-modify-write cycles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async lock per balance id.
///
/// Two jobs charging the same balance would otherwise both read the old
/// amount and the later write would drop the earlier charge. Holders keep
/// the guard across load → calculate → store.
#[derive(Default)]
pub struct BalanceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Guard over one or two balances; released on drop.
pub struct BalanceGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl BalanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, balance_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop locks nobody holds or waits on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(balance_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn lock(&self, balance_id: &str) -> BalanceGuard {
        let guard = self.lock_for(balance_id).lock_owned().await;
        BalanceGuard {
            _guards: vec![guard],
        }
    }

    /// Lock two balances in id order so opposing transfers cannot deadlock.
    pub async fn lock_pair(&self, first: &str, second: &str) -> BalanceGuard {
        if first == second {
            return self.lock(first).await;
        }
        let (low, high) = if first < second {
            (first, second)
        } else {
            (second, first)
        };
        let low_guard = self.lock_for(low).lock_owned().await;
        let high_guard = self.lock_for(high).lock_owned().await;
        BalanceGuard {
            _guards: vec![low_guard, high_guard],
        }
    }

    /// Number of balances with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::task::JoinSet;

    #[tokio::test]
    async fn test_same_balance_is_serialized() {
        let locks = Arc::new(BalanceLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.spawn(async move {
                let _guard = locks.lock("bal_1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_opposing_pairs_do_not_deadlock() {
        let locks = Arc::new(BalanceLocks::new());
        let mut tasks = JoinSet::new();

        for i in 0..50 {
            let locks = Arc::clone(&locks);
            tasks.spawn(async move {
                let _guard = if i % 2 == 0 {
                    locks.lock_pair("bal_a", "bal_b").await
                } else {
                    locks.lock_pair("bal_b", "bal_a").await
                };
                tokio::task::yield_now().await;
            });
        }

        let all = async {
            while let Some(res) = tasks.join_next().await {
                res.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("lock_pair deadlocked");
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = BalanceLocks::new();
        drop(locks.lock("bal_1").await);
        drop(locks.lock("bal_2").await);
        // The next lookup prunes every entry without a holder.
        let _guard = locks.lock("bal_3").await;
        assert_eq!(locks.tracked(), 1);
    }

    #[tokio::test]
    async fn test_pair_with_same_id_locks_once() {
        let locks = BalanceLocks::new();
        let _guard = locks.lock_pair("bal_x", "bal_x").await;
        assert_eq!(locks.tracked(), 1);
    }
}
