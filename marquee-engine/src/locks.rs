use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use marquee_domain::{SeatLabel, ShowingId};

/// Registry of per-seat async locks.
///
/// There is no showing-wide lock. Callers that need several seats must go
/// through [`SeatLocks::lock_all`], which acquires in (row, column) order so
/// two overlapping bookings cannot deadlock.
#[derive(Default)]
pub struct SeatLocks {
    locks: Mutex<HashMap<(ShowingId, SeatLabel), Arc<AsyncMutex<()>>>>,
}

impl SeatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, showing_id: ShowingId, label: SeatLabel) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry((showing_id, label)).or_default().clone()
    }

    pub async fn lock(&self, showing_id: ShowingId, label: SeatLabel) -> OwnedMutexGuard<()> {
        self.entry(showing_id, label).lock_owned().await
    }

    pub async fn lock_all(&self, showing_id: ShowingId, labels: &[SeatLabel]) -> Vec<OwnedMutexGuard<()>> {
        let mut ordered = labels.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for label in ordered {
            guards.push(self.lock(showing_id, label).await);
        }
        guards
    }

    /// Drops the idle lock entries of a removed showing.
    ///
    /// An entry whose mutex is still held or awaited is kept, so a late
    /// caller queues on the same mutex instead of getting a fresh one.
    /// Guards and waiters each own a clone of the `Arc`, and no clone can be
    /// taken while the registry is locked here.
    pub fn forget_showing(&self, showing_id: ShowingId) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|(showing, _), lock| *showing != showing_id || Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn label(s: &str) -> SeatLabel {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_same_seat_is_exclusive() {
        let locks = Arc::new(SeatLocks::new());
        let guard = locks.lock(ShowingId(1), label("A1")).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.lock(ShowingId(1), label("A1")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("lock released")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_seats_do_not_contend() {
        let locks = SeatLocks::new();
        let _a = locks.lock(ShowingId(1), label("A1")).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.lock(ShowingId(1), label("A2")))
            .await
            .expect("independent seat");
        let _c = tokio::time::timeout(Duration::from_millis(100), locks.lock(ShowingId(2), label("A1")))
            .await
            .expect("same label, other showing");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_lock_all_does_not_deadlock() {
        let locks = Arc::new(SeatLocks::new());
        let mut tasks = Vec::new();
        for i in 0..20 {
            let locks = locks.clone();
            tasks.push(tokio::spawn(async move {
                let labels = if i % 2 == 0 {
                    vec![label("C3"), label("A1"), label("B2")]
                } else {
                    vec![label("B2"), label("C3"), label("A1"), label("A1")]
                };
                let guards = locks.lock_all(ShowingId(1), &labels).await;
                assert_eq!(guards.len(), 3);
                tokio::task::yield_now().await;
            }));
        }
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("no deadlock")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_forget_showing() {
        let locks = SeatLocks::new();
        drop(locks.lock(ShowingId(1), label("A1")).await);
        drop(locks.lock(ShowingId(2), label("A1")).await);
        assert_eq!(locks.len(), 2);

        locks.forget_showing(ShowingId(1));
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_forget_showing_keeps_locks_in_use() {
        let locks = Arc::new(SeatLocks::new());
        let guard = locks.lock(ShowingId(1), label("A1")).await;
        locks.forget_showing(ShowingId(1));
        assert_eq!(locks.len(), 1);

        let late = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.lock(ShowingId(1), label("A1")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!late.is_finished());

        drop(guard);
        drop(
            tokio::time::timeout(Duration::from_secs(1), late)
                .await
                .expect("lock released")
                .unwrap(),
        );
        locks.forget_showing(ShowingId(1));
        assert!(locks.is_empty());
    }
}
