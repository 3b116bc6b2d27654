use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::engine::ReservationEngine;
use crate::error::ReservationError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub showings: usize,
    pub released: usize,
}

/// Periodically returns stale holds to available.
///
/// Worst-case staleness of a hold is the hold TTL plus one interval.
pub struct ExpiryScheduler {
    engine: Arc<ReservationEngine>,
    interval: Duration,
}

impl ExpiryScheduler {
    pub fn new(engine: Arc<ReservationEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// One pass over every showing with a held seat. A failing showing is
    /// logged and skipped so the others still get swept.
    pub async fn sweep(&self) -> Result<SweepReport, ReservationError> {
        let showings = self.engine.showings_with_holds().await?;
        let mut report = SweepReport::default();
        for showing_id in showings {
            match self.engine.expire_stale(showing_id).await {
                Ok(expired) if !expired.is_empty() => {
                    report.showings += 1;
                    report.released += expired.len();
                }
                Ok(_) => {}
                Err(e) => error!(showing = %showing_id, error = %e, "failed to expire holds"),
            }
        }
        Ok(report)
    }

    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Expiry scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(report) if report.released > 0 => {
                    info!(showings = report.showings, released = report.released, "expired stale holds");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "expiry sweep failed, retrying next tick"),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use marquee_domain::repository::{CasOutcome, SeatStore, StoreError, StoreResult};
    use marquee_domain::{
        ManualClock, Seat, SeatLabel, SeatState, SeatTransition, Showing, ShowingId, ViewerId,
    };
    use marquee_store::{MemoryBookingLedger, MemorySeatStore, MemoryShowingDirectory};
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::engine::SeatNotifier;

    struct NoopNotifier;

    #[async_trait]
    impl SeatNotifier for NoopNotifier {
        async fn notify(&self, _showing_id: ShowingId) {}
    }

    /// Fails the next hold scan once when armed.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemorySeatStore,
        fail_next_scan: AtomicBool,
    }

    #[async_trait]
    impl SeatStore for FlakyStore {
        async fn create_seats(&self, showing_id: ShowingId, labels: &[SeatLabel]) -> StoreResult<()> {
            self.inner.create_seats(showing_id, labels).await
        }

        async fn remove_seats(&self, showing_id: ShowingId) -> StoreResult<()> {
            self.inner.remove_seats(showing_id).await
        }

        async fn get_seats(&self, showing_id: ShowingId) -> StoreResult<Vec<Seat>> {
            self.inner.get_seats(showing_id).await
        }

        async fn get_seat(&self, showing_id: ShowingId, label: SeatLabel) -> StoreResult<Option<Seat>> {
            self.inner.get_seat(showing_id, label).await
        }

        async fn compare_and_set(
            &self,
            showing_id: ShowingId,
            label: SeatLabel,
            expected: &SeatState,
            next: &SeatState,
        ) -> StoreResult<CasOutcome> {
            self.inner.compare_and_set(showing_id, label, expected, next).await
        }

        async fn compare_and_set_all(
            &self,
            showing_id: ShowingId,
            transitions: &[SeatTransition],
        ) -> StoreResult<CasOutcome> {
            self.inner.compare_and_set_all(showing_id, transitions).await
        }

        async fn showings_with_holds(&self) -> StoreResult<Vec<ShowingId>> {
            if self.fail_next_scan.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Corrupt("scan failed".into()));
            }
            self.inner.showings_with_holds().await
        }

        async fn release_all_holds(&self) -> StoreResult<u64> {
            self.inner.release_all_holds().await
        }
    }

    async fn setup() -> (Arc<ReservationEngine>, Arc<FlakyStore>, Arc<ManualClock>) {
        let store = Arc::new(FlakyStore::default());
        let clock = Arc::new(ManualClock::default());
        let engine = Arc::new(ReservationEngine::new(
            store.clone(),
            Arc::new(MemoryShowingDirectory::new()),
            Arc::new(MemoryBookingLedger::new()),
            Arc::new(NoopNotifier),
            clock.clone(),
        ));
        for id in [1, 2] {
            engine
                .open_showing(Showing::new(ShowingId(id), "Matinee", 50_000))
                .await
                .unwrap();
        }
        (engine, store, clock)
    }

    fn label(s: &str) -> SeatLabel {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_sweep_releases_stale_holds_across_showings() {
        let (engine, store, clock) = setup().await;
        let v1 = ViewerId::from("v1");
        engine.hold(ShowingId(1), label("A1"), &v1).await.unwrap();
        engine.hold(ShowingId(2), label("A1"), &v1).await.unwrap();
        engine.hold(ShowingId(2), label("A2"), &v1).await.unwrap();

        let scheduler = ExpiryScheduler::new(engine.clone(), Duration::from_secs(30));
        assert_eq!(scheduler.sweep().await.unwrap(), SweepReport::default());

        clock.advance(ChronoDuration::seconds(300));
        let report = scheduler.sweep().await.unwrap();
        assert_eq!(report, SweepReport { showings: 2, released: 3 });

        let seat = store.get_seat(ShowingId(2), label("A2")).await.unwrap().unwrap();
        assert_eq!(seat.state, SeatState::Available);
        assert_eq!(seat.state.holder_id(), None);
    }

    #[tokio::test]
    async fn test_failed_sweep_is_retried_next_time() {
        let (engine, store, clock) = setup().await;
        engine.hold(ShowingId(1), label("C3"), &ViewerId::from("v1")).await.unwrap();
        clock.advance(ChronoDuration::seconds(301));

        let scheduler = ExpiryScheduler::new(engine, Duration::from_secs(30));
        store.fail_next_scan.store(true, Ordering::SeqCst);
        assert!(scheduler.sweep().await.is_err());

        let report = scheduler.sweep().await.unwrap();
        assert_eq!(report.released, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_loop_survives_failures() {
        let (engine, store, clock) = setup().await;
        engine.hold(ShowingId(1), label("D4"), &ViewerId::from("v1")).await.unwrap();
        clock.advance(ChronoDuration::seconds(301));
        store.fail_next_scan.store(true, Ordering::SeqCst);

        let handle = ExpiryScheduler::new(engine, Duration::from_secs(30)).spawn();

        // First tick fails, the next one sweeps.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        assert!(!handle.is_finished());
        let seat = store.get_seat(ShowingId(1), label("D4")).await.unwrap().unwrap();
        assert_eq!(seat.state, SeatState::Available);
        handle.abort();
    }
}
