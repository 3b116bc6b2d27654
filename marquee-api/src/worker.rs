use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use marquee_engine::{ExpiryScheduler, ReservationEngine};

/// Starts the background sweep that returns stale holds to the pool.
pub fn start_expiry_worker(engine: Arc<ReservationEngine>, interval_seconds: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_seconds.max(1));
    info!(interval_seconds = interval.as_secs(), "Expiry worker started");
    ExpiryScheduler::new(engine, interval).spawn()
}
