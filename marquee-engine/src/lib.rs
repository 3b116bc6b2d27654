pub mod broadcast;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod locks;
pub mod presence;

pub use broadcast::BroadcastHub;
pub use engine::{ReservationEngine, SeatNotifier};
pub use error::ReservationError;
pub use expiry::{ExpiryScheduler, SweepReport};
pub use locks::SeatLocks;
pub use presence::PresenceTracker;
