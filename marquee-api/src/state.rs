use std::sync::Arc;

use marquee_domain::repository::{BookingLedger, SeatStore, ShowingDirectory};
use marquee_domain::Clock;
use marquee_engine::{BroadcastHub, PresenceTracker, ReservationEngine};
use marquee_store::app_config::{RateLimitConfig, ReservationConfig};
use marquee_store::{
    DbClient, MemoryBookingLedger, MemorySeatStore, MemoryShowingDirectory, PgBookingLedger,
    PgSeatStore, PgShowingDirectory, RedisClient,
};

use crate::gateway::SessionGateway;
use crate::middleware::auth::{JwtPrincipalResolver, PrincipalResolver};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

/// The three persistence seams the engine runs on.
#[derive(Clone)]
pub struct Stores {
    pub seats: Arc<dyn SeatStore>,
    pub showings: Arc<dyn ShowingDirectory>,
    pub ledger: Arc<dyn BookingLedger>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            seats: Arc::new(MemorySeatStore::new()),
            showings: Arc::new(MemoryShowingDirectory::new()),
            ledger: Arc::new(MemoryBookingLedger::new()),
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        Self {
            seats: Arc::new(PgSeatStore::new(db.pool.clone())),
            showings: Arc::new(PgShowingDirectory::new(db.pool.clone())),
            ledger: Arc::new(PgBookingLedger::new(db.pool.clone())),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
    pub hub: Arc<BroadcastHub>,
    pub presence: Arc<PresenceTracker>,
    pub gateway: Arc<SessionGateway>,
    pub principals: Arc<dyn PrincipalResolver>,
    pub tokens: Arc<JwtPrincipalResolver>,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    /// Wires the engine, hub, presence tracker and gateway together. Nothing
    /// here is global; every map lives inside these values.
    pub fn new(stores: Stores, auth: AuthConfig, reservation: &ReservationConfig, clock: Arc<dyn Clock>) -> Self {
        let hub = Arc::new(BroadcastHub::new(stores.seats.clone(), reservation.outbox_capacity));
        let engine = Arc::new(ReservationEngine::new(
            stores.seats,
            stores.showings,
            stores.ledger,
            hub.clone(),
            clock,
        ));
        let presence = Arc::new(PresenceTracker::new(engine.clone(), hub.clone()));
        let gateway = Arc::new(SessionGateway::new(engine.clone(), presence.clone(), hub.clone()));
        let tokens = Arc::new(JwtPrincipalResolver::new(&auth.secret, auth.expiration));

        Self {
            engine,
            hub,
            presence,
            gateway,
            principals: tokens.clone(),
            tokens,
            redis: None,
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, rate_limit: RateLimitConfig) -> Self {
        self.redis = Some(redis);
        self.rate_limit = rate_limit;
        self
    }
}
