pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod memory;
pub mod redis_repo;
pub mod seat_repo;
pub mod showing_repo;

pub use booking_repo::PgBookingLedger;
pub use database::DbClient;
pub use memory::{MemoryBookingLedger, MemorySeatStore, MemoryShowingDirectory};
pub use redis_repo::RedisClient;
pub use seat_repo::PgSeatStore;
pub use showing_repo::PgShowingDirectory;
