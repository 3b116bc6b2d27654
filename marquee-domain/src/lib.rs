pub mod booking;
pub mod clock;
pub mod events;
pub mod repository;
pub mod seat;
pub mod showing;
pub mod viewer;

pub use booking::{Booking, BookingConfirmation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{ClientMessage, SeatSnapshot, SeatView, ServerMessage};
pub use repository::{
    BookingLedger, CasOutcome, SeatStore, ShowingCatalog, ShowingDirectory, StoreError, StoreResult,
};
pub use seat::{Seat, SeatLabel, SeatLabelError, SeatState, SeatStatus, SeatTransition};
pub use showing::{Showing, ShowingId};
pub use viewer::{ConnectionId, Principal, Role, Subscription, ViewerId};
