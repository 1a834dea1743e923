pub mod attendee;
pub mod discount_code;
pub mod event;
pub mod ticket;
pub mod ticket_tier;

pub use attendee::*;
pub use discount_code::*;
pub use event::*;
pub use ticket::*;
pub use ticket_tier::*;
