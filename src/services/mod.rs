pub mod checkin_service;
pub mod checkout_service;
pub mod discount_service;
pub mod inventory_service;
pub mod ticket_service;

pub use checkin_service::CheckInService;
pub use checkout_service::CheckoutService;
pub use discount_service::DiscountService;
pub use inventory_service::{InventoryService, Reservation};
pub use ticket_service::TicketService;
