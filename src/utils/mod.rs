pub mod code_generator;
pub mod pagination;

pub use code_generator::generate_ticket_code;
pub use pagination::{PaginatedResponse, PaginationInfo, PaginationParams};
