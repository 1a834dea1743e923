use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied")]
    PermissionDenied,

    // Capacity errors: surfaced to the caller, never retried internally.
    #[error("Insufficient inventory: {0}")]
    InsufficientInventory(String),

    #[error("Ticket tier unavailable: {0}")]
    TierUnavailable(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    // Discount errors: checkout aborts cleanly, no side effects.
    #[error("Discount code not found")]
    CodeNotFound,

    #[error("Discount code expired or inactive")]
    CodeExpired,

    #[error("Discount code has no remaining uses")]
    CodeExhausted,

    #[error("Discount code not applicable: {0}")]
    CodeNotApplicable(String),

    #[error("Discount code usage limit reached for this user")]
    UserLimitReached,

    // State errors: domain conditions, distinct from system failures.
    #[error("Ticket invalid: {0}")]
    TicketInvalid(String),

    #[error("Outside check-in window")]
    OutsideCheckInWindow,

    #[error("Attendee is in a final state: {0}")]
    AlreadyFinalState(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}
