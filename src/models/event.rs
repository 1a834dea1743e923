use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Events are owned by an external provider; the engine only reads their
/// start/end timestamps for sale windows, cancellation and check-in.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Event {
    pub fn is_past(&self) -> bool {
        self.end_date < Utc::now()
    }
}
