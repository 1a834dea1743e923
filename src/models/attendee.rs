use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendeeStatus {
    Registered,
    CheckedIn,
    NoShow,
    Cancelled,
}

impl std::fmt::Display for AttendeeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendeeStatus::Registered => write!(f, "registered"),
            AttendeeStatus::CheckedIn => write!(f, "checked_in"),
            AttendeeStatus::NoShow => write!(f, "no_show"),
            AttendeeStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A person bound 1:1 to a ticket and to an event. Created lazily from the
/// ticket's contact fields on first check-in.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attendee {
    pub id: i64,
    pub user_id: i64,
    pub ticket_id: i64,
    pub event_id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub status: AttendeeStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_in_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attendee {
    pub fn is_checked_in(&self) -> bool {
        self.status == AttendeeStatus::CheckedIn
    }
}

/// One row per physical check-in; repeats are allowed for multi-day events.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckInLog {
    pub id: i64,
    pub attendee_id: i64,
    pub checked_in_at: DateTime<Utc>,
    pub checked_in_by: Option<i64>,
    pub location: String,
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub ticket_code: Option<String>,
    pub ticket_uuid: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckInResult {
    pub attendee: Attendee,
    pub log: CheckInLog,
    /// True when this call performed the attendee's first check-in.
    pub first_check_in: bool,
}
