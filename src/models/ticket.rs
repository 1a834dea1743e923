use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Used,
    Cancelled,
    Expired,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Active => write!(f, "active"),
            TicketStatus::Used => write!(f, "used"),
            TicketStatus::Cancelled => write!(f, "cancelled"),
            TicketStatus::Expired => write!(f, "expired"),
        }
    }
}

/// An issued ticket. `code` and `uuid` are globally unique; the price is
/// fixed at issuance and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i64,
    pub tier_id: i64,
    pub buyer_id: i64,
    pub code: String,
    pub uuid: String,
    pub status: TicketStatus,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: String,
    pub purchase_price: i64,
    pub discount_applied: i64,
    pub discount_code_id: Option<i64>,
    pub purchased_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn final_price(&self) -> i64 {
        self.purchase_price - self.discount_applied
    }

    pub fn is_valid(&self) -> bool {
        self.status == TicketStatus::Active
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub tier_id: i64,
    pub quantity: i64,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: Option<String>,
    pub discount_code: Option<String>,
}

/// Verification result for the QR/check-in path; unknown tickets are a
/// `valid: false` answer, not an error.
#[derive(Debug, Serialize)]
pub struct TicketValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
}

#[derive(Debug, Deserialize)]
pub struct TicketQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<TicketStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_price() {
        let ticket = Ticket {
            id: 1,
            tier_id: 1,
            buyer_id: 1,
            code: "ABCDEFGHJKLM".to_string(),
            uuid: "00000000-0000-4000-8000-000000000000".to_string(),
            status: TicketStatus::Active,
            attendee_name: "Ana".to_string(),
            attendee_email: "ana@example.com".to_string(),
            attendee_phone: String::new(),
            purchase_price: 50000,
            discount_applied: 10000,
            discount_code_id: Some(1),
            purchased_at: Utc::now(),
            used_at: None,
            cancelled_at: None,
        };

        assert_eq!(ticket.final_price(), 40000);
        assert!(ticket.is_valid());
    }
}
