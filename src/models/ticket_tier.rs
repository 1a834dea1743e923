use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named category of tickets for an event with its own price and pool.
///
/// `sold_count` is mutated only through the inventory service's conditional
/// updates; everything derived from it here is a pure function of the row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub description: String,
    pub price: i64, // minor units (cents)
    pub quantity: i64,
    pub sold_count: i64,
    pub min_purchase: i64,
    pub max_purchase: i64,
    pub sale_start: Option<DateTime<Utc>>,
    pub sale_end: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketTier {
    pub fn available_quantity(&self) -> i64 {
        self.quantity - self.sold_count
    }

    pub fn sold_out(&self) -> bool {
        self.sold_count >= self.quantity
    }

    pub fn percentage_sold(&self) -> f64 {
        if self.quantity == 0 {
            return 0.0;
        }
        self.sold_count as f64 / self.quantity as f64 * 100.0
    }

    /// Active and inside the sale window; ignores remaining quantity.
    pub fn is_on_sale(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(start) = self.sale_start
            && now < start
        {
            return false;
        }
        if let Some(end) = self.sale_end
            && now > end
        {
            return false;
        }
        true
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.is_on_sale(now) && self.available_quantity() > 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTierRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
    pub quantity: i64,
    pub min_purchase: Option<i64>,
    pub max_purchase: Option<i64>,
    pub sale_start: Option<DateTime<Utc>>,
    pub sale_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TierAvailability {
    pub available: bool,
    pub available_quantity: i64,
    pub sold_out: bool,
    pub percentage_sold: f64,
}
