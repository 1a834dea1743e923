use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the ticket price (0-100).
    Percentage,
    /// `discount_value` is an amount in minor units, capped at the price.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DiscountCode {
    pub id: i64,
    pub event_id: i64,
    pub code: String,
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub max_uses_per_user: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub minimum_purchase: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscountCode {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if now < self.valid_from || now > self.valid_until {
            return false;
        }
        if let Some(max) = self.max_uses
            && self.used_count >= max
        {
            return false;
        }
        true
    }

    pub fn remaining_uses(&self) -> Option<i64> {
        self.max_uses.map(|max| (max - self.used_count).max(0))
    }

    /// Discount amount for a single ticket; never exceeds the price.
    pub fn calculate_discount(&self, price: i64) -> i64 {
        let discount = match self.discount_type {
            DiscountType::Percentage => price * self.discount_value / 100,
            DiscountType::Fixed => self.discount_value,
        };
        discount.min(price)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDiscountCodeRequest {
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_uses: Option<i64>,
    pub max_uses_per_user: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub minimum_purchase: Option<i64>,
    /// Tiers the code is restricted to; empty means every tier.
    #[serde(default)]
    pub applicable_tier_ids: Vec<i64>,
}

/// Priced outcome of evaluating a code against a tier and buyer.
#[derive(Debug, Clone, Serialize)]
pub struct DiscountResult {
    pub code_id: i64,
    pub code: String,
    pub discount_per_ticket: i64,
    pub total_discount: i64,
}
