use crate::database::{DbPool, begin_write};
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateDiscountCodeRequest, DiscountCode, DiscountResult, DiscountType, TicketTier,
};
use crate::services::inventory_service::fetch_tier;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

const CODE_COLUMNS: &str = "id, event_id, code, description, discount_type, discount_value, \
     max_uses, used_count, max_uses_per_user, valid_from, valid_until, is_active, \
     minimum_purchase, created_at, updated_at";

pub(crate) async fn fetch_code_for_event(
    conn: &mut SqliteConnection,
    code: &str,
    event_id: i64,
) -> AppResult<DiscountCode> {
    let query = format!("SELECT {CODE_COLUMNS} FROM discount_codes WHERE code = ?1 AND event_id = ?2");
    sqlx::query_as::<_, DiscountCode>(&query)
        .bind(code.trim().to_uppercase())
        .bind(event_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::CodeNotFound)
}

/// Validates a code against a tier and buyer and prices the discount.
/// Read-only: nothing is consumed here.
pub(crate) async fn evaluate_code(
    conn: &mut SqliteConnection,
    discount: &DiscountCode,
    tier: &TicketTier,
    user_id: i64,
    quantity: i64,
    now: DateTime<Utc>,
) -> AppResult<DiscountResult> {
    if !discount.is_active || now < discount.valid_from || now > discount.valid_until {
        return Err(AppError::CodeExpired);
    }
    if let Some(max) = discount.max_uses
        && discount.used_count >= max
    {
        return Err(AppError::CodeExhausted);
    }

    let order_amount = tier.price * quantity;
    if order_amount < discount.minimum_purchase {
        return Err(AppError::CodeNotApplicable(format!(
            "order amount {} is below the minimum purchase of {}",
            order_amount, discount.minimum_purchase
        )));
    }

    // Tier allow-list; an empty list applies to every tier.
    let restricted: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM discount_code_tiers WHERE discount_code_id = ?1")
            .bind(discount.id)
            .fetch_one(&mut *conn)
            .await?;
    if restricted > 0 {
        let allowed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM discount_code_tiers WHERE discount_code_id = ?1 AND tier_id = ?2",
        )
        .bind(discount.id)
        .bind(tier.id)
        .fetch_one(&mut *conn)
        .await?;
        if allowed == 0 {
            return Err(AppError::CodeNotApplicable(format!(
                "code '{}' is not valid for tier '{}'",
                discount.code, tier.name
            )));
        }
    }

    // Per-user cap counts the buyer's prior tickets that reference this code.
    let user_uses: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tickets WHERE discount_code_id = ?1 AND buyer_id = ?2",
    )
    .bind(discount.id)
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    if user_uses >= discount.max_uses_per_user {
        return Err(AppError::UserLimitReached);
    }

    let discount_per_ticket = discount.calculate_discount(tier.price);
    Ok(DiscountResult {
        code_id: discount.id,
        code: discount.code.clone(),
        discount_per_ticket,
        total_discount: discount_per_ticket * quantity,
    })
}

/// Consumes one use of a code. The cap check and the increment are one
/// conditional UPDATE: of two buyers racing for the last remaining use,
/// exactly one succeeds.
pub(crate) async fn consume_code(
    conn: &mut SqliteConnection,
    code_id: i64,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE discount_codes
        SET used_count = used_count + 1, updated_at = ?1
        WHERE id = ?2 AND (max_uses IS NULL OR used_count < max_uses)
        "#,
    )
    .bind(now)
    .bind(code_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::CodeExhausted);
    }
    Ok(())
}

#[derive(Clone)]
pub struct DiscountService {
    pool: DbPool,
}

impl DiscountService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_code(
        &self,
        event_id: i64,
        request: CreateDiscountCodeRequest,
    ) -> AppResult<DiscountCode> {
        let code = request.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(AppError::ValidationError("code cannot be empty".to_string()));
        }
        if request.discount_value < 0 {
            return Err(AppError::ValidationError(
                "discount value cannot be negative".to_string(),
            ));
        }
        if request.discount_type == DiscountType::Percentage && request.discount_value > 100 {
            return Err(AppError::ValidationError(
                "percentage discount cannot exceed 100".to_string(),
            ));
        }
        if request.valid_until <= request.valid_from {
            return Err(AppError::ValidationError(
                "valid_until must be after valid_from".to_string(),
            ));
        }

        let mut tx = begin_write(&self.pool).await?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discount_codes WHERE code = ?1")
            .bind(&code)
            .fetch_one(&mut *tx)
            .await?;
        if exists > 0 {
            return Err(AppError::ValidationError(format!(
                "discount code '{code}' already exists"
            )));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO discount_codes (
                event_id, code, description, discount_type, discount_value,
                max_uses, max_uses_per_user, valid_from, valid_until,
                is_active, minimum_purchase, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?11, ?11)
            "#,
        )
        .bind(event_id)
        .bind(&code)
        .bind(&request.description)
        .bind(request.discount_type)
        .bind(request.discount_value)
        .bind(request.max_uses)
        .bind(request.max_uses_per_user.unwrap_or(1))
        .bind(request.valid_from)
        .bind(request.valid_until)
        .bind(request.minimum_purchase.unwrap_or(0))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let code_id = result.last_insert_rowid();
        for tier_id in &request.applicable_tier_ids {
            sqlx::query(
                "INSERT INTO discount_code_tiers (discount_code_id, tier_id) VALUES (?1, ?2)",
            )
            .bind(code_id)
            .bind(tier_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        log::info!("created discount code '{code}' ({code_id}) for event {event_id}");
        self.get_code(code_id).await
    }

    pub async fn get_code(&self, code_id: i64) -> AppResult<DiscountCode> {
        let query = format!("SELECT {CODE_COLUMNS} FROM discount_codes WHERE id = ?1");
        sqlx::query_as::<_, DiscountCode>(&query)
            .bind(code_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::CodeNotFound)
    }

    /// Validates and prices a code for a prospective order without
    /// consuming a use.
    pub async fn evaluate(
        &self,
        code: &str,
        tier_id: i64,
        user_id: i64,
        quantity: i64,
    ) -> AppResult<DiscountResult> {
        let now = Utc::now();
        let mut conn = self.pool.acquire().await?;

        let tier = fetch_tier(&mut conn, tier_id).await?;
        let discount = fetch_code_for_event(&mut conn, code, tier.event_id).await?;
        evaluate_code(&mut conn, &discount, &tier, user_id, quantity, now).await
    }

    /// Consumes one use; per order, not per ticket.
    pub async fn consume(&self, code_id: i64) -> AppResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        consume_code(&mut tx, code_id, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }
}
