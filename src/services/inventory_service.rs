use crate::database::{DbPool, begin_write};
use crate::error::{AppError, AppResult};
use crate::models::{CreateTierRequest, TicketTier, TierAvailability};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

const TIER_COLUMNS: &str = "id, event_id, name, description, price, quantity, sold_count, \
     min_purchase, max_purchase, sale_start, sale_end, is_active, created_at, updated_at";

/// A transient claim on units of a tier's pool, produced by a successful
/// reservation. Settled at most once: converted to tickets or released.
#[derive(Debug)]
pub struct Reservation {
    tier_id: i64,
    quantity: i64,
    released: bool,
}

impl Reservation {
    pub fn tier_id(&self) -> i64 {
        self.tier_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

pub(crate) async fn fetch_tier(conn: &mut SqliteConnection, tier_id: i64) -> AppResult<TicketTier> {
    let query = format!("SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE id = ?1");
    sqlx::query_as::<_, TicketTier>(&query)
        .bind(tier_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("ticket tier {tier_id} not found")))
}

fn check_purchase_limits(tier: &TicketTier, quantity: i64, now: DateTime<Utc>) -> AppResult<()> {
    if quantity < 1 {
        return Err(AppError::InvalidQuantity(
            "quantity must be at least 1".to_string(),
        ));
    }
    if !tier.is_on_sale(now) {
        return Err(AppError::TierUnavailable(format!(
            "tier '{}' is not on sale",
            tier.name
        )));
    }
    if quantity < tier.min_purchase {
        return Err(AppError::InvalidQuantity(format!(
            "minimum purchase for '{}' is {} ticket(s)",
            tier.name, tier.min_purchase
        )));
    }
    if quantity > tier.max_purchase {
        return Err(AppError::InvalidQuantity(format!(
            "maximum purchase for '{}' is {} ticket(s)",
            tier.name, tier.max_purchase
        )));
    }
    Ok(())
}

/// Claims `quantity` units from the tier's pool.
///
/// The capacity check and the increment are one conditional UPDATE, so two
/// transactions racing for the last units can never both succeed.
pub(crate) async fn reserve_units(
    conn: &mut SqliteConnection,
    tier: &TicketTier,
    quantity: i64,
    now: DateTime<Utc>,
) -> AppResult<Reservation> {
    check_purchase_limits(tier, quantity, now)?;

    let result = sqlx::query(
        r#"
        UPDATE ticket_tiers
        SET sold_count = sold_count + ?1, updated_at = ?2
        WHERE id = ?3 AND is_active = 1 AND sold_count + ?1 <= quantity
        "#,
    )
    .bind(quantity)
    .bind(now)
    .bind(tier.id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        // Re-read to tell a drained pool from a concurrently deactivated tier.
        let current = fetch_tier(conn, tier.id).await?;
        if !current.is_on_sale(now) {
            return Err(AppError::TierUnavailable(format!(
                "tier '{}' is not on sale",
                current.name
            )));
        }
        return Err(AppError::InsufficientInventory(format!(
            "requested {} ticket(s) but only {} available",
            quantity,
            current.available_quantity()
        )));
    }

    Ok(Reservation {
        tier_id: tier.id,
        quantity,
        released: false,
    })
}

/// Returns units to the pool. Guarded so `sold_count` never underflows.
pub(crate) async fn release_units(
    conn: &mut SqliteConnection,
    tier_id: i64,
    quantity: i64,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE ticket_tiers
        SET sold_count = sold_count - ?1, updated_at = ?2
        WHERE id = ?3 AND sold_count >= ?1
        "#,
    )
    .bind(quantity)
    .bind(now)
    .bind(tier_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        log::warn!("release of {quantity} unit(s) on tier {tier_id} would underflow sold_count");
        return Err(AppError::InternalError(format!(
            "cannot release {quantity} unit(s) from tier {tier_id}"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct InventoryService {
    pool: DbPool,
}

impl InventoryService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_tier(
        &self,
        event_id: i64,
        request: CreateTierRequest,
    ) -> AppResult<TicketTier> {
        if request.price < 0 {
            return Err(AppError::ValidationError(
                "price cannot be negative".to_string(),
            ));
        }
        if request.quantity < 1 {
            return Err(AppError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }
        let min_purchase = request.min_purchase.unwrap_or(1);
        let max_purchase = request.max_purchase.unwrap_or(10);
        if min_purchase < 1 || min_purchase > max_purchase {
            return Err(AppError::ValidationError(
                "purchase limits must satisfy 1 <= min <= max".to_string(),
            ));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO ticket_tiers (
                event_id, name, description, price, quantity,
                min_purchase, max_purchase, sale_start, sale_end,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)
            "#,
        )
        .bind(event_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.price)
        .bind(request.quantity)
        .bind(min_purchase)
        .bind(max_purchase)
        .bind(request.sale_start)
        .bind(request.sale_end)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let tier_id = result.last_insert_rowid();
        log::info!("created tier {} '{}' for event {}", tier_id, request.name, event_id);
        self.get_tier(tier_id).await
    }

    pub async fn get_tier(&self, tier_id: i64) -> AppResult<TicketTier> {
        let mut conn = self.pool.acquire().await?;
        fetch_tier(&mut conn, tier_id).await
    }

    pub async fn check_availability(&self, tier_id: i64) -> AppResult<TierAvailability> {
        let tier = self.get_tier(tier_id).await?;
        Ok(TierAvailability {
            available: tier.is_available(Utc::now()),
            available_quantity: tier.available_quantity(),
            sold_out: tier.sold_out(),
            percentage_sold: tier.percentage_sold(),
        })
    }

    /// Reserves `quantity` units or fails atomically.
    pub async fn reserve(&self, tier_id: i64, quantity: i64) -> AppResult<Reservation> {
        let now = Utc::now();
        let mut tx = begin_write(&self.pool).await?;

        let tier = fetch_tier(&mut tx, tier_id).await?;
        let reservation = reserve_units(&mut tx, &tier, quantity, now).await?;

        tx.commit().await?;
        log::info!("reserved {quantity} unit(s) on tier {tier_id}");
        Ok(reservation)
    }

    /// Compensating decrement. Idempotent per token: releasing an already
    /// released reservation is a no-op.
    pub async fn release(&self, reservation: &mut Reservation) -> AppResult<()> {
        if reservation.released {
            return Ok(());
        }

        let mut tx = begin_write(&self.pool).await?;
        release_units(&mut tx, reservation.tier_id, reservation.quantity, Utc::now()).await?;
        tx.commit().await?;

        reservation.released = true;
        log::info!(
            "released {} unit(s) on tier {}",
            reservation.quantity,
            reservation.tier_id
        );
        Ok(())
    }
}
