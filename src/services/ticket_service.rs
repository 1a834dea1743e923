use crate::database::{DbPool, begin_write};
use crate::error::{AppError, AppResult};
use crate::models::{
    DiscountResult, Event, PurchaseRequest, Ticket, TicketQuery, TicketStatus, TicketTier,
    TicketValidation,
};
use crate::services::inventory_service::release_units;
use crate::utils::pagination::{PaginatedResponse, PaginationParams};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

const TICKET_COLUMNS: &str = "id, tier_id, buyer_id, code, uuid, status, attendee_name, \
     attendee_email, attendee_phone, purchase_price, discount_applied, discount_code_id, \
     purchased_at, used_at, cancelled_at";

/// Collision retries before giving up; at 32^12 codes more than one pass is
/// already suspicious.
const MAX_CODE_ATTEMPTS: usize = 10;

/// Cancellation closes this many hours before the event starts.
const CANCELLATION_CUTOFF_HOURS: i64 = 24;

/// Source of candidate ticket codes. Production uses the random generator;
/// tests substitute deterministic sources to drive the collision path.
pub(crate) type CodeSource = dyn Fn() -> String + Send + Sync;

async fn unique_ticket_code(conn: &mut SqliteConnection, codes: &CodeSource) -> AppResult<String> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = codes();
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE code = ?1")
            .bind(&code)
            .fetch_one(&mut *conn)
            .await?;
        if exists == 0 {
            return Ok(code);
        }
        log::warn!("ticket code collision on '{code}', regenerating");
    }
    Err(AppError::InternalError(
        "could not generate a unique ticket code".to_string(),
    ))
}

/// Mints one ticket row. Runs strictly after a successful reservation,
/// inside the same transaction; touches no inventory state.
pub(crate) async fn issue_ticket(
    conn: &mut SqliteConnection,
    tier: &TicketTier,
    buyer_id: i64,
    request: &PurchaseRequest,
    discount: Option<&DiscountResult>,
    codes: &CodeSource,
    now: DateTime<Utc>,
) -> AppResult<Ticket> {
    let code = unique_ticket_code(conn, codes).await?;
    let uuid = Uuid::new_v4().to_string();
    let (discount_applied, discount_code_id) = match discount {
        Some(d) => (d.discount_per_ticket, Some(d.code_id)),
        None => (0, None),
    };
    let attendee_phone = request.attendee_phone.clone().unwrap_or_default();

    let result = sqlx::query(
        r#"
        INSERT INTO tickets (
            tier_id, buyer_id, code, uuid, status,
            attendee_name, attendee_email, attendee_phone,
            purchase_price, discount_applied, discount_code_id, purchased_at
        ) VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(tier.id)
    .bind(buyer_id)
    .bind(&code)
    .bind(&uuid)
    .bind(&request.attendee_name)
    .bind(&request.attendee_email)
    .bind(&attendee_phone)
    .bind(tier.price)
    .bind(discount_applied)
    .bind(discount_code_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Ticket {
        id: result.last_insert_rowid(),
        tier_id: tier.id,
        buyer_id,
        code,
        uuid,
        status: TicketStatus::Active,
        attendee_name: request.attendee_name.clone(),
        attendee_email: request.attendee_email.clone(),
        attendee_phone,
        purchase_price: tier.price,
        discount_applied,
        discount_code_id,
        purchased_at: now,
        used_at: None,
        cancelled_at: None,
    })
}

pub(crate) async fn find_by_code_or_uuid(
    conn: &mut SqliteConnection,
    code_or_uuid: &str,
) -> AppResult<Option<Ticket>> {
    let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE code = ?1 OR uuid = ?1");
    Ok(sqlx::query_as::<_, Ticket>(&query)
        .bind(code_or_uuid)
        .fetch_optional(conn)
        .await?)
}

#[derive(Clone)]
pub struct TicketService {
    pool: DbPool,
}

impl TicketService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_ticket(&self, ticket_id: i64) -> AppResult<Ticket> {
        let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1");
        sqlx::query_as::<_, Ticket>(&query)
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ticket {ticket_id} not found")))
    }

    /// Verification path for QR scans and manual lookups. Unknown or
    /// non-active tickets answer `valid: false` with a reason; this never
    /// errors on bad input.
    pub async fn validate_ticket(&self, code_or_uuid: &str) -> AppResult<TicketValidation> {
        let mut conn = self.pool.acquire().await?;
        let ticket = find_by_code_or_uuid(&mut conn, code_or_uuid).await?;

        let Some(ticket) = ticket else {
            return Ok(TicketValidation {
                valid: false,
                reason: Some("ticket not found".to_string()),
                ticket: None,
            });
        };

        if ticket.is_valid() {
            Ok(TicketValidation {
                valid: true,
                reason: None,
                ticket: Some(ticket),
            })
        } else {
            Ok(TicketValidation {
                valid: false,
                reason: Some(format!("ticket {}", ticket.status)),
                ticket: Some(ticket),
            })
        }
    }

    /// Read-only listing for buyers and export collaborators.
    pub async fn get_buyer_tickets(
        &self,
        buyer_id: i64,
        query: &TicketQuery,
    ) -> AppResult<PaginatedResponse<Ticket>> {
        let params = PaginationParams::new(query.page, query.per_page);
        let offset = params.get_offset() as i64;
        let limit = params.get_limit() as i64;

        let (total, tickets) = match query.status {
            Some(status) => {
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM tickets WHERE buyer_id = ?1 AND status = ?2",
                )
                .bind(buyer_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;

                let sql = format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets \
                     WHERE buyer_id = ?1 AND status = ?2 \
                     ORDER BY purchased_at DESC LIMIT ?3 OFFSET ?4"
                );
                let tickets = sqlx::query_as::<_, Ticket>(&sql)
                    .bind(buyer_id)
                    .bind(status)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?;
                (total, tickets)
            }
            None => {
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE buyer_id = ?1")
                        .bind(buyer_id)
                        .fetch_one(&self.pool)
                        .await?;

                let sql = format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets WHERE buyer_id = ?1 \
                     ORDER BY purchased_at DESC LIMIT ?2 OFFSET ?3"
                );
                let tickets = sqlx::query_as::<_, Ticket>(&sql)
                    .bind(buyer_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?;
                (total, tickets)
            }
        };

        Ok(PaginatedResponse::new(tickets, &params, total))
    }

    /// Cancels an active ticket and returns its unit to the tier's pool in
    /// the same transaction. Refused inside the cutoff before event start.
    pub async fn cancel_ticket(&self, buyer_id: i64, ticket_id: i64) -> AppResult<Ticket> {
        let now = Utc::now();
        let mut tx = begin_write(&self.pool).await?;

        let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1");
        let ticket = sqlx::query_as::<_, Ticket>(&query)
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ticket {ticket_id} not found")))?;

        if ticket.buyer_id != buyer_id {
            return Err(AppError::PermissionDenied);
        }
        if ticket.status != TicketStatus::Active {
            return Err(AppError::TicketInvalid(format!(
                "ticket is {}",
                ticket.status
            )));
        }

        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT e.id, e.title, e.start_date, e.end_date
            FROM events e
            JOIN ticket_tiers t ON t.event_id = e.id
            WHERE t.id = ?1
            "#,
        )
        .bind(ticket.tier_id)
        .fetch_one(&mut *tx)
        .await?;

        if now + Duration::hours(CANCELLATION_CUTOFF_HOURS) > event.start_date {
            return Err(AppError::ValidationError(
                "tickets can no longer be cancelled for this event".to_string(),
            ));
        }

        sqlx::query("UPDATE tickets SET status = 'cancelled', cancelled_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(ticket.id)
            .execute(&mut *tx)
            .await?;

        release_units(&mut tx, ticket.tier_id, 1, now).await?;
        tx.commit().await?;

        log::info!("ticket {} cancelled by buyer {}", ticket.id, buyer_id);
        self.get_ticket(ticket.id).await
    }
}
