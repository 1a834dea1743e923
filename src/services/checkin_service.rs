use crate::config::CheckInConfig;
use crate::database::{DbPool, begin_write};
use crate::error::{AppError, AppResult};
use crate::models::{
    Attendee, AttendeeStatus, CheckInLog, CheckInRequest, CheckInResult, Event, Ticket,
    TicketStatus,
};
use crate::services::ticket_service::find_by_code_or_uuid;
use crate::utils::pagination::{PaginatedResponse, PaginationParams};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

const ATTENDEE_COLUMNS: &str = "id, user_id, ticket_id, event_id, full_name, email, phone, \
     status, checked_in_at, checked_in_by, created_at, updated_at";

const LOG_COLUMNS: &str = "id, attendee_id, checked_in_at, checked_in_by, location, notes";

/// The attendee record is created lazily: a ticket carries the contact
/// fields until the holder first shows up at the door. The insert is a
/// no-op when a row already exists for the ticket.
async fn attendee_for_ticket(
    conn: &mut SqliteConnection,
    ticket: &Ticket,
    event_id: i64,
    now: DateTime<Utc>,
) -> AppResult<Attendee> {
    sqlx::query(
        r#"
        INSERT INTO attendees (
            user_id, ticket_id, event_id, full_name, email, phone,
            status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'registered', ?7, ?7)
        ON CONFLICT (ticket_id) DO NOTHING
        "#,
    )
    .bind(ticket.buyer_id)
    .bind(ticket.id)
    .bind(event_id)
    .bind(&ticket.attendee_name)
    .bind(&ticket.attendee_email)
    .bind(&ticket.attendee_phone)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let query = format!("SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE ticket_id = ?1");
    Ok(sqlx::query_as::<_, Attendee>(&query)
        .bind(ticket.id)
        .fetch_one(conn)
        .await?)
}

#[derive(Clone)]
pub struct CheckInService {
    pool: DbPool,
    window_hours: i64,
}

impl CheckInService {
    pub fn new(pool: DbPool, config: &CheckInConfig) -> Self {
        Self {
            pool,
            window_hours: config.window_hours,
        }
    }

    /// Records a check-in for the ticket named by code or UUID.
    ///
    /// Repeat scans are not an error: every admission gets a log row, the
    /// attendee flips to checked-in only once, and the ticket is marked
    /// used on that first admission.
    pub async fn check_in(
        &self,
        operator_id: i64,
        request: CheckInRequest,
    ) -> AppResult<CheckInResult> {
        let lookup = request
            .ticket_code
            .as_deref()
            .or(request.ticket_uuid.as_deref())
            .ok_or_else(|| {
                AppError::ValidationError("ticket_code or ticket_uuid is required".to_string())
            })?;

        let now = Utc::now();
        let mut tx = begin_write(&self.pool).await?;

        let ticket = find_by_code_or_uuid(&mut tx, lookup)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ticket '{lookup}' not found")))?;

        match ticket.status {
            TicketStatus::Cancelled | TicketStatus::Expired => {
                return Err(AppError::TicketInvalid(format!(
                    "ticket is {}",
                    ticket.status
                )));
            }
            TicketStatus::Active | TicketStatus::Used => {}
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

        // Doors open a configurable stretch before the event and close when
        // it ends.
        let opens_at = event.start_date - Duration::hours(self.window_hours);
        if now < opens_at || now > event.end_date {
            return Err(AppError::OutsideCheckInWindow);
        }

        let attendee = attendee_for_ticket(&mut tx, &ticket, event.id, now).await?;
        match attendee.status {
            AttendeeStatus::NoShow | AttendeeStatus::Cancelled => {
                return Err(AppError::AlreadyFinalState(attendee.status.to_string()));
            }
            AttendeeStatus::Registered | AttendeeStatus::CheckedIn => {}
        }

        let location = request.location.unwrap_or_default();
        let notes = request.notes.unwrap_or_default();
        let log_id = sqlx::query(
            r#"
            INSERT INTO check_in_logs (attendee_id, checked_in_at, checked_in_by, location, notes)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(attendee.id)
        .bind(now)
        .bind(operator_id)
        .bind(&location)
        .bind(&notes)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        // The guard makes the status flip first-writer-wins; repeats leave
        // the original timestamp and operator intact.
        let flipped = sqlx::query(
            r#"
            UPDATE attendees
            SET status = 'checked_in', checked_in_at = ?1, checked_in_by = ?2, updated_at = ?1
            WHERE id = ?3 AND status = 'registered'
            "#,
        )
        .bind(now)
        .bind(operator_id)
        .bind(attendee.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let first_check_in = flipped > 0;

        if first_check_in && ticket.status == TicketStatus::Active {
            sqlx::query(
                "UPDATE tickets SET status = 'used', used_at = ?1 WHERE id = ?2 AND status = 'active'",
            )
            .bind(now)
            .bind(ticket.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        log::info!(
            "attendee {} checked in by operator {} (ticket {}, first: {})",
            attendee.id,
            operator_id,
            ticket.code,
            first_check_in,
        );

        let attendee = if first_check_in {
            Attendee {
                status: AttendeeStatus::CheckedIn,
                checked_in_at: Some(now),
                checked_in_by: Some(operator_id),
                updated_at: now,
                ..attendee
            }
        } else {
            attendee
        };
        let log = CheckInLog {
            id: log_id,
            attendee_id: attendee.id,
            checked_in_at: now,
            checked_in_by: Some(operator_id),
            location,
            notes,
        };
        Ok(CheckInResult {
            attendee,
            log,
            first_check_in,
        })
    }

    pub async fn get_attendee(&self, attendee_id: i64) -> AppResult<Attendee> {
        let query = format!("SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE id = ?1");
        sqlx::query_as::<_, Attendee>(&query)
            .bind(attendee_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attendee {attendee_id} not found")))
    }

    /// Audit trail, newest first.
    pub async fn get_check_in_logs(
        &self,
        attendee_id: i64,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<CheckInLog>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM check_in_logs WHERE attendee_id = ?1")
                .bind(attendee_id)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM check_in_logs WHERE attendee_id = ?1 \
             ORDER BY checked_in_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        );
        let logs = sqlx::query_as::<_, CheckInLog>(&sql)
            .bind(attendee_id)
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(logs, params, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::{seed_event, shared_test_pool, test_pool};
    use crate::models::{CreateTierRequest, PurchaseRequest};
    use crate::services::{CheckoutService, InventoryService, TicketService};

    fn check_in_request(code: &str) -> CheckInRequest {
        CheckInRequest {
            ticket_code: Some(code.to_string()),
            ticket_uuid: None,
            location: Some("Main gate".to_string()),
            notes: None,
        }
    }

    async fn setup_with_event(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> (DbPool, CheckInService, Ticket) {
        let pool = test_pool().await;
        let event_id = seed_event(&pool, "Concert", start, end).await;
        let tier = InventoryService::new(pool.clone())
            .create_tier(
                event_id,
                CreateTierRequest {
                    name: "General".to_string(),
                    description: String::new(),
                    price: 50000,
                    quantity: 100,
                    min_purchase: None,
                    max_purchase: None,
                    sale_start: None,
                    sale_end: None,
                },
            )
            .await
            .unwrap();

        let tickets = CheckoutService::new(pool.clone())
            .purchase(
                7,
                PurchaseRequest {
                    tier_id: tier.id,
                    quantity: 1,
                    attendee_name: "Ana Torres".to_string(),
                    attendee_email: "ana@example.com".to_string(),
                    attendee_phone: None,
                    discount_code: None,
                },
            )
            .await
            .unwrap();

        let service = CheckInService::new(pool.clone(), &CheckInConfig { window_hours: 2 });
        (pool, service, tickets.into_iter().next().unwrap())
    }

    /// Event already in progress: started an hour ago, ends in five.
    async fn setup_open_doors() -> (DbPool, CheckInService, Ticket) {
        let now = Utc::now();
        setup_with_event(now - Duration::hours(1), now + Duration::hours(5)).await
    }

    #[tokio::test]
    async fn test_first_check_in() {
        let (pool, service, ticket) = setup_open_doors().await;

        let result = service.check_in(42, check_in_request(&ticket.code)).await.unwrap();
        assert!(result.first_check_in);
        assert_eq!(result.attendee.status, AttendeeStatus::CheckedIn);
        assert_eq!(result.attendee.full_name, "Ana Torres");
        assert_eq!(result.attendee.checked_in_by, Some(42));
        assert_eq!(result.log.location, "Main gate");

        // The ticket is consumed by its first admission.
        let ticket = TicketService::new(pool).get_ticket(ticket.id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Used);
        assert!(ticket.used_at.is_some());
    }

    #[tokio::test]
    async fn test_repeat_check_in_is_not_an_error() {
        let (pool, service, ticket) = setup_open_doors().await;

        let first = service.check_in(42, check_in_request(&ticket.code)).await.unwrap();
        let second = service.check_in(43, check_in_request(&ticket.code)).await.unwrap();

        assert!(first.first_check_in);
        assert!(!second.first_check_in);
        // The attendee keeps its original check-in record.
        assert_eq!(second.attendee.checked_in_by, Some(42));

        // One attendee row per ticket, no matter how many scans.
        let attendees: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM attendees WHERE ticket_id = ?1")
                .bind(ticket.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(attendees, 1);

        let logs = service
            .get_check_in_logs(first.attendee.id, &PaginationParams::new(None, None))
            .await
            .unwrap();
        assert_eq!(logs.pagination.total, 2);
        assert_eq!(logs.items[0].checked_in_by, Some(43));
    }

    #[tokio::test]
    async fn test_concurrent_check_ins_on_multi_connection_pool() {
        // Each scan runs on its own connection; both must succeed with the
        // status flip stamped exactly once.
        let pool = shared_test_pool(4).await;
        let now = Utc::now();
        let event_id = seed_event(&pool, "Concert", now - Duration::hours(1), now + Duration::hours(5)).await;
        let tier = InventoryService::new(pool.clone())
            .create_tier(
                event_id,
                CreateTierRequest {
                    name: "General".to_string(),
                    description: String::new(),
                    price: 50000,
                    quantity: 10,
                    min_purchase: None,
                    max_purchase: None,
                    sale_start: None,
                    sale_end: None,
                },
            )
            .await
            .unwrap();
        let ticket = CheckoutService::new(pool.clone())
            .purchase(
                7,
                PurchaseRequest {
                    tier_id: tier.id,
                    quantity: 1,
                    attendee_name: "Ana Torres".to_string(),
                    attendee_email: "ana@example.com".to_string(),
                    attendee_phone: None,
                    discount_code: None,
                },
            )
            .await
            .unwrap()
            .remove(0);

        let service = CheckInService::new(pool.clone(), &CheckInConfig { window_hours: 2 });
        let s1 = service.clone();
        let s2 = service.clone();
        let (r1, r2) = tokio::join!(
            s1.check_in(42, check_in_request(&ticket.code)),
            s2.check_in(43, check_in_request(&ticket.code))
        );

        let r1 = r1.unwrap();
        let r2 = r2.unwrap();
        assert!(r1.first_check_in != r2.first_check_in);

        let attendees: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM attendees WHERE ticket_id = ?1")
                .bind(ticket.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(attendees, 1);

        let logs = service
            .get_check_in_logs(r1.attendee.id, &PaginationParams::new(None, None))
            .await
            .unwrap();
        assert_eq!(logs.pagination.total, 2);
    }

    #[tokio::test]
    async fn test_check_in_by_uuid() {
        let (_pool, service, ticket) = setup_open_doors().await;

        let request = CheckInRequest {
            ticket_code: None,
            ticket_uuid: Some(ticket.uuid.clone()),
            location: None,
            notes: None,
        };
        let result = service.check_in(42, request).await.unwrap();
        assert!(result.first_check_in);
    }

    #[tokio::test]
    async fn test_check_in_requires_an_identifier() {
        let (_pool, service, _) = setup_open_doors().await;

        let request = CheckInRequest {
            ticket_code: None,
            ticket_uuid: None,
            location: None,
            notes: None,
        };
        assert!(matches!(
            service.check_in(42, request).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_check_in_before_window_opens() {
        let now = Utc::now();
        // Doors open two hours before start; five hours out is too early.
        let (_pool, service, ticket) =
            setup_with_event(now + Duration::hours(5), now + Duration::hours(10)).await;

        assert!(matches!(
            service.check_in(42, check_in_request(&ticket.code)).await,
            Err(AppError::OutsideCheckInWindow)
        ));
    }

    #[tokio::test]
    async fn test_check_in_within_pre_window() {
        let now = Utc::now();
        let (_pool, service, ticket) =
            setup_with_event(now + Duration::hours(1), now + Duration::hours(6)).await;

        let result = service.check_in(42, check_in_request(&ticket.code)).await.unwrap();
        assert!(result.first_check_in);
    }

    #[tokio::test]
    async fn test_check_in_after_event_ended() {
        let now = Utc::now();
        let (_pool, service, ticket) =
            setup_with_event(now - Duration::hours(8), now - Duration::hours(2)).await;

        assert!(matches!(
            service.check_in(42, check_in_request(&ticket.code)).await,
            Err(AppError::OutsideCheckInWindow)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_ticket_is_rejected() {
        let (pool, service, ticket) = setup_open_doors().await;
        sqlx::query("UPDATE tickets SET status = 'cancelled' WHERE id = ?1")
            .bind(ticket.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            service.check_in(42, check_in_request(&ticket.code)).await,
            Err(AppError::TicketInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_ticket() {
        let (_pool, service, _) = setup_open_doors().await;

        assert!(matches!(
            service.check_in(42, check_in_request("NOSUCHTICKET")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_no_show_attendee_is_final() {
        let (pool, service, ticket) = setup_open_doors().await;
        let result = service.check_in(42, check_in_request(&ticket.code)).await.unwrap();

        sqlx::query("UPDATE attendees SET status = 'no_show' WHERE id = ?1")
            .bind(result.attendee.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            service.check_in(42, check_in_request(&ticket.code)).await,
            Err(AppError::AlreadyFinalState(_))
        ));
    }

    #[tokio::test]
    async fn test_log_pagination() {
        let (_pool, service, ticket) = setup_open_doors().await;
        let mut attendee_id = 0;
        for _ in 0..5 {
            let result = service.check_in(42, check_in_request(&ticket.code)).await.unwrap();
            attendee_id = result.attendee.id;
        }

        let page = service
            .get_check_in_logs(attendee_id, &PaginationParams::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);
    }
}
