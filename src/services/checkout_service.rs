use crate::database::{DbPool, begin_write};
use crate::error::AppResult;
use crate::models::{PurchaseRequest, Ticket};
use crate::services::ticket_service::CodeSource;
use crate::services::{discount_service, inventory_service, ticket_service};
use crate::utils::generate_ticket_code;
use chrono::Utc;
use std::sync::Arc;

/// Composes discount evaluation, inventory reservation and ticket issuance
/// into one all-or-nothing purchase.
#[derive(Clone)]
pub struct CheckoutService {
    pool: DbPool,
    codes: Arc<CodeSource>,
}

impl CheckoutService {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            codes: Arc::new(generate_ticket_code),
        }
    }

    /// Issues tickets with codes drawn from `codes` instead of the default
    /// random generator.
    pub fn with_code_source(pool: DbPool, codes: Arc<CodeSource>) -> Self {
        Self { pool, codes }
    }

    /// Purchases `request.quantity` tickets for `buyer_id`.
    ///
    /// Every mutating step runs inside a single transaction: the tier's
    /// sold count, the discount's use count and the new ticket rows become
    /// durable together or not at all. A failure at any step, including
    /// losing the race for a discount's last use, rolls everything back.
    pub async fn purchase(
        &self,
        buyer_id: i64,
        request: PurchaseRequest,
    ) -> AppResult<Vec<Ticket>> {
        let now = Utc::now();
        let mut tx = begin_write(&self.pool).await?;

        let tier = inventory_service::fetch_tier(&mut tx, request.tier_id).await?;

        // Price the discount first; nothing is mutated yet.
        let discount = match request.discount_code.as_deref() {
            Some(code) => {
                let discount_code =
                    discount_service::fetch_code_for_event(&mut tx, code, tier.event_id).await?;
                Some(
                    discount_service::evaluate_code(
                        &mut tx,
                        &discount_code,
                        &tier,
                        buyer_id,
                        request.quantity,
                        now,
                    )
                    .await?,
                )
            }
            None => None,
        };

        let reservation =
            inventory_service::reserve_units(&mut tx, &tier, request.quantity, now).await?;

        // One use per order, not per ticket. Losing the race for the last
        // use aborts the purchase with CodeExhausted.
        if let Some(result) = &discount {
            discount_service::consume_code(&mut tx, result.code_id, now).await?;
        }

        let mut tickets = Vec::with_capacity(reservation.quantity() as usize);
        for _ in 0..reservation.quantity() {
            let ticket = ticket_service::issue_ticket(
                &mut tx,
                &tier,
                buyer_id,
                &request,
                discount.as_ref(),
                self.codes.as_ref(),
                now,
            )
            .await?;
            tickets.push(ticket);
        }

        tx.commit().await?;

        log::info!(
            "buyer {} purchased {} ticket(s) on tier {} (discount: {})",
            buyer_id,
            tickets.len(),
            tier.id,
            discount.as_ref().map(|d| d.code.as_str()).unwrap_or("none"),
        );
        Ok(tickets)
    }
}
