//! sqlx-backed [`TicketStore`] implementation.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use turnstile_core::{
    EventSummary, MarkUsed, OrderStatus, OrderSummary, ScanLog, StoreError, Ticket, TicketContext,
    TicketId, TicketStatus, TicketStore,
};
use uuid::Uuid;

/// Columns needed to build a [`TicketContext`], joined across the ticket's
/// collaborators in one round-trip.
const CONTEXT_SELECT: &str = r"
    SELECT t.id, t.order_item_id, t.code, t.nonce, t.status,
           t.issued_at, t.used_at, t.cancelled_at,
           o.user_id, o.status AS order_status, o.customer_email,
           e.title, e.starts_at, e.organizer_email,
           oi.price_tier_id
    FROM tickets t
    JOIN order_items oi ON oi.id = t.order_item_id
    JOIN orders o ON o.id = oi.order_id
    JOIN price_tiers pt ON pt.id = oi.price_tier_id
    JOIN events e ON e.id = pt.event_id
";

/// `PostgreSQL`-backed ticket store.
///
/// # Example
///
/// ```no_run
/// use turnstile_postgres::PgTicketStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PgTicketStore::connect("postgres://localhost/turnstile", 10).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and build a pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Create or update the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    async fn find_context(&self, clause: &str, bind: Uuid) -> Result<Option<TicketContext>, StoreError> {
        let query = format!("{CONTEXT_SELECT} {clause}");
        let row = sqlx::query(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(context_from_row).transpose()
    }
}

fn db_err(error: sqlx::Error) -> StoreError {
    StoreError::Database(error.to_string())
}

/// Map one joined row back to the domain. Unknown status strings are a
/// corrupt record, not a domain outcome.
fn context_from_row(row: &PgRow) -> Result<TicketContext, StoreError> {
    let status: String = row.try_get("status").map_err(db_err)?;
    let order_status: String = row.try_get("order_status").map_err(db_err)?;

    let ticket = Ticket {
        id: TicketId::from_uuid(row.try_get("id").map_err(db_err)?),
        order_item_id: row.try_get("order_item_id").map_err(db_err)?,
        code: row.try_get("code").map_err(db_err)?,
        nonce: row.try_get("nonce").map_err(db_err)?,
        status: TicketStatus::parse(&status)
            .map_err(|s| StoreError::CorruptRecord(format!("Unknown ticket status: {s}")))?,
        issued_at: row.try_get("issued_at").map_err(db_err)?,
        used_at: row.try_get("used_at").map_err(db_err)?,
        cancelled_at: row.try_get("cancelled_at").map_err(db_err)?,
    };

    Ok(TicketContext {
        ticket,
        order: OrderSummary {
            user_id: row.try_get("user_id").map_err(db_err)?,
            status: OrderStatus::parse(&order_status)
                .map_err(|s| StoreError::CorruptRecord(format!("Unknown order status: {s}")))?,
            customer_email: row.try_get("customer_email").map_err(db_err)?,
        },
        event: EventSummary {
            title: row.try_get("title").map_err(db_err)?,
            starts_at: row.try_get("starts_at").map_err(db_err)?,
            organizer_email: row.try_get("organizer_email").map_err(db_err)?,
        },
        price_tier_id: row.try_get("price_tier_id").map_err(db_err)?,
    })
}

impl TicketStore for PgTicketStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<TicketContext>, StoreError> {
        let query = format!("{CONTEXT_SELECT} WHERE t.code = $1");
        let row = sqlx::query(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(context_from_row).transpose()
    }

    async fn find_by_id(&self, id: TicketId) -> Result<Option<TicketContext>, StoreError> {
        self.find_context("WHERE t.id = $1", *id.as_uuid()).await
    }

    async fn mark_used(
        &self,
        id: TicketId,
        used_at: DateTime<Utc>,
    ) -> Result<MarkUsed, StoreError> {
        // The status guard makes this a compare-and-set: of any number of
        // concurrent scans, exactly one update matches a row.
        let won: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r"
            UPDATE tickets
            SET status = 'Used', used_at = $2
            WHERE id = $1 AND status IN ('Issued', 'Valid')
            RETURNING used_at
            ",
        )
        .bind(*id.as_uuid())
        .bind(used_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some((used_at,)) = won {
            return Ok(MarkUsed::Won { used_at });
        }

        // Lost the race. Read back what the winner left so the caller can
        // report it.
        let current: Option<(String, Option<DateTime<Utc>>)> =
            sqlx::query_as("SELECT status, used_at FROM tickets WHERE id = $1")
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        let Some((status, used_at)) = current else {
            return Err(StoreError::CorruptRecord(format!(
                "Ticket {id} vanished during mark_used"
            )));
        };

        let status = TicketStatus::parse(&status)
            .map_err(|s| StoreError::CorruptRecord(format!("Unknown ticket status: {s}")))?;

        tracing::debug!(ticket_id = %id, status = %status, "mark_used lost compare-and-set");

        Ok(MarkUsed::Lost { status, used_at })
    }

    async fn cancel(&self, id: TicketId, cancelled_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            r"
            UPDATE tickets
            SET status = 'Cancelled', cancelled_at = $2
            WHERE id = $1 AND status IN ('Issued', 'Valid')
            ",
        )
        .bind(*id.as_uuid())
        .bind(cancelled_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            // Concurrent transition won; dropping the transaction rolls back.
            return Ok(false);
        }

        // Release the seat in the same unit of work. The `sold > 0` guard
        // floors the counter at zero.
        sqlx::query(
            r"
            UPDATE price_tiers AS pt
            SET sold = pt.sold - 1
            FROM order_items oi
            JOIN tickets t ON t.order_item_id = oi.id
            WHERE pt.id = oi.price_tier_id AND t.id = $1 AND pt.sold > 0
            ",
        )
        .bind(*id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        tracing::debug!(ticket_id = %id, "Ticket cancelled, capacity released");

        Ok(true)
    }

    async fn append_scan(&self, log: ScanLog) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO scan_logs (id, ticket_id, gate_id, scanned_at, outcome)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(log.id)
        .bind(log.ticket_id.map(|id| *id.as_uuid()))
        .bind(&log.gate_id)
        .bind(log.scanned_at)
        .bind(&log.outcome)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pg_ticket_store_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<PgTicketStore>();
        assert_sync::<PgTicketStore>();
    }
}
