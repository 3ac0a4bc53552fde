//! In-memory ticket store for testing.
//!
//! Fast, deterministic, and uses the same compare-and-set discipline as the
//! production store: the interior mutex makes each mutation atomic, so
//! concurrent scans of the same ticket resolve to exactly one winner.

use crate::store::{MarkUsed, StoreError, TicketStore};
use crate::ticket::{ScanLog, TicketContext, TicketId, TicketStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    tickets: HashMap<TicketId, TicketContext>,
    by_code: HashMap<String, TicketId>,
    scans: Vec<ScanLog>,
    sold: HashMap<Uuid, u32>,
}

/// In-memory [`TicketStore`] implementation.
///
/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct InMemoryTicketStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryTicketStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned mutex only means a test thread panicked mid-assert;
        // the data is still usable.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert a ticket with its collaborator context.
    pub fn insert(&self, context: TicketContext) {
        let mut inner = self.lock();
        inner.by_code.insert(context.ticket.code.clone(), context.ticket.id);
        inner.tickets.insert(context.ticket.id, context);
    }

    /// Set the sold counter for a price tier.
    pub fn set_sold(&self, price_tier_id: Uuid, sold: u32) {
        self.lock().sold.insert(price_tier_id, sold);
    }

    /// Current sold counter for a price tier (0 when never set).
    #[must_use]
    pub fn sold(&self, price_tier_id: Uuid) -> u32 {
        self.lock().sold.get(&price_tier_id).copied().unwrap_or(0)
    }

    /// Snapshot of all scan-log rows, in append order.
    #[must_use]
    pub fn scan_logs(&self) -> Vec<ScanLog> {
        self.lock().scans.clone()
    }

    /// Current state of a ticket, if present.
    #[must_use]
    pub fn get(&self, id: TicketId) -> Option<TicketContext> {
        self.lock().tickets.get(&id).cloned()
    }
}

impl TicketStore for InMemoryTicketStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<TicketContext>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .by_code
            .get(code)
            .and_then(|id| inner.tickets.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: TicketId) -> Result<Option<TicketContext>, StoreError> {
        Ok(self.lock().tickets.get(&id).cloned())
    }

    async fn mark_used(
        &self,
        id: TicketId,
        used_at: DateTime<Utc>,
    ) -> Result<MarkUsed, StoreError> {
        let mut inner = self.lock();
        let context = inner
            .tickets
            .get_mut(&id)
            .ok_or_else(|| StoreError::CorruptRecord(format!("ticket {id} vanished")))?;

        if context.ticket.status.is_open() {
            context.ticket.status = TicketStatus::Used;
            context.ticket.used_at = Some(used_at);
            Ok(MarkUsed::Won { used_at })
        } else {
            Ok(MarkUsed::Lost {
                status: context.ticket.status,
                used_at: context.ticket.used_at,
            })
        }
    }

    async fn cancel(
        &self,
        id: TicketId,
        cancelled_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(context) = inner.tickets.get_mut(&id) else {
            return Ok(false);
        };

        if !context.ticket.status.is_open() {
            return Ok(false);
        }

        context.ticket.status = TicketStatus::Cancelled;
        context.ticket.cancelled_at = Some(cancelled_at);

        let tier = context.price_tier_id;
        let sold = inner.sold.entry(tier).or_insert(0);
        *sold = sold.saturating_sub(1);

        Ok(true)
    }

    async fn append_scan(&self, log: ScanLog) -> Result<(), StoreError> {
        self.lock().scans.push(log);
        Ok(())
    }
}
