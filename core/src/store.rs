//! Ticket store abstraction.
//!
//! The store is the single arbiter of ticket state transitions. Lookups
//! return a [`TicketContext`] (ticket plus the collaborator data decisions
//! need); mutations are compare-and-set so that concurrent scans or
//! cancellations of the same ticket resolve to exactly one winner.
//!
//! # Implementations
//!
//! - [`InMemoryTicketStore`](crate::memory::InMemoryTicketStore) — for
//!   testing (fast, deterministic, behind the `test-utils` feature)
//! - `PgTicketStore` (`turnstile-postgres`) — for production

use crate::ticket::{ScanLog, TicketContext, TicketId, TicketStatus};
use chrono::{DateTime, Utc};
use std::future::Future;
use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Expected domain outcomes (ticket not found, status conflict) are *not*
/// errors; they are encoded in the operation return types. These variants
/// cover infrastructure failures only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The underlying database failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

/// Result of a compare-and-set transition to `Used`.
///
/// Exactly one concurrent scan of the same ticket observes [`MarkUsed::Won`];
/// every other contender observes [`MarkUsed::Lost`] carrying the state the
/// winner (or an earlier cancellation) left behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkUsed {
    /// This caller performed the transition.
    Won {
        /// The `used_at` timestamp that was recorded.
        used_at: DateTime<Utc>,
    },
    /// Another transition got there first.
    Lost {
        /// Status the ticket actually holds.
        status: TicketStatus,
        /// The winner's `used_at`, when the ticket ended up `Used`.
        used_at: Option<DateTime<Utc>>,
    },
}

/// Persistence seam for tickets, scan logs and the price-tier sold counter.
///
/// All mutating operations are compare-and-set: they only apply when the
/// ticket is still in an open status, and they report rather than clobber
/// when a concurrent transition won.
pub trait TicketStore: Send + Sync {
    /// Look up a ticket by its scannable code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on infrastructure failure; an unknown code is
    /// `Ok(None)`.
    fn find_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<TicketContext>, StoreError>> + Send;

    /// Look up a ticket by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on infrastructure failure; an unknown id is
    /// `Ok(None)`.
    fn find_by_id(
        &self,
        id: TicketId,
    ) -> impl Future<Output = Result<Option<TicketContext>, StoreError>> + Send;

    /// Atomically transition an open ticket to `Used`, recording `used_at`.
    ///
    /// Only one concurrent caller may win; losers receive the current state
    /// so the evaluator can report `AlreadyUsed` with the winner's
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on infrastructure failure or if the id does
    /// not exist (the evaluator resolves the ticket first, so a missing row
    /// here indicates a corrupt store).
    fn mark_used(
        &self,
        id: TicketId,
        used_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<MarkUsed, StoreError>> + Send;

    /// Atomically cancel an open ticket and release its price-tier capacity.
    ///
    /// In one unit of work: status → `Cancelled`, `cancelled_at` recorded,
    /// and the price tier's `sold` counter decremented by 1, floored at 0.
    /// Returns `false` when the ticket was no longer in an open status
    /// (a concurrent scan or cancellation won); in that case nothing is
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on infrastructure failure.
    fn cancel(
        &self,
        id: TicketId,
        cancelled_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Append one scan-log row. The log is append-only; rows are never
    /// updated or deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on infrastructure failure.
    fn append_scan(&self, log: ScanLog) -> impl Future<Output = Result<(), StoreError>> + Send;
}
