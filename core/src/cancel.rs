//! Ticket cancellation workflow.
//!
//! Validates eligibility in a fixed order, applies the state mutation and
//! capacity release atomically through the store, then dispatches
//! notifications best-effort. The state mutation is the authoritative
//! outcome: a failed dispatch is logged and counted, never rolled back.

use crate::notification::{Dispatcher, NotificationMessage};
use crate::store::{StoreError, TicketStore};
use crate::ticket::{TicketContext, TicketId, TicketStatus, TicketSummary};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};

/// Cancellation is refused inside this window before event start.
///
/// Hard invariant: once inside the window, cancellation is refused
/// regardless of who asks.
pub const CANCELLATION_WINDOW_HOURS: i64 = 24;

/// Typed reasons a cancellation is refused.
///
/// Distinct per rule so clients can render precise messages. `NotOwned` is
/// deliberately separate from `NotFound`; callers may mask it as not-found
/// at the boundary to avoid leaking existence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CancelError {
    /// No ticket with this id exists.
    #[error("Ticket not found")]
    NotFound,

    /// The ticket belongs to a different user.
    #[error("Ticket does not belong to the requesting user")]
    NotOwned,

    /// Only `Issued` or `Valid` tickets can be cancelled.
    #[error("Cannot cancel ticket with status '{status}'. Only 'Issued' or 'Valid' tickets can be cancelled.")]
    NotCancellable {
        /// The status the ticket actually holds.
        status: TicketStatus,
    },

    /// The owning order has not been paid.
    #[error("Cannot cancel ticket from unpaid order")]
    OrderUnpaid,

    /// Less than [`CANCELLATION_WINDOW_HOURS`] remain before event start.
    #[error("Tickets can only be cancelled at least {CANCELLATION_WINDOW_HOURS} hours before the event starts")]
    WindowClosed,

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cancel a ticket on behalf of its holder.
///
/// Preconditions are checked in order, each a hard stop: ownership, open
/// status, paid order, then the 24-hour window. On success the store
/// applies, in one unit of work: status → `Cancelled`, `cancelled_at` =
/// now, price-tier `sold` decremented by 1 floored at 0.
///
/// Afterwards a cancellation confirmation is dispatched to the holder and a
/// notice to the organizer, best-effort: failures are logged and counted
/// but the returned summary reflects the committed cancellation either way.
///
/// # Errors
///
/// Returns a [`CancelError`] variant naming the first violated rule, or
/// `CancelError::Store` when the store itself fails.
pub async fn cancel_ticket<S, D>(
    store: &S,
    dispatcher: &D,
    ticket_id: TicketId,
    user_id: &str,
) -> Result<TicketSummary, CancelError>
where
    S: TicketStore,
    D: Dispatcher,
{
    let now = Utc::now();

    let context = store
        .find_by_id(ticket_id)
        .await?
        .ok_or(CancelError::NotFound)?;

    check_eligibility(&context, user_id, now)?;

    // One unit of work: status CAS + cancelled_at + sold-counter release.
    // `false` means a concurrent transition won between our read and the
    // store update; report the status it actually holds now.
    if !store.cancel(ticket_id, now).await? {
        let status = store
            .find_by_id(ticket_id)
            .await?
            .map_or(TicketStatus::Cancelled, |c| c.ticket.status);
        return Err(CancelError::NotCancellable { status });
    }

    info!(
        ticket_id = %ticket_id,
        user_id = %user_id,
        event = %context.event.title,
        "Ticket cancelled"
    );
    metrics::counter!("turnstile.cancellations").increment(1);

    notify_cancelled(dispatcher, &context, now).await;

    let mut ticket = context.ticket;
    ticket.status = TicketStatus::Cancelled;
    ticket.cancelled_at = Some(now);
    Ok(ticket.summary())
}

/// Apply the precondition chain. Pure; no side effects.
fn check_eligibility(
    context: &TicketContext,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<(), CancelError> {
    if context.order.user_id != user_id {
        return Err(CancelError::NotOwned);
    }

    if !context.ticket.status.is_open() {
        return Err(CancelError::NotCancellable {
            status: context.ticket.status,
        });
    }

    if context.order.status != crate::ticket::OrderStatus::Paid {
        return Err(CancelError::OrderUnpaid);
    }

    if context.event.starts_at - now < Duration::hours(CANCELLATION_WINDOW_HOURS) {
        return Err(CancelError::WindowClosed);
    }

    Ok(())
}

/// Dispatch holder confirmation and organizer notice, best-effort.
///
/// Dispatch failure must not fail the cancellation: the state mutation is
/// already committed. Each failure is logged with structure and counted so
/// operators can observe degraded notification delivery.
async fn notify_cancelled<D: Dispatcher>(
    dispatcher: &D,
    context: &TicketContext,
    cancelled_at: DateTime<Utc>,
) {
    let holder = NotificationMessage::ticket_cancellation(
        &context.order.customer_email,
        &context.event.title,
        &context.ticket.code,
        cancelled_at,
    );
    let organizer = NotificationMessage::organizer_cancellation(
        &context.event.organizer_email,
        &context.event.title,
        &context.ticket.code,
        &context.order.customer_email,
    );

    for message in [holder, organizer] {
        if let Err(e) = dispatcher.dispatch(&message).await {
            warn!(
                ticket_id = %context.ticket.id,
                kind = %message.kind,
                to = %message.to_email,
                error = %e,
                "Cancellation notification not queued"
            );
            metrics::counter!("turnstile.dispatch_failures", "kind" => message.kind.as_str())
                .increment(1);
        }
    }
}
