//! Gate-scan evaluator.
//!
//! Maps one scan attempt to exactly one outcome, writing exactly one
//! [`ScanLog`] row regardless of the result. Only the `Valid` path mutates
//! the ticket, and that mutation is a compare-and-set through the store:
//! of any number of concurrent scans of the same ticket, exactly one
//! observes `Valid` and the rest observe `AlreadyUsed`.
//!
//! Decision order (first match wins):
//!
//! 1. code unresolved → [`ScanOutcome::Invalid`]
//! 2. ticket already used → [`ScanOutcome::AlreadyUsed`] (original timestamp)
//! 3. ticket cancelled or refunded → [`ScanOutcome::Revoked`]
//! 4. owning order not paid → [`ScanOutcome::Unpaid`]
//! 5. otherwise → [`ScanOutcome::Valid`] (status → `Used`, `used_at` = now)

use crate::store::{MarkUsed, StoreError, TicketStore};
use crate::ticket::{ScanLog, TicketStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// One scan attempt from a gate device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// The scanned ticket code.
    pub ticket_code: String,
    /// Identifier of the scanning gate.
    pub gate_id: String,
    /// Optional gate-device signature (verified by an outer layer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Outcome of one scan attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOutcome {
    /// The code does not resolve to any ticket.
    Invalid,
    /// The ticket was already honored at a gate.
    AlreadyUsed,
    /// The ticket was cancelled or refunded and can never admit.
    Revoked,
    /// The owning order has not been paid.
    Unpaid,
    /// Admission granted; the ticket is now `Used`.
    Valid,
}

impl ScanOutcome {
    /// Stable string form, written to the scan log and the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::AlreadyUsed => "AlreadyUsed",
            Self::Revoked => "Revoked",
            Self::Unpaid => "Unpaid",
            Self::Valid => "Valid",
        }
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response returned to the gate device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    /// Scan outcome.
    pub status: ScanOutcome,
    /// When the ticket was used. For `AlreadyUsed` this is the timestamp of
    /// the scan that originally won; `None` for all negative outcomes.
    pub used_at: Option<DateTime<Utc>>,
}

/// Evaluate one scan attempt.
///
/// Always appends exactly one scan-log row, including for failed lookups
/// (logged against no ticket). Idempotent from the gate's perspective:
/// re-scanning a used ticket reports `AlreadyUsed` with the original
/// timestamp and never mutates anything.
///
/// # Errors
///
/// Returns [`StoreError`] only when the store itself fails; every expected
/// gate-side condition is a [`ScanOutcome`] inside `Ok`.
pub async fn scan_ticket<S: TicketStore>(
    store: &S,
    request: &ScanRequest,
) -> Result<ScanResponse, StoreError> {
    let now = Utc::now();

    let Some(context) = store.find_by_code(&request.ticket_code).await? else {
        return conclude(store, None, &request.gate_id, now, ScanOutcome::Invalid, None).await;
    };

    let ticket = &context.ticket;
    let ticket_id = Some(ticket.id);

    match ticket.status {
        TicketStatus::Used => {
            conclude(
                store,
                ticket_id,
                &request.gate_id,
                now,
                ScanOutcome::AlreadyUsed,
                ticket.used_at,
            )
            .await
        }
        TicketStatus::Cancelled | TicketStatus::Refunded => {
            conclude(store, ticket_id, &request.gate_id, now, ScanOutcome::Revoked, None).await
        }
        TicketStatus::Issued | TicketStatus::Valid => {
            if context.order.status != crate::ticket::OrderStatus::Paid {
                return conclude(
                    store,
                    ticket_id,
                    &request.gate_id,
                    now,
                    ScanOutcome::Unpaid,
                    None,
                )
                .await;
            }

            // The store arbitrates the race: exactly one concurrent scan wins.
            match store.mark_used(ticket.id, now).await? {
                MarkUsed::Won { used_at } => {
                    info!(
                        ticket_id = %ticket.id,
                        gate_id = %request.gate_id,
                        "Ticket admitted"
                    );
                    conclude(
                        store,
                        ticket_id,
                        &request.gate_id,
                        now,
                        ScanOutcome::Valid,
                        Some(used_at),
                    )
                    .await
                }
                MarkUsed::Lost { status, used_at } => {
                    debug!(
                        ticket_id = %ticket.id,
                        status = %status,
                        "Lost mark-used race"
                    );
                    let outcome = match status {
                        TicketStatus::Cancelled | TicketStatus::Refunded => ScanOutcome::Revoked,
                        _ => ScanOutcome::AlreadyUsed,
                    };
                    let reported_used_at = match outcome {
                        ScanOutcome::AlreadyUsed => used_at,
                        _ => None,
                    };
                    conclude(
                        store,
                        ticket_id,
                        &request.gate_id,
                        now,
                        outcome,
                        reported_used_at,
                    )
                    .await
                }
            }
        }
    }
}

/// Append the audit row and build the response. Shared tail of every path.
async fn conclude<S: TicketStore>(
    store: &S,
    ticket_id: Option<crate::ticket::TicketId>,
    gate_id: &str,
    scanned_at: DateTime<Utc>,
    outcome: ScanOutcome,
    used_at: Option<DateTime<Utc>>,
) -> Result<ScanResponse, StoreError> {
    store
        .append_scan(ScanLog::record(ticket_id, gate_id, scanned_at, outcome.as_str()))
        .await?;

    metrics::counter!("turnstile.scans", "outcome" => outcome.as_str()).increment(1);

    Ok(ScanResponse {
        status: outcome,
        used_at,
    })
}
