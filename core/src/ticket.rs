//! Ticket, scan-log and collaborator summary types.
//!
//! The [`Ticket`] is the only entity owned by this crate. The surrounding
//! order/event/price-tier records are external collaborators; the slices of
//! them the state machine needs are carried on [`TicketContext`] by the
//! store lookup.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a ticket.
///
/// `Used` and `Cancelled` are terminal with respect to scanning: a ticket
/// that reached either can never become scannable again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Issued but not yet activated for entry.
    Issued,
    /// Activated and scannable at the gate.
    Valid,
    /// Honored at a gate exactly once.
    Used,
    /// Cancelled by the holder.
    Cancelled,
    /// Refunded through the payment collaborator.
    Refunded,
}

impl TicketStatus {
    /// Convert status to its database/wire string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "Issued",
            Self::Valid => "Valid",
            Self::Used => "Used",
            Self::Cancelled => "Cancelled",
            Self::Refunded => "Refunded",
        }
    }

    /// Parse status from its string representation.
    ///
    /// # Errors
    ///
    /// Returns the offending string if it doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "Issued" => Ok(Self::Issued),
            "Valid" => Ok(Self::Valid),
            "Used" => Ok(Self::Used),
            "Cancelled" => Ok(Self::Cancelled),
            "Refunded" => Ok(Self::Refunded),
            other => Err(other.to_string()),
        }
    }

    /// Whether a ticket in this status may still transition to `Used` or
    /// `Cancelled`.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Issued | Self::Valid)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status of the owning order, as reported by the order collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created, payment not completed.
    Pending,
    /// Payment completed.
    Paid,
    /// Order cancelled before payment.
    Cancelled,
    /// Payment refunded.
    Refunded,
}

impl OrderStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Cancelled => "Cancelled",
            Self::Refunded => "Refunded",
        }
    }

    /// Parse status from its string representation.
    ///
    /// # Errors
    ///
    /// Returns the offending string if it doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Cancelled" => Ok(Self::Cancelled),
            "Refunded" => Ok(Self::Refunded),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single admission ticket.
///
/// # Invariants
///
/// - `used_at` is `Some` iff `status == Used`.
/// - `cancelled_at` is `Some` iff `status == Cancelled`.
/// - The transitions into `Used` and into `Cancelled` each happen at most
///   once; the store enforces this with compare-and-set updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket identity.
    pub id: TicketId,

    /// Owning order item (external collaborator).
    pub order_item_id: Uuid,

    /// Unique scannable code printed on the ticket.
    pub code: String,

    /// Single-use secret nonce. Never exposed after issuance.
    #[serde(skip_serializing)]
    pub nonce: String,

    /// Current lifecycle status.
    pub status: TicketStatus,

    /// When the ticket was issued.
    pub issued_at: DateTime<Utc>,

    /// When the ticket was honored at a gate, if ever.
    pub used_at: Option<DateTime<Utc>>,

    /// When the ticket was cancelled, if ever.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Issue a fresh ticket for an order item.
    ///
    /// Generates a unique scannable code and a secret nonce. The caller
    /// (order fulfillment, out of scope here) persists the result.
    #[must_use]
    pub fn issue(order_item_id: Uuid, issued_at: DateTime<Utc>) -> Self {
        Self {
            id: TicketId::new(),
            order_item_id,
            code: random_token(12),
            nonce: random_token(32),
            status: TicketStatus::Issued,
            issued_at,
            used_at: None,
            cancelled_at: None,
        }
    }

    /// Public summary of this ticket, safe to return to callers.
    ///
    /// The nonce is deliberately absent.
    #[must_use]
    pub fn summary(&self) -> TicketSummary {
        TicketSummary {
            id: self.id,
            code: self.code.clone(),
            status: self.status,
            issued_at: self.issued_at,
            used_at: self.used_at,
        }
    }
}

/// Generate a random alphanumeric token of the given length.
fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Public ticket view returned from scan and cancellation operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSummary {
    /// Ticket identity.
    pub id: TicketId,
    /// Scannable code.
    pub code: String,
    /// Current status.
    pub status: TicketStatus,
    /// Issue timestamp.
    pub issued_at: DateTime<Utc>,
    /// Gate-use timestamp, if used.
    pub used_at: Option<DateTime<Utc>>,
}

/// Slice of the owning order the state machine needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    /// Purchasing user.
    pub user_id: String,
    /// Payment status.
    pub status: OrderStatus,
    /// Ticket holder's email address, for notifications.
    pub customer_email: String,
}

/// Slice of the event record the state machine needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Event title, used in notification subjects and bodies.
    pub title: String,
    /// When the event starts. Drives the cancellation window.
    pub starts_at: DateTime<Utc>,
    /// Organizer's email address, for cancellation notices.
    pub organizer_email: String,
}

/// A ticket joined with the collaborator data its decisions depend on.
///
/// Produced by [`TicketStore`](crate::store::TicketStore) lookups so the
/// evaluator and the cancellation workflow never need a second round-trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketContext {
    /// The ticket itself.
    pub ticket: Ticket,
    /// Owning order summary.
    pub order: OrderSummary,
    /// Event summary.
    pub event: EventSummary,
    /// Price tier whose `sold` counter is released on cancellation.
    pub price_tier_id: Uuid,
}

/// Append-only audit record of one scan attempt.
///
/// One row is written per attempt, including failed lookups; rows are never
/// mutated or deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanLog {
    /// Log entry identity.
    pub id: Uuid,
    /// Scanned ticket, or `None` when the code resolved to nothing.
    pub ticket_id: Option<TicketId>,
    /// Gate the scan came from.
    pub gate_id: String,
    /// When the scan happened.
    pub scanned_at: DateTime<Utc>,
    /// Outcome string as returned to the gate.
    pub outcome: String,
}

impl ScanLog {
    /// Build a scan-log row for one attempt.
    #[must_use]
    pub fn record(
        ticket_id: Option<TicketId>,
        gate_id: &str,
        scanned_at: DateTime<Utc>,
        outcome: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            gate_id: gate_id.to_string(),
            scanned_at,
            outcome: outcome.to_string(),
        }
    }
}
