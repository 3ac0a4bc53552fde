//! Core domain logic for the Turnstile ticketing system.
//!
//! This crate owns the two hard problems of the platform:
//!
//! 1. **Ticket lifecycle state machine** — gate scanning and cancellation
//!    decisions that are safe under concurrent access. A ticket must never
//!    be honored twice at a gate and never refunded twice; both transitions
//!    are compare-and-set through the [`TicketStore`].
//! 2. **Notification envelope** — the self-contained unit of work carried by
//!    the durable broker from request-handling code to the delivery worker.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌────────────────┐
//! │ Gate device  │────▶│  Scan evaluator  │────▶│  TicketStore   │
//! └──────────────┘     └──────────────────┘     │  + ScanLog     │
//!                                               └────────────────┘
//! ┌──────────────┐     ┌──────────────────┐     ┌────────────────┐
//! │ Request      │────▶│  Cancellation    │────▶│  TicketStore   │
//! │ handler      │     │  workflow        │     └────────────────┘
//! └──────────────┘     └────────┬─────────┘
//!                               │ best-effort
//!                               ▼
//!                      ┌──────────────────┐     ┌────────────────┐
//!                      │   Dispatcher     │────▶│ Durable broker │
//!                      └──────────────────┘     └────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Expected outcomes are values, not errors**: an unknown scan code is
//!   [`ScanOutcome::Invalid`], not an `Err`. Errors are reserved for
//!   infrastructure failures (store unreachable, broker down).
//! - **State first, notification second**: the cancellation state mutation
//!   is the authoritative outcome. Notification dispatch is best-effort and
//!   can never roll it back.
//! - **Traits at the seams**: [`TicketStore`] and [`Dispatcher`] live here;
//!   implementations (`turnstile-postgres`, `turnstile-broker`) depend on
//!   this crate, never the other way around.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
pub mod notification;
pub mod scan;
pub mod store;
pub mod ticket;

#[cfg(feature = "test-utils")]
pub mod memory;
#[cfg(feature = "test-utils")]
pub mod mocks;

pub use cancel::{cancel_ticket, CancelError, CANCELLATION_WINDOW_HOURS};
pub use notification::{DispatchError, Dispatcher, NotificationKind, NotificationMessage};
pub use scan::{scan_ticket, ScanOutcome, ScanRequest, ScanResponse};
pub use store::{MarkUsed, StoreError, TicketStore};
pub use ticket::{
    EventSummary, OrderStatus, OrderSummary, ScanLog, Ticket, TicketContext, TicketId,
    TicketStatus, TicketSummary,
};

#[cfg(feature = "test-utils")]
pub use memory::InMemoryTicketStore;
#[cfg(feature = "test-utils")]
pub use mocks::MockDispatcher;
