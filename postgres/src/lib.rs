//! `PostgreSQL` ticket store for Turnstile.
//!
//! Implements the [`TicketStore`](turnstile_core::TicketStore) trait on top
//! of sqlx. The compare-and-set transitions that keep concurrent scans and
//! cancellations honest are expressed as guarded `UPDATE` statements, so a
//! row can only move out of an open status once no matter how many workers
//! race on it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod store;

pub use store::PgTicketStore;
