//! Notification delivery worker for Turnstile.
//!
//! A long-running process that drains the notification topic and turns
//! queued [`NotificationMessage`]s into real emails over SMTP. It is the
//! only component that talks to the mail relay; everything upstream just
//! queues work and moves on.
//!
//! # Processing model
//!
//! One message at a time, settled with an explicit verdict:
//!
//! - delivered, or undecodable garbage: **acknowledge** and move on
//! - every send attempt failed: **dead-letter** for manual inspection
//! - worker-side infrastructure fault: **requeue** for another pass
//!
//! The broker redelivers anything the worker dies holding, so a crash costs
//! a possible duplicate email, never a lost one.
//!
//! [`NotificationMessage`]: turnstile_core::NotificationMessage

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod config;
pub mod delivery;
pub mod mailer;
pub mod worker;

pub use backoff::Backoff;
pub use config::WorkerConfig;
pub use delivery::{Disposition, SendPolicy, process_payload};
pub use mailer::{MailError, Mailer, SmtpMailer};
pub use worker::{DeliveryWorker, WorkerError};
