//! Kafka-backed notification transport for Turnstile.
//!
//! This crate carries [`NotificationMessage`]s between the web tier and the
//! delivery worker over a Kafka-compatible broker (Redpanda in our deployments).
//! It provides both halves of the pipeline:
//!
//! - [`KafkaDispatcher`] implements the [`Dispatcher`] trait from
//!   `turnstile-core` and publishes messages to the notification topic.
//! - [`NotificationConsumer`] reads messages back out for the delivery worker,
//!   with explicit acknowledge / requeue / dead-letter controls.
//!
//! # Delivery semantics
//!
//! **At-least-once** with manual offset commits. Offsets are only committed
//! through [`NotificationConsumer::ack`] (or the requeue/dead-letter paths,
//! which re-produce the payload before committing). If the worker crashes
//! mid-message, the message is redelivered on restart, so the recipient may
//! see a duplicate email rather than none at all.
//!
//! A message that repeatedly fails delivery is moved to the dead-letter topic
//! instead of blocking the partition. A message that fails for a transient
//! worker-side reason is re-produced onto the main topic, which gives it
//! another pass after the rest of the backlog.
//!
//! # Availability
//!
//! The dispatcher connects lazily through a [`ConnectionManager`]. A broker
//! outage degrades notification delivery but never fails the business
//! operation that requested it; callers receive
//! [`DispatchError::BrokerUnavailable`](turnstile_core::DispatchError) and
//! decide for themselves whether that is fatal.
//!
//! [`Dispatcher`]: turnstile_core::Dispatcher
//! [`NotificationMessage`]: turnstile_core::NotificationMessage

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod consumer;
mod dispatcher;

pub use connection::{BrokerError, ConnectionManager};
pub use consumer::{Delivery, NotificationConsumer};
pub use dispatcher::{KafkaDispatcher, KafkaDispatcherBuilder};

/// Topic the dispatcher publishes notification messages to.
pub const NOTIFICATION_TOPIC: &str = "notifications.email";

/// Topic that receives messages the worker gave up on.
pub const DEAD_LETTER_TOPIC: &str = "notifications.email.dlq";
