//! Notification envelope and dispatcher seam.
//!
//! A [`NotificationMessage`] is a self-contained unit of work: destination,
//! subject, pre-rendered HTML body, kind, unique message id and creation
//! timestamp. Rendering happens here, at dispatch time, in request-handling
//! code; the delivery worker only ever sends what it is handed.
//!
//! Ownership: the dispatcher owns the message until it is handed to the
//! broker; the broker owns it until the delivery worker acknowledges.
//!
//! # Wire Schema
//!
//! Serialized as camelCase JSON:
//!
//! ```json
//! {
//!   "toEmail": "holder@example.com",
//!   "subject": "Your ticket is cancelled - Summer Jam",
//!   "body": "<html>...</html>",
//!   "kind": "TicketCancellation",
//!   "messageId": "2b3e...",
//!   "createdAt": "2026-08-30T12:00:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

/// Category of a transactional notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Email address confirmation after registration.
    EmailConfirmation,
    /// Password reset link.
    PasswordReset,
    /// Ticket purchase confirmation.
    TicketConfirmation,
    /// Cancellation confirmation sent to the ticket holder.
    TicketCancellation,
    /// Cancellation notice sent to the event organizer.
    OrganizerCancellation,
}

impl NotificationKind {
    /// Stable string form, used as the broker partition key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmailConfirmation => "EmailConfirmation",
            Self::PasswordReset => "PasswordReset",
            Self::TicketConfirmation => "TicketConfirmation",
            Self::TicketCancellation => "TicketCancellation",
            Self::OrganizerCancellation => "OrganizerCancellation",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit carried by the durable broker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    /// Destination address.
    pub to_email: String,
    /// Subject line.
    pub subject: String,
    /// Pre-rendered HTML body, ready to send.
    pub body: String,
    /// Delivery category.
    pub kind: NotificationKind,
    /// Unique message identifier, for observability and duplicate tracing.
    pub message_id: Uuid,
    /// When the envelope was created.
    pub created_at: DateTime<Utc>,
}

impl NotificationMessage {
    /// Build an envelope from already-rendered content.
    #[must_use]
    pub fn new(
        to_email: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        kind: NotificationKind,
    ) -> Self {
        Self {
            to_email: to_email.into(),
            subject: subject.into(),
            body: body.into(),
            kind,
            message_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    /// Render a ticket purchase confirmation for the holder.
    #[must_use]
    pub fn ticket_confirmation(to_email: &str, event_name: &str, ticket_code: &str) -> Self {
        let subject = format!("Your ticket is ready - {event_name}");
        let body = html_body(
            "Your ticket is ready!",
            &format!(
                "<p>Thank you for your purchase. Your ticket for \
                 <strong>{event_name}</strong> is confirmed.</p>\
                 <p><strong>Ticket code:</strong> {ticket_code}</p>\
                 <p>Keep this code safe. You will need it at the gate.</p>"
            ),
        );
        Self::new(to_email, subject, body, NotificationKind::TicketConfirmation)
    }

    /// Render a cancellation confirmation for the ticket holder.
    #[must_use]
    pub fn ticket_cancellation(
        to_email: &str,
        event_name: &str,
        ticket_code: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Self {
        let subject = format!("Your ticket is cancelled - {event_name}");
        let body = html_body(
            "Cancellation confirmed",
            &format!(
                "<p>Your ticket for <strong>{event_name}</strong> has been \
                 cancelled.</p>\
                 <p><strong>Ticket code:</strong> {ticket_code}</p>\
                 <p><strong>Cancelled at:</strong> {} UTC</p>\
                 <p>If you have any questions, please contact us.</p>",
                cancelled_at.format("%d.%m.%Y %H:%M")
            ),
        );
        Self::new(to_email, subject, body, NotificationKind::TicketCancellation)
    }

    /// Render a cancellation notice for the event organizer.
    #[must_use]
    pub fn organizer_cancellation(
        organizer_email: &str,
        event_name: &str,
        ticket_code: &str,
        customer_email: &str,
    ) -> Self {
        let subject = format!("Ticket cancelled - {event_name}");
        let body = html_body(
            "Ticket cancellation notice",
            &format!(
                "<p>A customer has cancelled a ticket for your event.</p>\
                 <p><strong>Event:</strong> {event_name}</p>\
                 <p><strong>Ticket code:</strong> {ticket_code}</p>\
                 <p><strong>Customer:</strong> {customer_email}</p>"
            ),
        );
        Self::new(
            organizer_email,
            subject,
            body,
            NotificationKind::OrganizerCancellation,
        )
    }

    /// Render a password reset email.
    #[must_use]
    pub fn password_reset(to_email: &str, reset_link: &str, first_name: &str) -> Self {
        let body = html_body(
            "Password reset request",
            &format!(
                "<p>Hello {first_name},</p>\
                 <p>You have requested to reset your password. Click the link \
                 below to continue. The link expires in 30 minutes.</p>\
                 <p><a href=\"{reset_link}\">Reset password</a></p>\
                 <p>If you did not request this, you can safely ignore this \
                 email.</p>"
            ),
        );
        Self::new(
            to_email,
            "Reset your password",
            body,
            NotificationKind::PasswordReset,
        )
    }

    /// Render an email address confirmation message.
    #[must_use]
    pub fn email_confirmation(to_email: &str, confirmation_link: &str) -> Self {
        let body = html_body(
            "Confirm your email address",
            &format!(
                "<p>Welcome! Please confirm your email address by clicking \
                 the link below:</p>\
                 <p><a href=\"{confirmation_link}\">Confirm email address</a></p>\
                 <p>Thank you for registering!</p>"
            ),
        );
        Self::new(
            to_email,
            "Confirm your email address",
            body,
            NotificationKind::EmailConfirmation,
        )
    }
}

/// Wrap rendered fragments in the shared HTML shell.
fn html_body(heading: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{heading}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
<div style="max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #2563eb;">{heading}</h2>
{content}
</div>
</body>
</html>"#
    )
}

/// Errors that can occur while handing a message to the broker.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    /// The broker is unreachable; the message was **not** queued.
    ///
    /// Raised loudly rather than silently dropping, so the caller decides
    /// whether the failure is fatal for its request path.
    #[error("Broker unavailable, message not queued: {0}")]
    BrokerUnavailable(String),

    /// The broker rejected or timed out the publish.
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// Target topic.
        topic: String,
        /// Failure reason from the broker client.
        reason: String,
    },

    /// The envelope could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Hand-off seam between request-handling code and the durable broker.
///
/// Implementations must return quickly: a dispatch is a publish to the
/// broker, never an SMTP call. All SMTP I/O lives exclusively in the
/// delivery worker.
pub trait Dispatcher: Send + Sync {
    /// Queue one message for eventual delivery.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::BrokerUnavailable`] when no healthy broker
    /// session exists, [`DispatchError::PublishFailed`] when the broker
    /// rejects the publish. In both cases the message was not queued.
    fn dispatch(
        &self,
        message: &NotificationMessage,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: panicking on malformed fixtures is fine
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_camel_case() {
        let message = NotificationMessage::new(
            "holder@example.com",
            "Subject",
            "<p>Body</p>",
            NotificationKind::TicketConfirmation,
        );
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["toEmail"], "holder@example.com");
        assert_eq!(json["kind"], "TicketConfirmation");
        assert!(json["messageId"].is_string());
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn envelope_round_trips() {
        let message = NotificationMessage::ticket_confirmation(
            "holder@example.com",
            "Summer Jam",
            "ABC123XYZ789",
        );
        let json = serde_json::to_vec(&message).unwrap();
        let decoded: NotificationMessage = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn cancellation_body_carries_event_and_code() {
        let message = NotificationMessage::ticket_cancellation(
            "holder@example.com",
            "Summer Jam",
            "ABC123XYZ789",
            Utc::now(),
        );
        assert_eq!(message.kind, NotificationKind::TicketCancellation);
        assert!(message.subject.contains("Summer Jam"));
        assert!(message.body.contains("ABC123XYZ789"));
        assert!(message.body.contains("Summer Jam"));
    }

    #[test]
    fn organizer_notice_carries_customer_email() {
        let message = NotificationMessage::organizer_cancellation(
            "organizer@example.com",
            "Summer Jam",
            "ABC123XYZ789",
            "holder@example.com",
        );
        assert_eq!(message.to_email, "organizer@example.com");
        assert!(message.body.contains("holder@example.com"));
    }

    #[test]
    fn every_envelope_gets_a_unique_message_id() {
        let a = NotificationMessage::email_confirmation("a@example.com", "https://x/confirm");
        let b = NotificationMessage::email_confirmation("a@example.com", "https://x/confirm");
        assert_ne!(a.message_id, b.message_id);
    }
}
