//! SMTP delivery behind a trait, so the delivery loop can be tested
//! without a mail relay.

use crate::config::SmtpConfig;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::future::Future;
use thiserror::Error;
use turnstile_core::NotificationMessage;

/// Why a send attempt failed, split by what the caller should do next.
#[derive(Debug, Error)]
pub enum MailError {
    /// The message itself is unsendable (bad address, malformed body).
    /// Retrying cannot help.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The relay rejected the attempt or was unreachable. Worth retrying.
    #[error("SMTP transport error: {0}")]
    Transport(String),

    /// A worker-side fault unrelated to the message or the relay.
    /// The message deserves a fresh pass later.
    #[error("Worker fault: {0}")]
    Worker(String),
}

impl MailError {
    /// Whether retrying the same message can possibly succeed.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidMessage(_))
    }
}

/// Sends one notification message as an email.
pub trait Mailer: Send + Sync {
    /// Attempt a single delivery.
    ///
    /// # Errors
    ///
    /// Returns a [`MailError`] classifying the failure; see the variants
    /// for what the caller should do with each.
    fn send(
        &self,
        message: &NotificationMessage,
    ) -> impl Future<Output = Result<(), MailError>> + Send;
}

/// Production [`Mailer`] backed by an SMTP relay.
///
/// A fresh transport is built per send, which sidesteps stale pooled
/// connections at the cost of a handshake per email. Delivery volume is
/// low enough that the trade is fine.
#[derive(Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Credentials,
    use_tls: bool,
    from_email: String,
    from_name: String,
}

impl SmtpMailer {
    /// Create a mailer from SMTP settings.
    #[must_use]
    pub fn new(config: &SmtpConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            credentials: Credentials::new(config.username.clone(), config.password.clone()),
            use_tls: config.use_tls,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        }
    }

    fn build_transport(&self) -> Result<SmtpTransport, MailError> {
        let builder = if self.use_tls {
            SmtpTransport::starttls_relay(&self.host)
                .map_err(|e| MailError::Transport(format!("SMTP relay setup failed: {e}")))?
        } else {
            SmtpTransport::builder_dangerous(&self.host)
        };

        Ok(builder
            .port(self.port)
            .credentials(self.credentials.clone())
            .build())
    }

    fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, message: &NotificationMessage) -> Result<(), MailError> {
        let email = Message::builder()
            .from(
                self.from_header()
                    .parse()
                    .map_err(|e| MailError::InvalidMessage(format!("Invalid from address: {e}")))?,
            )
            .to(message
                .to_email
                .parse()
                .map_err(|e| MailError::InvalidMessage(format!("Invalid to address: {e}")))?)
            .subject(&message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.body.clone())
            .map_err(|e| MailError::InvalidMessage(format!("Failed to build email: {e}")))?;

        let transport = self.build_transport()?;

        // lettre's SMTP transport blocks, so the send runs off the async
        // runtime threads.
        tokio::task::spawn_blocking(move || {
            transport
                .send(&email)
                .map_err(|e| MailError::Transport(format!("Failed to send email: {e}")))
        })
        .await
        .map_err(|e| MailError::Worker(format!("Send task failed: {e}")))?
        .map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::config::SmtpConfig;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: "secret".to_string(),
            use_tls: true,
            from_email: "noreply@example.com".to_string(),
            from_name: "Turnstile".to_string(),
        }
    }

    #[test]
    fn smtp_mailer_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SmtpMailer>();
        assert_sync::<SmtpMailer>();
    }

    #[test]
    fn from_header_combines_name_and_address() {
        let mailer = SmtpMailer::new(&config());
        assert_eq!(mailer.from_header(), "Turnstile <noreply@example.com>");
    }

    #[test]
    fn invalid_message_is_permanent() {
        assert!(MailError::InvalidMessage("bad address".to_string()).is_permanent());
        assert!(!MailError::Transport("timeout".to_string()).is_permanent());
        assert!(!MailError::Worker("task panicked".to_string()).is_permanent());
    }
}
