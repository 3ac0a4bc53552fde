//! Worker configuration from environment variables, with defaults that run
//! against a local docker-compose stack.

use std::env;
use std::time::Duration;
use turnstile_broker::{DEAD_LETTER_TOPIC, NOTIFICATION_TOPIC};

/// Full configuration for the delivery worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Broker connection and topic settings.
    pub broker: BrokerConfig,
    /// SMTP relay settings.
    pub smtp: SmtpConfig,
    /// Per-message delivery retry settings.
    pub delivery: DeliveryConfig,
}

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker addresses (comma-separated).
    pub brokers: String,
    /// Topic to consume notification messages from.
    pub topic: String,
    /// Topic that receives failed messages.
    pub dead_letter_topic: String,
    /// Consumer group for the worker fleet.
    pub consumer_group: String,
    /// Grace period before the first connection attempt, so the broker can
    /// finish starting when both come up together.
    pub startup_delay: Duration,
    /// Connection attempts before giving up and exiting.
    pub max_connect_retries: u32,
    /// Initial delay between connection attempts (doubles, capped at 30s).
    pub connect_backoff: Duration,
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay host name.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Authentication username.
    pub username: String,
    /// Authentication password.
    pub password: String,
    /// Whether to negotiate TLS with the relay. Disable only for local
    /// capture relays like Mailpit.
    pub use_tls: bool,
    /// Sender address.
    pub from_email: String,
    /// Sender display name.
    pub from_name: String,
}

/// Per-message delivery retry settings.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Send attempts per message before dead-lettering.
    pub max_send_attempts: u32,
    /// Initial delay between send attempts (doubles).
    pub send_backoff: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            broker: BrokerConfig {
                brokers: env::var("BROKER_ADDRESSES")
                    .unwrap_or_else(|_| "localhost:9092".to_string()),
                topic: env::var("NOTIFICATION_TOPIC")
                    .unwrap_or_else(|_| NOTIFICATION_TOPIC.to_string()),
                dead_letter_topic: env::var("DEAD_LETTER_TOPIC")
                    .unwrap_or_else(|_| DEAD_LETTER_TOPIC.to_string()),
                consumer_group: env::var("CONSUMER_GROUP")
                    .unwrap_or_else(|_| "turnstile-delivery".to_string()),
                startup_delay: Duration::from_secs(
                    env::var("STARTUP_DELAY_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(10),
                ),
                max_connect_retries: env::var("MAX_CONNECT_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                connect_backoff: Duration::from_secs(
                    env::var("CONNECT_BACKOFF_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(2),
                ),
            },
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("SMTP_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                use_tls: env::var("SMTP_USE_TLS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
                from_email: env::var("SMTP_FROM_EMAIL")
                    .unwrap_or_else(|_| "noreply@turnstile.local".to_string()),
                from_name: env::var("SMTP_FROM_NAME")
                    .unwrap_or_else(|_| "Turnstile".to_string()),
            },
            delivery: DeliveryConfig {
                max_send_attempts: env::var("MAX_SEND_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
                send_backoff: Duration::from_millis(
                    env::var("SEND_BACKOFF_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(1000),
                ),
            },
        }
    }
}
