//! Producer side of the notification pipeline.

use crate::connection::ConnectionManager;
use crate::{BrokerError, NOTIFICATION_TOPIC};
use rdkafka::producer::FutureRecord;
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;
use turnstile_core::{DispatchError, Dispatcher, NotificationMessage};

/// Kafka-backed [`Dispatcher`] implementation.
///
/// Messages are serialized to JSON and produced to the notification topic
/// with the notification kind as the partition key, so all messages of one
/// kind preserve their relative order.
///
/// # Example
///
/// ```no_run
/// use turnstile_broker::KafkaDispatcher;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let dispatcher = KafkaDispatcher::builder()
///     .brokers("localhost:9092")
///     .acks("all")
///     .timeout(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct KafkaDispatcher {
    connection: Arc<ConnectionManager>,
    topic: String,
    send_timeout: Duration,
}

impl KafkaDispatcher {
    /// Create a dispatcher with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] if the broker list is empty.
    pub fn new(brokers: &str) -> Result<Self, BrokerError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for custom configuration.
    #[must_use]
    pub fn builder() -> KafkaDispatcherBuilder {
        KafkaDispatcherBuilder::default()
    }

    /// The topic this dispatcher publishes to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The underlying connection, shared for health reporting.
    #[must_use]
    pub fn connection(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.connection)
    }
}

/// Builder for a [`KafkaDispatcher`].
#[derive(Default)]
pub struct KafkaDispatcherBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    acks: Option<String>,
    timeout: Option<Duration>,
}

impl KafkaDispatcherBuilder {
    /// Set the broker addresses (comma-separated). Required.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the destination topic. Default: [`NOTIFICATION_TOPIC`].
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the producer acknowledgment mode ("0", "1", "all").
    ///
    /// Default: "all". Losing a notification costs a support ticket, so we
    /// wait for full replication.
    #[must_use]
    pub fn acks(mut self, acks: impl Into<String>) -> Self {
        self.acks = Some(acks.into());
        self
    }

    /// Set the connect and send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the dispatcher. No connection is made until the first dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] if brokers were not set.
    pub fn build(self) -> Result<KafkaDispatcher, BrokerError> {
        let brokers = self
            .brokers
            .ok_or_else(|| BrokerError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.acks.unwrap_or_else(|| "all".to_string());

        Ok(KafkaDispatcher {
            connection: Arc::new(ConnectionManager::new(brokers, acks, timeout)),
            topic: self
                .topic
                .unwrap_or_else(|| NOTIFICATION_TOPIC.to_string()),
            send_timeout: timeout,
        })
    }
}

impl Dispatcher for KafkaDispatcher {
    async fn dispatch(&self, message: &NotificationMessage) -> Result<(), DispatchError> {
        let producer = self
            .connection
            .ensure_ready()
            .await
            .map_err(|e| DispatchError::BrokerUnavailable(e.to_string()))?;

        let payload =
            serde_json::to_vec(message).map_err(|e| DispatchError::Serialization(e.to_string()))?;

        let key = message.kind.as_str();
        let record = FutureRecord::to(&self.topic).payload(&payload).key(key);

        match producer.send(record, Timeout::After(self.send_timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %self.topic,
                    partition = partition,
                    offset = offset,
                    kind = %message.kind,
                    message_id = %message.message_id,
                    "Notification queued"
                );
                metrics::counter!("turnstile.notifications_dispatched", "kind" => key)
                    .increment(1);
                Ok(())
            },
            Err((kafka_error, _)) => {
                // Force a reconnect before the next dispatch attempt.
                self.connection.mark_unhealthy();
                tracing::error!(
                    topic = %self.topic,
                    kind = %message.kind,
                    error = %kafka_error,
                    "Failed to queue notification"
                );
                Err(DispatchError::PublishFailed {
                    topic: self.topic.clone(),
                    reason: kafka_error.to_string(),
                })
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn kafka_dispatcher_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<KafkaDispatcher>();
        assert_sync::<KafkaDispatcher>();
    }

    #[test]
    fn builder_applies_defaults() {
        let dispatcher = KafkaDispatcher::new("localhost:9092").unwrap();
        assert_eq!(dispatcher.topic(), NOTIFICATION_TOPIC);
        assert_eq!(dispatcher.connection().brokers(), "localhost:9092");
    }

    #[test]
    fn builder_requires_brokers() {
        let result = KafkaDispatcher::builder().build();
        assert!(matches!(result, Err(BrokerError::ConnectionFailed(_))));
    }

    #[test]
    fn builder_honors_custom_topic() {
        let dispatcher = KafkaDispatcher::builder()
            .brokers("localhost:9092")
            .topic("notifications.sms")
            .build()
            .unwrap();
        assert_eq!(dispatcher.topic(), "notifications.sms");
    }
}
