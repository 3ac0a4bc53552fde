//! Consumer side of the notification pipeline.
//!
//! The delivery worker pulls one message at a time and settles it with an
//! explicit verdict. Auto-commit is disabled; a message stays uncommitted
//! until the worker has decided what to do with it.

use crate::connection::BrokerError;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use std::time::Duration;

/// One message pulled off the notification topic, with the coordinates
/// needed to settle it later.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Raw message payload (JSON-encoded envelope, possibly malformed).
    pub payload: Vec<u8>,
    /// Topic the message came from.
    pub topic: String,
    /// Partition the message came from.
    pub partition: i32,
    /// Offset of the message within its partition.
    pub offset: i64,
}

/// Manual-commit consumer over the notification topic.
///
/// Each received [`Delivery`] must be settled exactly once with [`ack`],
/// [`requeue`], or [`dead_letter`]. Unsettled deliveries are redelivered
/// after a restart, which is the at-least-once guarantee doing its job.
///
/// [`ack`]: Self::ack
/// [`requeue`]: Self::requeue
/// [`dead_letter`]: Self::dead_letter
pub struct NotificationConsumer {
    consumer: StreamConsumer,
    producer: FutureProducer,
    topic: String,
    dead_letter_topic: String,
    timeout: Duration,
}

impl NotificationConsumer {
    /// Connect to the broker, subscribe to `topic`, and verify reachability
    /// with a metadata probe.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] if the consumer or producer
    /// cannot be created, the subscription fails, or no broker answers the
    /// probe within `timeout`.
    pub async fn connect(
        brokers: &str,
        consumer_group: &str,
        topic: &str,
        dead_letter_topic: &str,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", consumer_group)
            .set("enable.auto.commit", "false")
            // Queue semantics: a fresh group must drain the backlog,
            // not skip to the end of it.
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                BrokerError::ConnectionFailed(format!("Failed to create consumer: {e}"))
            })?;

        consumer.subscribe(&[topic]).map_err(|e| {
            BrokerError::ConnectionFailed(format!("Failed to subscribe to '{topic}': {e}"))
        })?;

        // The producer handles requeues and dead-letters.
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", &timeout.as_millis().to_string())
            .set("acks", "all")
            .create()
            .map_err(|e| {
                BrokerError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let this = Self {
            consumer,
            producer,
            topic: topic.to_string(),
            dead_letter_topic: dead_letter_topic.to_string(),
            timeout,
        };

        if !this.is_alive().await {
            return Err(BrokerError::ConnectionFailed(format!(
                "No broker reachable at {brokers}"
            )));
        }

        tracing::info!(
            brokers = %brokers,
            consumer_group = %consumer_group,
            topic = %topic,
            dead_letter_topic = %dead_letter_topic,
            "Subscribed to notification topic"
        );

        Ok(this)
    }

    /// Wait for the next message.
    ///
    /// The payload is copied out so the delivery can outlive the librdkafka
    /// buffer and be settled after arbitrary async work.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConsumeFailed`] on transport errors. The caller
    /// decides whether to retry or tear the connection down.
    pub async fn recv(&self) -> Result<Delivery, BrokerError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BrokerError::ConsumeFailed(e.to_string()))?;

        Ok(Delivery {
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        })
    }

    /// Mark the delivery as done by committing the next offset.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::CommitFailed`] if the offset cannot be
    /// committed. The message may then be redelivered after a rebalance.
    pub fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &delivery.topic,
                delivery.partition,
                Offset::Offset(delivery.offset + 1),
            )
            .map_err(|e| BrokerError::CommitFailed(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BrokerError::CommitFailed(e.to_string()))?;

        Ok(())
    }

    /// Give the message another pass by re-producing it at the back of the
    /// main topic, then committing the original.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PublishFailed`] if the re-produce fails; the
    /// original offset is left uncommitted so the message is not lost.
    pub async fn requeue(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.reproduce(&self.topic, delivery).await?;
        metrics::counter!("turnstile.worker.requeued").increment(1);
        self.ack(delivery)
    }

    /// Retire the message to the dead-letter topic, then commit the original.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PublishFailed`] if the dead-letter produce
    /// fails; the original offset is left uncommitted so the message is not
    /// lost.
    pub async fn dead_letter(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.reproduce(&self.dead_letter_topic, delivery).await?;
        metrics::counter!("turnstile.worker.dead_lettered").increment(1);
        self.ack(delivery)
    }

    async fn reproduce(&self, topic: &str, delivery: &Delivery) -> Result<(), BrokerError> {
        let record = FutureRecord::<(), _>::to(topic).payload(&delivery.payload);

        self.producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| BrokerError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            from_topic = %delivery.topic,
            to_topic = %topic,
            offset = delivery.offset,
            "Message re-produced"
        );

        Ok(())
    }

    /// Probe the broker with a metadata request. Used for connection
    /// supervision between messages.
    pub async fn is_alive(&self) -> bool {
        let producer = self.producer.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            producer.client().fetch_metadata(None, timeout).is_ok()
        })
        .await
        .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_consumer_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<NotificationConsumer>();
        assert_sync::<NotificationConsumer>();
    }

    #[test]
    fn delivery_is_cloneable() {
        let delivery = Delivery {
            payload: b"{}".to_vec(),
            topic: "notifications.email".to_string(),
            partition: 0,
            offset: 42,
        };
        let copy = delivery.clone();
        assert_eq!(copy.offset, 42);
        assert_eq!(copy.payload, b"{}");
    }
}
