//! Lazy, self-healing producer connection.
//!
//! The dispatcher runs inside the web tier, where a broker outage must not
//! take requests down with it. The connection manager therefore connects on
//! first use, caches the producer while it stays healthy, and rebuilds it
//! after a publish failure marks it unhealthy.

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, Producer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Errors surfaced by the broker transport.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not reach or authenticate with the broker.
    #[error("Broker connection failed: {0}")]
    ConnectionFailed(String),

    /// A message could not be produced to a topic.
    #[error("Failed to publish to topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that was targeted.
        topic: String,
        /// Why the publish failed.
        reason: String,
    },

    /// Receiving from the subscribed topic failed.
    #[error("Failed to consume message: {0}")]
    ConsumeFailed(String),

    /// Committing a consumer offset failed.
    #[error("Failed to commit offset: {0}")]
    CommitFailed(String),
}

/// Maintains a single shared [`FutureProducer`], created on demand.
///
/// The fast path is a lock-free health check plus a read lock. Reconnection
/// serializes through an async mutex so concurrent dispatchers never race to
/// build duplicate producers.
pub struct ConnectionManager {
    brokers: String,
    acks: String,
    timeout: Duration,
    producer: RwLock<Option<FutureProducer>>,
    healthy: AtomicBool,
    connect_lock: Mutex<()>,
}

impl ConnectionManager {
    /// Create a manager for the given broker list. No connection is made
    /// until [`ensure_ready`](Self::ensure_ready) is first called.
    #[must_use]
    pub fn new(brokers: impl Into<String>, acks: impl Into<String>, timeout: Duration) -> Self {
        Self {
            brokers: brokers.into(),
            acks: acks.into(),
            timeout,
            producer: RwLock::new(None),
            healthy: AtomicBool::new(false),
            connect_lock: Mutex::new(()),
        }
    }

    /// The configured broker addresses.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Whether the last connection attempt or publish succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Record a publish failure so the next call rebuilds the producer.
    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Release);
    }

    /// Return a healthy producer, connecting or reconnecting as needed.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] if the producer cannot be
    /// created or no broker responds to a metadata probe within the timeout.
    pub async fn ensure_ready(&self) -> Result<FutureProducer, BrokerError> {
        if self.healthy.load(Ordering::Acquire) {
            if let Some(producer) = self.producer.read().await.clone() {
                return Ok(producer);
            }
        }

        let _guard = self.connect_lock.lock().await;

        // Another task may have finished reconnecting while we waited.
        if self.healthy.load(Ordering::Acquire) {
            if let Some(producer) = self.producer.read().await.clone() {
                return Ok(producer);
            }
        }

        let producer = self.create_producer()?;
        self.probe(&producer).await?;

        *self.producer.write().await = Some(producer.clone());
        self.healthy.store(true, Ordering::Release);

        tracing::info!(
            brokers = %self.brokers,
            acks = %self.acks,
            "Connected to notification broker"
        );

        Ok(producer)
    }

    fn create_producer(&self) -> Result<FutureProducer, BrokerError> {
        let timeout_ms = self.timeout.as_millis().to_string();

        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", &timeout_ms)
            .set("acks", &self.acks)
            .create()
            .map_err(|e| BrokerError::ConnectionFailed(format!("Failed to create producer: {e}")))
    }

    /// Fetch cluster metadata to confirm at least one broker is reachable.
    /// `fetch_metadata` blocks, so it runs on the blocking pool.
    async fn probe(&self, producer: &FutureProducer) -> Result<(), BrokerError> {
        let producer = producer.clone();
        let timeout = self.timeout;

        let metadata = tokio::task::spawn_blocking(move || {
            producer.client().fetch_metadata(None, timeout)
        })
        .await
        .map_err(|e| BrokerError::ConnectionFailed(format!("Metadata probe panicked: {e}")))?
        .map_err(|e| BrokerError::ConnectionFailed(format!("No broker reachable: {e}")))?;

        tracing::debug!(
            broker_count = metadata.brokers().len(),
            "Broker metadata fetched"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_manager_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ConnectionManager>();
        assert_sync::<ConnectionManager>();
    }

    #[test]
    fn starts_unhealthy_until_first_connect() {
        let manager =
            ConnectionManager::new("localhost:9092", "all", Duration::from_secs(5));
        assert!(!manager.is_healthy());
        assert_eq!(manager.brokers(), "localhost:9092");
    }

    #[test]
    fn mark_unhealthy_clears_health() {
        let manager =
            ConnectionManager::new("localhost:9092", "all", Duration::from_secs(5));
        manager.mark_unhealthy();
        assert!(!manager.is_healthy());
    }
}
