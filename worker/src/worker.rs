//! The long-running delivery loop.

use crate::backoff::Backoff;
use crate::config::WorkerConfig;
use crate::delivery::{Disposition, SendPolicy, process_payload};
use crate::mailer::Mailer;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use turnstile_broker::{BrokerError, Delivery, NotificationConsumer};

/// How often the loop probes the broker when no messages are flowing.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Fatal worker errors. Anything transient is handled inside the loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The broker never became reachable within the retry budget.
    #[error("Could not connect to broker after {attempts} attempts: {reason}")]
    ConnectExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The last connection error.
        reason: String,
    },
}

/// Consumes the notification topic and delivers messages through a [`Mailer`].
///
/// The worker owns reconnection: it waits out broker startup, retries the
/// initial connection with doubling backoff, and rebuilds the consumer if
/// the broker goes away mid-run. It only returns once shutdown is signalled
/// or the connection budget is exhausted.
pub struct DeliveryWorker<M> {
    config: WorkerConfig,
    mailer: M,
    policy: SendPolicy,
}

impl<M: Mailer> DeliveryWorker<M> {
    /// Create a worker from configuration and a mailer.
    #[must_use]
    pub fn new(config: WorkerConfig, mailer: M) -> Self {
        let policy = SendPolicy::from_config(&config.delivery);
        Self {
            config,
            mailer,
            policy,
        }
    }

    /// Run until `shutdown` flips to `true` or connecting becomes hopeless.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ConnectExhausted`] if the broker stays
    /// unreachable through the full retry budget.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        tracing::info!(
            startup_delay_secs = self.config.broker.startup_delay.as_secs(),
            "Delivery worker starting, waiting for broker warm-up"
        );
        tokio::time::sleep(self.config.broker.startup_delay).await;

        let mut consumer = self.connect(&mut shutdown).await?;
        let mut health_check = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        health_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Shutdown signalled, delivery worker stopping");
                        return Ok(());
                    }
                },
                _ = health_check.tick() => {
                    if !consumer.is_alive().await {
                        tracing::warn!("Broker health check failed, reconnecting");
                        consumer = self.connect(&mut shutdown).await?;
                    }
                },
                received = consumer.recv() => {
                    match received {
                        Ok(delivery) => self.settle(&consumer, &delivery).await,
                        Err(error) => {
                            tracing::error!(error = %error, "Receive failed");
                            if !consumer.is_alive().await {
                                consumer = self.connect(&mut shutdown).await?;
                            }
                        },
                    }
                },
            }
        }
    }

    /// Process one delivery and apply its verdict. Settlement failures are
    /// logged and left to redelivery; the offset stays uncommitted.
    async fn settle(&self, consumer: &NotificationConsumer, delivery: &Delivery) {
        let verdict = process_payload(&self.mailer, &delivery.payload, &self.policy).await;

        let settled = match verdict {
            Disposition::Ack => consumer.ack(delivery),
            Disposition::Requeue => consumer.requeue(delivery).await,
            Disposition::DeadLetter => consumer.dead_letter(delivery).await,
        };

        if let Err(error) = settled {
            tracing::error!(
                offset = delivery.offset,
                verdict = ?verdict,
                error = %error,
                "Failed to settle message, it will be redelivered"
            );
        }
    }

    /// Connect with doubling backoff, bailing out early on shutdown.
    async fn connect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<NotificationConsumer, WorkerError> {
        let broker = &self.config.broker;
        let backoff = Backoff::new(broker.connect_backoff, Duration::from_secs(30));
        let mut last_error = String::new();

        for attempt in 0..broker.max_connect_retries {
            match NotificationConsumer::connect(
                &broker.brokers,
                &broker.consumer_group,
                &broker.topic,
                &broker.dead_letter_topic,
                Duration::from_secs(5),
            )
            .await
            {
                Ok(consumer) => return Ok(consumer),
                Err(BrokerError::ConnectionFailed(reason)) => last_error = reason,
                Err(other) => last_error = other.to_string(),
            }

            let delay = backoff.delay_for(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts = broker.max_connect_retries,
                delay_secs = delay.as_secs(),
                error = %last_error,
                "Broker connection failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        // Treat shutdown during connect as exhaustion so the
                        // caller unwinds cleanly.
                        return Err(WorkerError::ConnectExhausted {
                            attempts: attempt + 1,
                            reason: "shutdown during connect".to_string(),
                        });
                    }
                },
            }
        }

        Err(WorkerError::ConnectExhausted {
            attempts: broker.max_connect_retries,
            reason: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MailError;
    use turnstile_core::NotificationMessage;

    struct NoopMailer;

    impl Mailer for NoopMailer {
        async fn send(&self, _message: &NotificationMessage) -> Result<(), MailError> {
            Ok(())
        }
    }

    #[test]
    fn delivery_worker_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DeliveryWorker<NoopMailer>>();
    }

    #[test]
    fn connect_exhausted_names_the_attempt_count() {
        let error = WorkerError::ConnectExhausted {
            attempts: 10,
            reason: "no broker".to_string(),
        };
        assert!(error.to_string().contains("10 attempts"));
    }
}
