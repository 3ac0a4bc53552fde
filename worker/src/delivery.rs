//! Per-message delivery logic.
//!
//! This is the part of the worker worth testing hard: given one raw payload
//! off the topic, decide exactly what happens to it. The broker mechanics
//! live elsewhere; this module only produces a verdict.

use crate::backoff::Backoff;
use crate::config::DeliveryConfig;
use crate::mailer::Mailer;
use turnstile_core::NotificationMessage;

/// What the worker should do with a message after processing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done with this message, commit it.
    Ack,
    /// Put it back on the main topic for another pass.
    Requeue,
    /// Move it to the dead-letter topic.
    DeadLetter,
}

/// Retry settings for a single message.
#[derive(Debug, Clone, Copy)]
pub struct SendPolicy {
    /// Total send attempts before dead-lettering.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl SendPolicy {
    /// Build a policy from delivery configuration. The backoff doubles from
    /// the configured base and is capped at 30 seconds.
    #[must_use]
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_send_attempts.max(1),
            backoff: Backoff::new(config.send_backoff, std::time::Duration::from_secs(30)),
        }
    }
}

/// Process one raw payload and return its verdict.
///
/// - Undecodable payloads are acknowledged and dropped. Requeueing garbage
///   would loop it through the worker forever.
/// - Transient send failures are retried up to the policy limit, then the
///   message is dead-lettered.
/// - Permanent message faults (unparseable address) skip the retries and go
///   straight to the dead-letter topic.
/// - Worker-side faults requeue the message for a fresh pass.
pub async fn process_payload<M: Mailer>(
    mailer: &M,
    payload: &[u8],
    policy: &SendPolicy,
) -> Disposition {
    let message: NotificationMessage = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(error) => {
            tracing::warn!(
                error = %error,
                payload_len = payload.len(),
                "Dropping undecodable notification payload"
            );
            metrics::counter!("turnstile.worker.poison_messages").increment(1);
            return Disposition::Ack;
        },
    };

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match mailer.send(&message).await {
            Ok(()) => {
                tracing::info!(
                    to = %message.to_email,
                    kind = %message.kind,
                    message_id = %message.message_id,
                    attempt = attempt,
                    "Notification delivered"
                );
                metrics::counter!("turnstile.worker.delivered", "kind" => message.kind.as_str())
                    .increment(1);
                return Disposition::Ack;
            },
            Err(error) => {
                if matches!(error, crate::mailer::MailError::Worker(_)) {
                    tracing::error!(
                        message_id = %message.message_id,
                        error = %error,
                        "Worker fault during delivery, requeueing message"
                    );
                    return Disposition::Requeue;
                }

                if error.is_permanent() || attempt >= policy.max_attempts {
                    tracing::error!(
                        to = %message.to_email,
                        kind = %message.kind,
                        message_id = %message.message_id,
                        attempts = attempt,
                        error = %error,
                        "Giving up on notification, dead-lettering"
                    );
                    metrics::counter!("turnstile.worker.delivery_failures", "kind" => message.kind.as_str())
                        .increment(1);
                    return Disposition::DeadLetter;
                }

                let delay = policy.backoff.delay_for(attempt - 1);
                tracing::warn!(
                    message_id = %message.message_id,
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Send attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::mailer::MailError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use turnstile_core::{NotificationKind, NotificationMessage};

    /// Mailer that replays a script of results and records every attempt.
    #[derive(Clone, Default)]
    struct ScriptedMailer {
        script: Arc<Mutex<VecDeque<Result<(), MailError>>>>,
        attempts: Arc<Mutex<Vec<NotificationMessage>>>,
    }

    impl ScriptedMailer {
        fn push(&self, result: Result<(), MailError>) {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(result);
        }

        fn attempt_count(&self) -> usize {
            self.attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }
    }

    impl Mailer for ScriptedMailer {
        async fn send(&self, message: &NotificationMessage) -> Result<(), MailError> {
            self.attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.clone());
            // An exhausted script means success.
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or(Ok(()))
        }
    }

    fn policy() -> SendPolicy {
        SendPolicy {
            max_attempts: 3,
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(4)),
        }
    }

    fn payload() -> Vec<u8> {
        let message = NotificationMessage::new(
            "alice@example.com",
            "Your ticket is ready",
            "<p>See you there.</p>",
            NotificationKind::TicketConfirmation,
        );
        serde_json::to_vec(&message).unwrap()
    }

    #[tokio::test]
    async fn successful_send_is_acknowledged() {
        let mailer = ScriptedMailer::default();

        let verdict = process_payload(&mailer, &payload(), &policy()).await;

        assert_eq!(verdict, Disposition::Ack);
        assert_eq!(mailer.attempt_count(), 1);
    }

    #[tokio::test]
    async fn undecodable_payload_is_acknowledged_without_sending() {
        let mailer = ScriptedMailer::default();

        let verdict = process_payload(&mailer, b"not json at all", &policy()).await;

        assert_eq!(verdict, Disposition::Ack);
        assert_eq!(mailer.attempt_count(), 0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_delivered() {
        let mailer = ScriptedMailer::default();
        mailer.push(Err(MailError::Transport("451 try again".to_string())));
        mailer.push(Ok(()));

        let verdict = process_payload(&mailer, &payload(), &policy()).await;

        assert_eq!(verdict, Disposition::Ack);
        assert_eq!(mailer.attempt_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter_after_exactly_max_attempts() {
        let mailer = ScriptedMailer::default();
        for _ in 0..3 {
            mailer.push(Err(MailError::Transport("connection refused".to_string())));
        }

        let verdict = process_payload(&mailer, &payload(), &policy()).await;

        assert_eq!(verdict, Disposition::DeadLetter);
        assert_eq!(mailer.attempt_count(), 3);
    }

    #[tokio::test]
    async fn permanent_fault_dead_letters_without_retrying() {
        let mailer = ScriptedMailer::default();
        mailer.push(Err(MailError::InvalidMessage("bad address".to_string())));

        let verdict = process_payload(&mailer, &payload(), &policy()).await;

        assert_eq!(verdict, Disposition::DeadLetter);
        assert_eq!(mailer.attempt_count(), 1);
    }

    #[tokio::test]
    async fn worker_fault_requeues_immediately() {
        let mailer = ScriptedMailer::default();
        mailer.push(Err(MailError::Worker("task panicked".to_string())));

        let verdict = process_payload(&mailer, &payload(), &policy()).await;

        assert_eq!(verdict, Disposition::Requeue);
        assert_eq!(mailer.attempt_count(), 1);
    }

    #[test]
    fn policy_floors_max_attempts_at_one() {
        let config = DeliveryConfig {
            max_send_attempts: 0,
            send_backoff: Duration::from_millis(1),
        };
        assert_eq!(SendPolicy::from_config(&config).max_attempts, 1);
    }
}
