//! Mock dispatcher for testing.

use crate::notification::{DispatchError, Dispatcher, NotificationMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mock dispatcher that records every message instead of publishing.
///
/// Flip [`fail_next`](Self::set_failing) to simulate a broker outage and
/// assert that callers treat dispatch as best-effort.
#[derive(Clone, Default)]
pub struct MockDispatcher {
    sent: Arc<Mutex<Vec<NotificationMessage>>>,
    failing: Arc<AtomicBool>,
}

impl MockDispatcher {
    /// Create a mock dispatcher that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent dispatches fail with `BrokerUnavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages successfully dispatched so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Dispatcher for MockDispatcher {
    async fn dispatch(&self, message: &NotificationMessage) -> Result<(), DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::BrokerUnavailable(
                "mock broker is down".to_string(),
            ));
        }
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}
