//! Cooperative cancellation for evaluations that wait on external calls.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

/// A cloneable cancellation flag. Clones observe the same flag, so a host
/// can keep one copy and hand another to the evaluator.
///
/// A token built with [`CancellationToken::with_deadline`] also reports
/// cancelled once the deadline passes. The check is synchronous, so an
/// evaluation that never suspends still stops at its next sub-expression.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        CancellationToken {
            sender: Arc::new(sender),
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        CancellationToken {
            deadline: Some(deadline),
            ..Self::new()
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow() || self.deadline_passed()
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Resolves once [`CancellationToken::cancel`] has been called or the
    /// deadline, if any, has passed.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel_signal() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel_signal().await,
        }
    }

    async fn cancel_signal(&self) {
        let mut receiver = self.sender.subscribe();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Sender is owned by self and cannot be dropped while we wait.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
