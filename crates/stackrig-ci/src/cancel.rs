//! Run-wide cancellation and deadline.
//!
//! Every suspension point in a stack drive (settle delay, inter-attempt
//! sleep) goes through [`Cancellation::sleep`], so a deadline or Ctrl-C
//! short-circuits the wait instead of blocking for minutes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Cloneable cancellation signal backed by a `watch` channel.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Signal cancellation to every clone.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is signalled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed without cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.cancelled() => false,
        }
    }

    /// Cancel automatically once `deadline` has elapsed.
    pub fn cancel_after(&self, deadline: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if !this.is_cancelled() {
                warn!(deadline_secs = deadline.as_secs(), "global run deadline reached; cancelling");
                this.cancel();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_cancel() {
        let cancel = Cancellation::new();
        let start = tokio::time::Instant::now();
        assert!(cancel.sleep(Duration::from_secs(180)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_short_circuits_on_cancel() {
        let cancel = Cancellation::new();
        let _deadline = cancel.cancel_after(Duration::from_secs(10));
        let start = tokio::time::Instant::now();
        assert!(!cancel.sleep(Duration::from_secs(180)).await);
        assert!(start.elapsed() < Duration::from_secs(180));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_returns_immediately() {
        let cancel = Cancellation::new();
        cancel.clone().cancel();
        assert!(!cancel.sleep(Duration::from_secs(3600)).await);
    }
}
