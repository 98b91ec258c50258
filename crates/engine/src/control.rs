//! Out-of-band signals for a running session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// How an approval wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApprovalWait {
    Approved,
    Cancelled,
    TimedOut,
}

/// Cancel and approve flags shared between the caller-facing handle and
/// the worker. `Notify` keeps a permit when nobody is waiting, so a signal
/// sent just before the worker parks is not lost.
#[derive(Debug, Default)]
pub(crate) struct Control {
    cancelled: AtomicBool,
    approved: AtomicBool,
    wake: Notify,
}

impl Control {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn approve(&self) {
        self.approved.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Forget an approval granted for an earlier step.
    pub fn reset_approval(&self) {
        self.approved.store(false, Ordering::SeqCst);
    }

    pub async fn wait_for_approval(&self, timeout: Duration) -> ApprovalWait {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_cancelled() {
                return ApprovalWait::Cancelled;
            }
            if self.approved.swap(false, Ordering::SeqCst) {
                return ApprovalWait::Approved;
            }
            if tokio::time::timeout_at(deadline, self.wake.notified())
                .await
                .is_err()
            {
                return ApprovalWait::TimedOut;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn approval_before_wait_is_kept() {
        let control = Control::default();
        control.approve();
        assert_eq!(
            control.wait_for_approval(Duration::from_secs(1)).await,
            ApprovalWait::Approved
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out() {
        let control = Control::default();
        let start = tokio::time::Instant::now();
        assert_eq!(
            control.wait_for_approval(Duration::from_secs(30)).await,
            ApprovalWait::TimedOut
        );
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_wakes_waiter() {
        let control = Arc::new(Control::default());
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_for_approval(Duration::from_secs(60)).await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        control.cancel();
        assert_eq!(waiter.await.unwrap(), ApprovalWait::Cancelled);
    }
}
