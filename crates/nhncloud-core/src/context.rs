//! Deadlines and cancellation for blocking SDK calls.
//!
//! Every operation that waits on the network or on a backoff timer takes a
//! [`CallContext`]. When the context's deadline passes the operation returns
//! [`Error::Timeout`]; when its [`CancelHandle`] fires it returns
//! [`Error::Cancelled`]. Either way it returns promptly instead of finishing the
//! remaining wait.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

const DEADLINE_EXCEEDED: &str = "context deadline exceeded";

/// Deadline and cancellation signal shared by the calls of one logical operation.
///
/// Cloning a context is cheap; clones observe the same deadline and the same
/// cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every [`CallContext`] derived from [`CallContext::with_cancel`].
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl CallContext {
    /// A context with no deadline that is never cancelled.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().with_deadline(Instant::now() + timeout)
    }

    /// Set the deadline, keeping the earlier one if a deadline is already set.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Attach a cancellation signal and return the handle that fires it.
    ///
    /// Replaces any cancellation signal already attached to this context.
    #[must_use]
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        self.cancel = Some(receiver);
        (self, CancelHandle { sender })
    }

    /// The deadline, if one is set.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` without a deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true once the cancel handle has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|receiver| *receiver.borrow())
    }

    /// Fail fast if the context is already done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::Timeout`].
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Err(Error::Timeout(DEADLINE_EXCEEDED.to_string()));
        }
        Ok(())
    }

    /// Resolve once the context is done, yielding the matching error.
    ///
    /// Never resolves for a background context.
    pub async fn done(&self) -> Error {
        tokio::select! {
            () = wait_cancelled(self.cancel.clone()) => Error::Cancelled,
            () = wait_deadline(self.deadline) => Error::Timeout(DEADLINE_EXCEEDED.to_string()),
        }
    }

    /// Drive `future` to completion unless the context finishes first.
    ///
    /// # Errors
    ///
    /// Returns the future's error, or [`Error::Cancelled`] / [`Error::Timeout`]
    /// when the context is done first; the future is dropped in that case.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = future => result,
        }
    }

    /// Wait for `duration` unless the context finishes first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::Timeout`] if the wait is interrupted.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

async fn wait_cancelled(receiver: Option<watch::Receiver<bool>>) {
    let Some(mut receiver) = receiver else {
        return std::future::pending().await;
    };

    loop {
        if *receiver.borrow_and_update() {
            return;
        }
        // A dropped handle can no longer cancel.
        if receiver.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = CallContext::background();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn test_deadline_interrupts_sleep() {
        let ctx = CallContext::with_timeout(Duration::from_millis(20));
        let started = std::time::Instant::now();

        let err = ctx.sleep(Duration::from_secs(30)).await.unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let (ctx, handle) = CallContext::background().with_cancel();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.sleep(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("sleep should observe cancellation")
            .unwrap();
        assert_eq!(result, Err(Error::Cancelled));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_fails_fast() {
        let (ctx, handle) = CallContext::background().with_cancel();
        handle.cancel();

        let result = ctx.run(async { Ok(()) }).await;
        assert_eq!(result, Err(Error::Cancelled));
        assert_eq!(ctx.check(), Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (ctx, handle) = CallContext::background().with_cancel();
        drop(handle);

        ctx.sleep(Duration::from_millis(5)).await.unwrap();
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_earlier_deadline_wins() {
        let soon = Instant::now() + Duration::from_millis(10);
        let later = soon + Duration::from_secs(60);

        let ctx = CallContext::background()
            .with_deadline(soon)
            .with_deadline(later);
        assert_eq!(ctx.deadline(), Some(soon));
    }
}
