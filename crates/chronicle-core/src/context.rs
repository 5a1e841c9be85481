//! Per-call context: cancellation, deadlines and the clock.
//!
//! Every store operation receives a [`Context`] and wraps its I/O in
//! [`Context::run`], so a cancelled or expired context surfaces as
//! [`Error::Cancelled`] instead of blocking.

use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::epoch::EpochMillis;
use crate::error::{Error, Result};

/// Cancellation, deadline and time source for one logical operation.
#[derive(Debug, Clone)]
pub struct Context {
    /// One receiver per `with_cancel` ancestor; any of them flipping to
    /// `true` cancels this context.
    signals: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
    clock: Arc<dyn Clock>,
}

/// Cancels every [`Context`] derived from the one it was created with.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never cancelled and uses the system clock.
    #[must_use]
    pub fn background() -> Self {
        Self {
            signals: Vec::new(),
            deadline: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Derives a cancellable context. Cancelling the parent also cancels
    /// the child; dropping the handle without calling `cancel` leaves the
    /// context live.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut ctx = self.clone();
        ctx.signals.push(rx);
        (ctx, CancelHandle(tx))
    }

    /// Derives a context that expires after `timeout`. An earlier existing
    /// deadline is kept.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        ctx
    }

    /// Replaces the clock handed to command handlers.
    #[must_use]
    pub fn with_clock(&self, clock: impl Clock + 'static) -> Self {
        let mut ctx = self.clone();
        ctx.clock = Arc::new(clock);
        ctx
    }

    /// The clock for this operation.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Shorthand for `self.clock().now_millis()`.
    #[must_use]
    pub fn now(&self) -> EpochMillis {
        self.clock.now_millis()
    }

    /// Whether the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signals.iter().any(|rx| *rx.borrow())
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled or its deadline passes. Never
    /// resolves for a background context.
    pub async fn cancelled(&self) {
        let mut waits: Vec<Pin<Box<_>>> = self
            .signals
            .iter()
            .map(|rx| {
                let mut rx = rx.clone();
                Box::pin(async move {
                    // `wait_for` errors only when the sender is gone; such a
                    // signal can never fire.
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                })
            })
            .collect();

        let any_signal = poll_fn(|cx| {
            for wait in &mut waits {
                if wait.as_mut().poll(cx).is_ready() {
                    return Poll::Ready(());
                }
            }
            Poll::Pending
        });

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = any_signal => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => any_signal.await,
        }
    }

    /// Drives `operation` unless the context is cancelled first, in which
    /// case the operation is dropped and `Error::Cancelled` is returned.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` on cancellation, otherwise whatever
    /// `operation` returns.
    pub async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            biased;
            () = self.cancelled() => Err(Error::Cancelled),
            result = operation => result,
        }
    }
}
