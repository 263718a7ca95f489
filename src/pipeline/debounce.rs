//! Trailing-edge debouncing with eager capture.
//!
//! A [`Debouncer`] holds at most one pending value and one deadline. Every
//! [`Debouncer::schedule`] replaces the pending value and pushes the deadline
//! out by the full window; only the value captured by the most recent call is
//! ever released. The owner polls the deadline (typically from a
//! `tokio::select!` loop) and calls [`Debouncer::take`] once it has passed.

use std::time::Duration;
use tokio::time::{self, Instant};

/// Single pending value plus a resettable deadline
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<Pending<T>>,
}

#[derive(Debug)]
struct Pending<T> {
    value: T,
    deadline: Instant,
}

impl<T> Debouncer<T> {
    /// Create a debouncer with the given quiescence window
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Replace the pending value and restart the window
    ///
    /// Returns `true` if a previously pending value was discarded.
    pub fn schedule(&mut self, value: T) -> bool {
        let deadline = Instant::now() + self.window;
        self.pending
            .replace(Pending { value, deadline })
            .is_some()
    }

    /// When the pending value becomes due, if any
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Take the pending value regardless of its deadline
    pub fn take(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    /// Wait for the pending value to become due and take it
    ///
    /// Resolves immediately with `None` if nothing is pending. Dropping the
    /// returned future before it resolves leaves the pending value in place.
    pub async fn settle(&mut self) -> Option<T> {
        let deadline = self.deadline()?;
        time::sleep_until(deadline).await;
        self.take()
    }
}
