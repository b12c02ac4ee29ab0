//! Trailing-edge debouncer for use inside a `select!` loop.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Collapses bursts of triggers into one firing `delay` after the last.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Create an idle debouncer.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// (Re)schedule the firing.
    pub fn trigger(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    /// Drop a scheduled firing.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Whether a firing is scheduled.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolve at the scheduled deadline and clear it. Never resolves while
    /// idle.
    pub async fn wait(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending().await,
        }
    }
}
