//! Cancellable countdown timer
//!
//! A plain value type holding start time and duration, paired with a watcher
//! thread that fires the completion action exactly once on expiry. The node
//! keeps at most one of these; starting a new timer cancels the old one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Countdown with elapsed/remaining queries and cancellation
pub struct Timer {
    duration: Duration,
    started_at: Instant,
    /// Set once, by either cancellation or expiry; whoever wins the swap
    /// settles the timer
    settled: Arc<AtomicBool>,
}

impl Timer {
    /// Start a countdown; `on_expiry` runs exactly once unless cancelled
    pub fn start<F>(duration: Duration, on_expiry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let settled = Arc::new(AtomicBool::new(false));
        let watcher_settled = Arc::clone(&settled);
        let started_at = Instant::now();

        std::thread::Builder::new()
            .name("timer".to_string())
            .spawn(move || {
                loop {
                    if watcher_settled.load(Ordering::Acquire) {
                        return;
                    }

                    let elapsed = started_at.elapsed();
                    if elapsed >= duration {
                        // Claim the expiry; a concurrent cancel wins or loses here
                        if !watcher_settled.swap(true, Ordering::AcqRel) {
                            on_expiry();
                        }
                        return;
                    }

                    let remaining = duration - elapsed;
                    std::thread::sleep(remaining.min(Duration::from_millis(25)));
                }
            })
            .expect("failed to spawn timer watcher");

        Self {
            duration,
            started_at,
            settled,
        }
    }

    /// Time since the timer started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time left; clamps to zero past expiry, never negative
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.started_at.elapsed())
    }

    /// Cancel the countdown; the completion action will not run
    pub fn cancel(&self) {
        self.settled.store(true, Ordering::Release);
    }
}
