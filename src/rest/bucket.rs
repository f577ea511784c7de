//! Observed rate-limit windows.

use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct Window {
    limit: u32,
    remaining: u32,
    reset_time: SystemTime,
    on_cooldown: bool,
}

/// One server-side rate-limit window, learned from response headers.
///
/// The exclusion gate serializes tasks around a zero-remaining window:
/// at most one task sits in [`cooldown`](Bucket::cooldown) at a time,
/// and every [`wait`](Bucket::wait) issued meanwhile returns only after
/// the cooldown task exits.
#[derive(Debug)]
pub struct Bucket {
    window: Mutex<Window>,
    gate: AsyncMutex<()>,
}

impl Bucket {
    pub(crate) fn new(limit: u32, remaining: u32, reset_time: SystemTime) -> Self {
        Self {
            window: Mutex::new(Window {
                limit,
                remaining: remaining.min(limit),
                reset_time,
                on_cooldown: false,
            }),
            gate: AsyncMutex::new(()),
        }
    }

    /// Overwrite the window with fresh header values, in place.
    pub(crate) fn configure(&self, limit: u32, remaining: u32, reset_time: SystemTime) {
        let mut window = self.window.lock();
        window.limit = limit;
        window.remaining = remaining.min(limit);
        window.reset_time = reset_time;
    }

    /// Maximum requests in the window.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.window.lock().limit
    }

    /// Requests left in the window, as of the last response.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.window.lock().remaining
    }

    /// Absolute instant the window resets.
    #[must_use]
    pub fn reset_time(&self) -> SystemTime {
        self.window.lock().reset_time
    }

    /// Whether a task is currently waiting out this window.
    #[must_use]
    pub fn on_cooldown(&self) -> bool {
        self.window.lock().on_cooldown
    }

    /// True when one more request would overrun the window before it
    /// resets.
    #[must_use]
    pub fn next_will_limit(&self, now: SystemTime) -> bool {
        let window = self.window.lock();
        window.remaining == 0 && now < window.reset_time
    }

    /// Wait for an in-progress cooldown, if any.
    ///
    /// Returns immediately with `None` when nobody is cooling this
    /// bucket down; otherwise blocks on the gate and reports the
    /// wall-clock time spent waiting.
    pub async fn wait(&self) -> Option<Duration> {
        if !self.window.lock().on_cooldown {
            return None;
        }
        let started = Instant::now();
        drop(self.gate.lock().await);
        Some(started.elapsed())
    }

    /// Park this bucket until its window resets, holding the exclusion
    /// gate for the duration.
    ///
    /// # Errors
    ///
    /// [`Error::CooldownInPast`] when `reset_time` is not in the future
    /// relative to `now` — clock skew or a caller bug.
    pub async fn cooldown(&self, now: SystemTime) -> Result<()> {
        let delta = {
            let mut window = self.window.lock();
            let delta = window
                .reset_time
                .duration_since(now)
                .map_err(|_| Error::CooldownInPast)?;
            window.on_cooldown = true;
            delta
        };
        let _gate = self.gate.lock().await;
        tokio::time::sleep(delta).await;
        self.window.lock().on_cooldown = false;
        Ok(())
    }
}
