//! Per-user sliding-window rate limiting.
//!
//! Each user gets two independent windows: one for every command, one for
//! order placement. Timestamps older than the window are pruned lazily on
//! the next check for that user. Nothing is persisted; limits reset on
//! restart.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use escrowdesk_types::{EscrowError, Handle, RateLimitConfig, Result};

/// A sliding window of event timestamps per user.
#[derive(Debug)]
pub struct SlidingWindow {
    /// `Handle → timestamps of recent events` (monotonically increasing)
    events: HashMap<Handle, VecDeque<DateTime<Utc>>>,
    /// Window length.
    window: Duration,
    /// Maximum events per user within the window.
    max_per_window: usize,
    /// Label used in error messages.
    label: &'static str,
}

impl SlidingWindow {
    #[must_use]
    pub fn new(label: &'static str, max_per_window: usize, window: Duration) -> Self {
        Self {
            events: HashMap::new(),
            window,
            max_per_window,
            label,
        }
    }

    /// Record an event for `user` at `now` if the window has room.
    ///
    /// Returns `Ok(())` if allowed, or `RateLimited` without recording.
    pub fn check_and_record(&mut self, user: &Handle, now: DateTime<Utc>) -> Result<()> {
        let window = self.events.entry(user.clone()).or_default();

        // Prune expired entries
        if let Some(cutoff) = now.checked_sub_signed(self.window) {
            while let Some(&front) = window.front() {
                if front <= cutoff {
                    window.pop_front();
                } else {
                    break;
                }
            }
        }

        if window.len() >= self.max_per_window {
            tracing::debug!(user = %user, window = self.label, "rate limit hit");
            return Err(EscrowError::RateLimited {
                reason: format!(
                    "{} {}s in {}s window (limit: {})",
                    window.len(),
                    self.label,
                    self.window.num_seconds(),
                    self.max_per_window
                ),
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Events currently counted for `user` (without pruning).
    #[cfg(test)]
    fn count(&self, user: &Handle) -> usize {
        self.events.get(user).map_or(0, VecDeque::len)
    }

    /// Users with an entry in the window map.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.events.len()
    }

    /// Drop users whose windows are entirely stale. Returns how many were
    /// dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.window) else {
            return 0;
        };
        let before = self.events.len();
        self.events
            .retain(|_, events| events.back().is_some_and(|&last| last > cutoff));
        before - self.events.len()
    }
}

/// The two per-user windows: general commands and order placements.
#[derive(Debug)]
pub struct RateLimiter {
    commands: SlidingWindow,
    orders: SlidingWindow,
}

impl RateLimiter {
    #[must_use]
    pub fn new(cfg: &RateLimitConfig) -> Self {
        Self {
            commands: SlidingWindow::new("command", cfg.command_limit, cfg.command_window()),
            orders: SlidingWindow::new("order", cfg.order_limit, cfg.order_window()),
        }
    }

    /// Gate any inbound command.
    pub fn check_command(&mut self, user: &Handle, now: DateTime<Utc>) -> Result<()> {
        self.commands.check_and_record(user, now)
    }

    /// Gate order placement.
    pub fn check_order(&mut self, user: &Handle, now: DateTime<Utc>) -> Result<()> {
        self.orders.check_and_record(user, now)
    }

    /// Distinct users tracked by either window.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        let mut users: HashSet<&Handle> = self.commands.events.keys().collect();
        users.extend(self.orders.events.keys());
        users.len()
    }

    /// Forget users with no events inside their windows. Returns the number
    /// of window entries dropped across both windows.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        self.commands.prune(now) + self.orders.prune(now)
    }
}
