//! Sliding-window rate limiting keyed by player and action type

use shared::PlayerId;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// History older than this is dropped by `prune`, whatever the action's window.
pub const HISTORY_RETENTION: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub interval: Duration,
    pub max: usize,
}

impl RateLimit {
    pub const fn per_second(max: usize) -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max,
        }
    }
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    history: HashMap<(PlayerId, String), VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an attempt and returns whether it fits in the window.
    /// Refused attempts are not recorded.
    pub fn check(&mut self, player: PlayerId, action: &str, limit: RateLimit, now: Instant) -> bool {
        let window = self
            .history
            .entry((player, action.to_string()))
            .or_default();

        while let Some(oldest) = window.front() {
            if now.saturating_duration_since(*oldest) >= limit.interval {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limit.max {
            return false;
        }
        window.push_back(now);
        true
    }

    pub fn prune(&mut self, now: Instant) {
        self.history.retain(|_, window| {
            window.retain(|at| now.saturating_duration_since(*at) < HISTORY_RETENTION);
            !window.is_empty()
        });
    }

    pub fn forget_player(&mut self, player: PlayerId) {
        self.history.retain(|(id, _), _| *id != player);
    }

    pub fn tracked_keys(&self) -> usize {
        self.history.len()
    }
}
