use std::time::{Duration, Instant};

use crate::progress::{RunProgress, Status};

/// Rate limit for sensor pushes.
///
/// A status change or a pause/resume edge is pushed immediately; anything
/// else at most once per interval.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_push: Option<Instant>,
    last_status: Option<Status>,
    last_paused: bool,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_push: None,
            last_status: None,
            last_paused: false,
        }
    }

    /// Decide whether `progress` should be pushed at `now`, recording the push if so.
    pub fn should_push(&mut self, progress: &RunProgress, now: Instant) -> bool {
        let transition =
            self.last_status != Some(progress.status) || self.last_paused != progress.paused;
        let due = match self.last_push {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        };

        if transition || due {
            self.last_push = Some(now);
            self.last_status = Some(progress.status);
            self.last_paused = progress.paused;
            true
        } else {
            false
        }
    }
}
