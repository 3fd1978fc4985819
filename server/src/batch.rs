//! Two-timer batch window
//!
//! A window opens when the orchestrator starts waiting for moves. It closes
//! at `min` after opening if every expected player has answered by then,
//! otherwise as soon as the last player answers, and never later than `max`.
//! Answers that arrive before `min` never make the window close early.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    /// Still accepting moves
    Open,
    /// Everyone answered; waiting out the minimum window
    Holding,
    Closed,
}

#[derive(Debug, Clone)]
pub struct BatchWindow {
    opened_at: Instant,
    min: Duration,
    max: Duration,
    all_arrived_at: Option<Instant>,
}

impl BatchWindow {
    pub fn open(now: Instant, min: Duration, max: Duration) -> Self {
        Self {
            opened_at: now,
            min,
            max: max.max(min),
            all_arrived_at: None,
        }
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Marks that every expected player has answered
    pub fn all_arrived(&mut self, now: Instant) {
        if self.all_arrived_at.is_none() {
            self.all_arrived_at = Some(now);
        }
    }

    /// The instant the window will close given what has arrived so far
    pub fn closes_at(&self) -> Instant {
        let earliest = self.opened_at + self.min;
        let latest = self.opened_at + self.max;
        match self.all_arrived_at {
            Some(at) => at.max(earliest).min(latest),
            None => latest,
        }
    }

    pub fn phase(&self, now: Instant) -> WindowPhase {
        if now >= self.closes_at() {
            WindowPhase::Closed
        } else if self.all_arrived_at.is_some() {
            WindowPhase::Holding
        } else {
            WindowPhase::Open
        }
    }

    pub fn is_closed(&self, now: Instant) -> bool {
        self.phase(now) == WindowPhase::Closed
    }

    /// Time since the window opened
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.opened_at)
    }
}
