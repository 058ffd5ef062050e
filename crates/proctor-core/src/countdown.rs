//! Wall-clock countdown state machine.
//!
//! The countdown is anchored to an absolute start timestamp rather than a
//! decrementing counter, so a reload or reconnect can recompute elapsed time
//! from the anchor. All transitions take the current time as an argument; the
//! engine drives ticks at one-second granularity.

use chrono::{DateTime, Utc};

/// Countdown lifecycle. `Expired` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Idle,
    Running,
    Expired,
    Completed,
}

/// One attempt's time budget. Created on attempt start, owned by the attempt
/// session, and released with it on every exit path.
#[derive(Debug, Clone)]
pub struct Countdown {
    state: CountdownState,
    budget_secs: u64,
    started_at: Option<DateTime<Utc>>,
}

impl Countdown {
    pub fn new(budget_secs: u64) -> Self {
        Self {
            state: CountdownState::Idle,
            budget_secs,
            started_at: None,
        }
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn budget_secs(&self) -> u64 {
        self.budget_secs
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, CountdownState::Expired | CountdownState::Completed)
    }

    /// Idle → Running, anchoring the budget at `now`. Returns `false` if the
    /// countdown was already started.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != CountdownState::Idle {
            return false;
        }
        self.started_at = Some(now);
        self.state = CountdownState::Running;
        true
    }

    /// Whole seconds since the anchor, saturating at zero for clock skew and
    /// capped at the budget.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        let Some(started_at) = self.started_at else {
            return 0;
        };
        let elapsed = (now - started_at).num_seconds().max(0) as u64;
        elapsed.min(self.budget_secs)
    }

    /// Seconds left in the budget at `now`.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        self.budget_secs - self.elapsed_secs(now)
    }

    /// Periodic advance. Running → Expired exactly once when the budget is
    /// exhausted; returns `true` only for the winning transition.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != CountdownState::Running {
            return false;
        }
        if self.remaining_secs(now) > 0 {
            return false;
        }
        self.state = CountdownState::Expired;
        true
    }

    /// Manual submit. Running → Completed; returns `true` only for the
    /// winning transition, so a same-moment race with expiry cannot
    /// double-finalize.
    pub fn complete(&mut self) -> bool {
        if self.state != CountdownState::Running {
            return false;
        }
        self.state = CountdownState::Completed;
        true
    }
}
