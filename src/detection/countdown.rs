// src/detection/countdown.rs
//
// Abortable countdown between a confirmed smile and the actual alarm.
// The caller owns the timer; every tick and every cancel goes through
// `&mut self`, so a cancel is either seen before the final tick or
// arrives after the countdown already fired and is ignored.

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Unarmed,
    Armed { seconds_remaining: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// Nothing armed; the tick is ignored
    Idle,
    /// Still counting; value is what to announce
    Remaining(u32),
    /// Reached zero; trigger now. Back to unarmed.
    Fired,
}

pub struct CountdownConfirmer {
    start_seconds: u32,
    state: CountdownState,
}

impl CountdownConfirmer {
    pub fn new(start_seconds: u32) -> Self {
        Self {
            start_seconds: start_seconds.max(1),
            state: CountdownState::Unarmed,
        }
    }

    /// Returns false if a countdown was already running.
    pub fn arm(&mut self) -> bool {
        if self.is_armed() {
            debug!("Countdown already armed, ignoring");
            return false;
        }
        self.state = CountdownState::Armed {
            seconds_remaining: self.start_seconds,
        };
        info!("⏳ Countdown armed: {}s to abort", self.start_seconds);
        true
    }

    /// Returns true if an armed countdown was discarded.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            CountdownState::Armed { seconds_remaining } => {
                self.state = CountdownState::Unarmed;
                info!("✋ Countdown cancelled with {}s left", seconds_remaining);
                true
            }
            CountdownState::Unarmed => false,
        }
    }

    pub fn tick(&mut self) -> CountdownTick {
        match self.state {
            CountdownState::Unarmed => CountdownTick::Idle,
            CountdownState::Armed { seconds_remaining } => {
                let remaining = seconds_remaining.saturating_sub(1);
                if remaining == 0 {
                    self.state = CountdownState::Unarmed;
                    info!("🚨 Countdown elapsed, submitting");
                    CountdownTick::Fired
                } else {
                    self.state = CountdownState::Armed {
                        seconds_remaining: remaining,
                    };
                    CountdownTick::Remaining(remaining)
                }
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, CountdownState::Armed { .. })
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn start_seconds(&self) -> u32 {
        self.start_seconds
    }
}

impl Default for CountdownConfirmer {
    fn default() -> Self {
        Self::new(3)
    }
}
