//! Countdown to the next predicted event
//!
//! Pure state machine: the engine feeds it candidate targets and clock
//! ticks and carries out the side effects it reports.

use chrono::{DateTime, Duration as ChronoDuration, Local, LocalResult, NaiveDateTime, TimeZone, Utc};

use crate::constants::{PRE_EVENT_THRESHOLD, RETARGET_TOLERANCE};

/// The instant the countdown is aiming at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTarget {
    pub at: DateTime<Utc>,
    pub minutes: u32,
}

/// Result of offering a new candidate target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retarget {
    /// Target replaced; the pre-event flag was reset
    Replaced(CountdownTarget),
    /// Candidate within tolerance of the current target
    Unchanged,
}

/// Result of one countdown tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// No target set
    Idle,
    /// Counting down, nothing to do
    Counting { remaining: ChronoDuration },
    /// Remaining time dropped into the pre-event window; fire once
    PreEvent { remaining: ChronoDuration },
    /// Target passed and was cleared
    Expired { target: CountdownTarget },
}

#[derive(Debug, Clone, Default)]
pub struct Countdown {
    target: Option<CountdownTarget>,
    pre_event_fired: bool,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted target. The pre-event flag starts cleared.
    pub fn restore(at: Option<DateTime<Utc>>, minutes: Option<u32>) -> Self {
        Self {
            target: at.map(|at| CountdownTarget {
                at,
                minutes: minutes.unwrap_or_default(),
            }),
            pre_event_fired: false,
        }
    }

    pub fn target(&self) -> Option<CountdownTarget> {
        self.target
    }

    pub fn pre_event_fired(&self) -> bool {
        self.pre_event_fired
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<ChronoDuration> {
        self.target.map(|target| target.at - now)
    }

    /// Offer a candidate target. It replaces the current one only when none
    /// is set or it differs by more than `RETARGET_TOLERANCE`.
    pub fn retarget(&mut self, candidate: CountdownTarget) -> Retarget {
        let tolerance = tolerance(RETARGET_TOLERANCE);
        let replace = match self.target {
            None => true,
            Some(current) => (candidate.at - current.at).abs() > tolerance,
        };

        if replace {
            self.target = Some(candidate);
            self.pre_event_fired = false;
            Retarget::Replaced(candidate)
        } else {
            Retarget::Unchanged
        }
    }

    /// Advance the countdown to `now`
    pub fn tick(&mut self, now: DateTime<Utc>) -> CountdownTick {
        let Some(target) = self.target else {
            return CountdownTick::Idle;
        };

        if now > target.at {
            self.clear();
            return CountdownTick::Expired { target };
        }

        let remaining = target.at - now;
        let in_window = remaining > ChronoDuration::zero() && remaining <= tolerance(PRE_EVENT_THRESHOLD);
        if in_window && !self.pre_event_fired {
            self.pre_event_fired = true;
            return CountdownTick::PreEvent { remaining };
        }

        CountdownTick::Counting { remaining }
    }

    pub fn clear(&mut self) {
        self.target = None;
        self.pre_event_fired = false;
    }
}

fn tolerance(duration: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero())
}

/// Convert a naive timestamp in the local clock domain to an absolute instant.
///
/// Ambiguous local times (clock set back) take the earlier instant. Times
/// that do not exist locally (clock set forward) are shifted by one hour.
pub fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(local) => local.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => match Local.from_local_datetime(&(naive + ChronoDuration::hours(1))) {
            LocalResult::Single(local) | LocalResult::Ambiguous(local, _) => local.with_timezone(&Utc),
            LocalResult::None => naive.and_utc(),
        },
    }
}

/// Display helper for the local wall-clock view of a target
pub fn utc_to_local(at: DateTime<Utc>) -> NaiveDateTime {
    at.with_timezone(&Local).naive_local()
}
