//! Outbound hooks for attribution and loyalty-points collaborators.
//!
//! The core only reports run completions; batching, network calls and rate
//! limits belong to the implementations.

use chrono::{Local, NaiveDate};
use tracing::debug;

/// Install-attribution / analytics collaborator.
pub trait AttributionSink {
    /// Called when a run completion lands on one of the configured checkpoints.
    fn on_run_completed(&mut self, total_runs: u32);
}

/// Loyalty / rewards-portal collaborator.
pub trait RewardsPortal {
    /// Called on every run completion.
    fn log_action(&mut self, total_runs: u32);
}

/// Hook implementation that drops every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct Noop;

impl AttributionSink for Noop {
    fn on_run_completed(&mut self, _total_runs: u32) {}
}

impl RewardsPortal for Noop {
    fn log_action(&mut self, _total_runs: u32) {}
}

/// Calls-per-day budget for collaborators that must limit themselves.
#[derive(Clone, Debug)]
pub struct DailyCap {
    max_per_day: u32,
    day: Option<NaiveDate>,
    used: u32,
}

impl DailyCap {
    pub fn new(max_per_day: u32) -> Self {
        Self {
            max_per_day,
            day: None,
            used: 0,
        }
    }

    /// Take one call from `today`'s budget. The budget resets when the date
    /// changes.
    pub fn try_acquire(&mut self, today: NaiveDate) -> bool {
        if self.day != Some(today) {
            self.day = Some(today);
            self.used = 0;
        }
        if self.used >= self.max_per_day {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn remaining(&self, today: NaiveDate) -> u32 {
        if self.day == Some(today) {
            self.max_per_day.saturating_sub(self.used)
        } else {
            self.max_per_day
        }
    }
}

/// Portal wrapper forwarding at most `max_per_day` actions per local day.
pub struct CappedPortal<P> {
    inner: P,
    cap: DailyCap,
    clock: fn() -> NaiveDate,
}

impl<P: RewardsPortal> CappedPortal<P> {
    pub fn new(inner: P, max_per_day: u32) -> Self {
        Self::with_clock(inner, max_per_day, || Local::now().date_naive())
    }

    pub fn with_clock(inner: P, max_per_day: u32, clock: fn() -> NaiveDate) -> Self {
        Self {
            inner,
            cap: DailyCap::new(max_per_day),
            clock,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: RewardsPortal> RewardsPortal for CappedPortal<P> {
    fn log_action(&mut self, total_runs: u32) {
        if self.cap.try_acquire((self.clock)()) {
            self.inner.log_action(total_runs);
        } else {
            debug!(total_runs, "rewards portal daily cap reached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting(Vec<u32>);

    impl RewardsPortal for Counting {
        fn log_action(&mut self, total_runs: u32) {
            self.0.push(total_runs);
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn cap_resets_each_day() {
        let mut cap = DailyCap::new(2);
        assert!(cap.try_acquire(day(1)));
        assert!(cap.try_acquire(day(1)));
        assert!(!cap.try_acquire(day(1)));
        assert_eq!(cap.remaining(day(1)), 0);
        assert_eq!(cap.remaining(day(2)), 2);
        assert!(cap.try_acquire(day(2)));
    }

    #[test]
    fn capped_portal_drops_excess_calls() {
        let mut portal = CappedPortal::with_clock(Counting::default(), 3, || day(5));
        for n in 1..=10 {
            portal.log_action(n);
        }
        assert_eq!(portal.inner().0, vec![1, 2, 3]);
    }
}
