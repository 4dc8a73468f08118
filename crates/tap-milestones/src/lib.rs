#![deny(warnings)]

//! Milestone ladder evaluation and explicit reward claims.
//!
//! A milestone becomes claimable once the cumulative run count reaches its
//! threshold. Claiming is always a separate player action; pending claims are
//! granted lowest threshold first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tap_core::{Milestone, MilestoneLadder, ProgressRecord, RewardId};
use thiserror::Error;
use tracing::info;

/// Errors produced by claims.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    /// Not reached yet, already claimed, or not on the ladder.
    #[error("milestone {threshold} is not claimable")]
    NotEligible { threshold: u32 },
    /// `claim_next` with nothing pending.
    #[error("no milestone reward is available")]
    NothingClaimable,
}

/// Result of a successful claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimed {
    pub threshold: u32,
    pub reward: RewardId,
}

/// Snapshot of the ladder for the home-screen banner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LadderStatus {
    pub total_runs: u32,
    pub next_milestone: Option<u32>,
    pub runs_until_next: Option<u32>,
    /// Reached but unclaimed thresholds, ascending.
    pub claimable: Vec<u32>,
    /// Fraction of the way from the previous threshold (or zero) to the next.
    pub progress_to_next: Option<f32>,
}

impl LadderStatus {
    /// Whether the achievement button should be enabled.
    pub fn achievement_available(&self) -> bool {
        !self.claimable.is_empty()
    }
}

/// Read-only view over a ladder.
#[derive(Clone, Copy, Debug)]
pub struct MilestoneEngine<'a> {
    ladder: &'a MilestoneLadder,
}

impl<'a> MilestoneEngine<'a> {
    pub fn new(ladder: &'a MilestoneLadder) -> Self {
        Self { ladder }
    }

    /// First milestone strictly greater than `total_runs`.
    pub fn next_milestone(&self, total_runs: u32) -> Option<&'a Milestone> {
        self.ladder
            .rungs()
            .iter()
            .find(|m| m.threshold > total_runs)
    }

    /// Runs left until the next milestone, `None` past the end of the ladder.
    pub fn runs_until_next(&self, total_runs: u32) -> Option<u32> {
        self.next_milestone(total_runs)
            .map(|m| m.threshold.saturating_sub(total_runs))
    }

    /// Reached and unclaimed milestones in ascending threshold order.
    pub fn claimable_milestones(
        &self,
        total_runs: u32,
        claimed: &BTreeSet<u32>,
    ) -> Vec<&'a Milestone> {
        self.ladder
            .rungs()
            .iter()
            .take_while(|m| m.threshold <= total_runs)
            .filter(|m| !claimed.contains(&m.threshold))
            .collect()
    }

    pub fn is_claimable(&self, threshold: u32, record: &ProgressRecord) -> bool {
        self.ladder.get(threshold).is_some()
            && record.total_runs() >= threshold
            && !record.is_claimed(threshold)
    }

    /// Claim one milestone: mark it claimed and unlock its reward.
    ///
    /// A second claim of the same milestone fails with `NotEligible` and leaves
    /// the record untouched.
    pub fn claim(&self, threshold: u32, record: &mut ProgressRecord) -> Result<Claimed, ClaimError> {
        let milestone = match self.ladder.get(threshold) {
            Some(m) if self.is_claimable(threshold, record) => *m,
            _ => return Err(ClaimError::NotEligible { threshold }),
        };
        record.mark_claimed(milestone.threshold);
        record.unlock(milestone.reward);
        info!(
            threshold,
            reward = %milestone.reward,
            total_runs = record.total_runs(),
            "milestone claimed"
        );
        Ok(Claimed {
            threshold,
            reward: milestone.reward,
        })
    }

    /// Claim the lowest pending milestone.
    pub fn claim_next(&self, record: &mut ProgressRecord) -> Result<Claimed, ClaimError> {
        let next = self
            .claimable_milestones(record.total_runs(), record.claimed_milestones())
            .first()
            .map(|m| m.threshold)
            .ok_or(ClaimError::NothingClaimable)?;
        self.claim(next, record)
    }

    pub fn status(&self, record: &ProgressRecord) -> LadderStatus {
        let total = record.total_runs();
        let next = self.next_milestone(total);
        let claimable = self
            .claimable_milestones(total, record.claimed_milestones())
            .into_iter()
            .map(|m| m.threshold)
            .collect();
        let progress_to_next = next.map(|m| {
            let floor = self
                .ladder
                .thresholds()
                .take_while(|&t| t <= total)
                .last()
                .unwrap_or(0);
            let span = m.threshold - floor;
            (total - floor) as f32 / span as f32
        });
        LadderStatus {
            total_runs: total,
            next_milestone: next.map(|m| m.threshold),
            runs_until_next: self.runs_until_next(total),
            claimable,
            progress_to_next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ladder(thresholds: &[u32]) -> MilestoneLadder {
        MilestoneLadder::new(
            thresholds
                .iter()
                .enumerate()
                .map(|(i, &threshold)| Milestone {
                    threshold,
                    reward: RewardId(201 + i as u32),
                })
                .collect(),
        )
        .unwrap()
    }

    fn record_with_runs(n: u32) -> ProgressRecord {
        let mut r = ProgressRecord::new();
        for _ in 0..n {
            r.record_completed_run();
        }
        r
    }

    #[test]
    fn next_and_remaining() {
        let l = ladder(&[50, 100, 150, 200]);
        let e = MilestoneEngine::new(&l);
        assert_eq!(e.next_milestone(0).map(|m| m.threshold), Some(50));
        assert_eq!(e.runs_until_next(0), Some(50));
        assert_eq!(e.next_milestone(50).map(|m| m.threshold), Some(100));
        assert_eq!(e.runs_until_next(99), Some(1));
        assert_eq!(e.next_milestone(200), None);
        assert_eq!(e.runs_until_next(250), None);
    }

    #[test]
    fn claim_unlocks_reward_once() {
        let l = ladder(&[1, 2, 3, 4]);
        let e = MilestoneEngine::new(&l);
        let mut r = record_with_runs(1);
        let c = e.claim(1, &mut r).unwrap();
        assert_eq!(c.reward, RewardId(201));
        assert!(r.is_unlocked(RewardId(201)));
        assert!(r.is_claimed(1));

        let snapshot = r.clone();
        assert_eq!(
            e.claim(1, &mut r),
            Err(ClaimError::NotEligible { threshold: 1 })
        );
        assert_eq!(r, snapshot);
    }

    #[test]
    fn cannot_claim_unreached_or_unknown() {
        let l = ladder(&[50, 100]);
        let e = MilestoneEngine::new(&l);
        let mut r = record_with_runs(49);
        assert_eq!(
            e.claim(50, &mut r),
            Err(ClaimError::NotEligible { threshold: 50 })
        );
        let mut r = record_with_runs(70);
        assert_eq!(
            e.claim(60, &mut r),
            Err(ClaimError::NotEligible { threshold: 60 })
        );
        assert!(r.claimed_milestones().is_empty());
        assert!(r.unlocked_rewards().is_empty());
    }

    #[test]
    fn claim_next_goes_lowest_first() {
        let l = ladder(&[50, 100, 150, 200]);
        let e = MilestoneEngine::new(&l);
        let mut r = record_with_runs(120);
        assert_eq!(
            e.claimable_milestones(120, r.claimed_milestones())
                .iter()
                .map(|m| m.threshold)
                .collect::<Vec<_>>(),
            vec![50, 100]
        );
        assert_eq!(e.claim_next(&mut r).unwrap().threshold, 50);
        assert_eq!(e.claim_next(&mut r).unwrap().threshold, 100);
        assert_eq!(e.claim_next(&mut r), Err(ClaimError::NothingClaimable));
    }

    #[test]
    fn status_reports_banner_fields() {
        let l = ladder(&[50, 100]);
        let e = MilestoneEngine::new(&l);
        let r = record_with_runs(75);
        let s = e.status(&r);
        assert_eq!(s.next_milestone, Some(100));
        assert_eq!(s.runs_until_next, Some(25));
        assert_eq!(s.claimable, vec![50]);
        assert!(s.achievement_available());
        assert_eq!(s.progress_to_next, Some(0.5));

        let done = e.status(&record_with_runs(300));
        assert_eq!(done.next_milestone, None);
        assert_eq!(done.progress_to_next, None);
    }

    proptest! {
        #[test]
        fn claims_never_precede_runs(runs in 0u32..300, attempts in proptest::collection::vec(0u32..250, 0..20)) {
            let l = ladder(&[50, 100, 150, 200]);
            let e = MilestoneEngine::new(&l);
            let mut r = record_with_runs(runs);
            for t in attempts {
                let _ = e.claim(t, &mut r);
            }
            for &m in r.claimed_milestones() {
                prop_assert!(r.total_runs() >= m);
            }
            prop_assert!(tap_core::validate_progress(&r, &l).is_ok());
        }

        #[test]
        fn claimable_matches_definition(runs in 0u32..300) {
            let l = ladder(&[50, 100, 150, 200]);
            let e = MilestoneEngine::new(&l);
            let claimed: BTreeSet<u32> = [100].into_iter().collect();
            let got: Vec<u32> = e.claimable_milestones(runs, &claimed).iter().map(|m| m.threshold).collect();
            let want: Vec<u32> = [50, 100, 150, 200].into_iter().filter(|&m| runs >= m && m != 100).collect();
            prop_assert_eq!(got, want);
        }
    }
}
