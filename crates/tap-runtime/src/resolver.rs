//! Run-completion rewards: cosmetic draw, run count and milestone notices.

use crate::hooks::{AttributionSink, Noop, RewardsPortal};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tap_core::{GameTuningConfig, Milestone, ProgressRecord, RewardId};
use tap_milestones::MilestoneEngine;
use tap_picker::{PickError, WeightedPicker};
use tracing::info;

/// Everything a completed run produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCompletion {
    /// Total completed runs, this one included.
    pub total_runs: u32,
    /// Clear image drawn for this run.
    pub cosmetic: RewardId,
    /// Whether `cosmetic` was seen for the first time.
    pub first_unlock: bool,
    /// Milestones whose threshold equals the new total.
    pub newly_reached: Vec<Milestone>,
    /// Every reached but unclaimed milestone, ascending. Shown as pending
    /// claims; never claimed here.
    pub pending_claims: Vec<Milestone>,
}

/// Composes the weighted draw and the milestone ladder on run completion.
pub struct RewardResolver {
    attribution: Box<dyn AttributionSink>,
    portal: Box<dyn RewardsPortal>,
}

impl Default for RewardResolver {
    fn default() -> Self {
        Self::new(Box::new(Noop), Box::new(Noop))
    }
}

impl RewardResolver {
    pub fn new(attribution: Box<dyn AttributionSink>, portal: Box<dyn RewardsPortal>) -> Self {
        Self {
            attribution,
            portal,
        }
    }

    /// Draw the clear image, unlock it, count the run and report pending
    /// milestones. The record is untouched if the draw fails.
    pub fn resolve_run_completion<R: Rng>(
        &mut self,
        config: &GameTuningConfig,
        record: &mut ProgressRecord,
        picker: &mut WeightedPicker<R>,
    ) -> Result<RunCompletion, PickError> {
        let cosmetic = picker.pick(&config.clear_table)?;
        let first_unlock = record.unlock(cosmetic);
        let total_runs = record.record_completed_run();

        let engine = MilestoneEngine::new(&config.ladder);
        let pending_claims: Vec<Milestone> = engine
            .claimable_milestones(total_runs, record.claimed_milestones())
            .into_iter()
            .copied()
            .collect();
        let newly_reached: Vec<Milestone> = config
            .ladder
            .get(total_runs)
            .into_iter()
            .copied()
            .collect();

        info!(
            total_runs,
            cosmetic = %cosmetic,
            first_unlock,
            pending = pending_claims.len(),
            "run completed"
        );

        if config.attribution_checkpoints.contains(&total_runs) {
            self.attribution.on_run_completed(total_runs);
        }
        self.portal.log_action(total_runs);

        Ok(RunCompletion {
            total_runs,
            cosmetic,
            first_unlock,
            newly_reached,
            pending_claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tap_core::TuningProfile;

    #[derive(Clone, Default)]
    struct Log(Rc<RefCell<Vec<(&'static str, u32)>>>);

    impl AttributionSink for Log {
        fn on_run_completed(&mut self, total_runs: u32) {
            self.0.borrow_mut().push(("attribution", total_runs));
        }
    }

    impl RewardsPortal for Log {
        fn log_action(&mut self, total_runs: u32) {
            self.0.borrow_mut().push(("portal", total_runs));
        }
    }

    #[test]
    fn completion_counts_run_and_unlocks_cosmetic() {
        let cfg = GameTuningConfig::for_profile(TuningProfile::Testing);
        let mut record = ProgressRecord::new();
        let mut picker = WeightedPicker::seeded(1);
        let mut resolver = RewardResolver::default();

        let done = resolver
            .resolve_run_completion(&cfg, &mut record, &mut picker)
            .unwrap();
        assert_eq!(done.total_runs, 1);
        assert_eq!(record.total_runs(), 1);
        assert!(cfg.clear_table.contains(done.cosmetic));
        assert!(record.is_unlocked(done.cosmetic));
        assert!(done.first_unlock);
        assert_eq!(done.newly_reached.len(), 1);
        assert_eq!(done.pending_claims[0].threshold, 1);
        // Pending only: nothing claimed, milestone reward still locked.
        assert!(record.claimed_milestones().is_empty());
        assert!(!record.is_unlocked(done.pending_claims[0].reward));
    }

    #[test]
    fn pending_claims_accumulate_until_claimed() {
        let cfg = GameTuningConfig::for_profile(TuningProfile::Testing);
        let mut record = ProgressRecord::new();
        let mut picker = WeightedPicker::seeded(2);
        let mut resolver = RewardResolver::default();
        let mut last = None;
        for _ in 0..3 {
            last = Some(
                resolver
                    .resolve_run_completion(&cfg, &mut record, &mut picker)
                    .unwrap(),
            );
        }
        let last = last.unwrap();
        assert_eq!(
            last.pending_claims.iter().map(|m| m.threshold).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            last.newly_reached.iter().map(|m| m.threshold).collect::<Vec<_>>(),
            vec![3]
        );
    }

    #[test]
    fn collaborators_hear_completions() {
        let cfg = GameTuningConfig::for_profile(TuningProfile::Production);
        let log = Log::default();
        let mut resolver = RewardResolver::new(Box::new(log.clone()), Box::new(log.clone()));
        let mut record = ProgressRecord::new();
        let mut picker = WeightedPicker::seeded(3);
        for _ in 0..51 {
            resolver
                .resolve_run_completion(&cfg, &mut record, &mut picker)
                .unwrap();
        }
        let calls = log.0.borrow();
        let attribution: Vec<u32> = calls
            .iter()
            .filter(|(who, _)| *who == "attribution")
            .map(|&(_, n)| n)
            .collect();
        assert_eq!(attribution, vec![1, 50]);
        assert_eq!(calls.iter().filter(|(who, _)| *who == "portal").count(), 51);
    }
}
