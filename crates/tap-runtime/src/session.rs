//! Single owner of the runner, the progress record and its store.
//!
//! Every mutation is followed by a write-through save. Save failures are
//! retried once and then parked as a [`SaveWarning`] for the UI; they never
//! interrupt play.
//!
//! If the store cannot be read at open, the session starts from a fresh record
//! and stays offline: nothing is written until a later load succeeds, at which
//! point the offline progress is folded into the stored record.

use crate::resolver::{RewardResolver, RunCompletion};
use crate::runner::{RunnerError, Screen, StageRunner, TapOutcome};
use persistence::{KeyValueStore, ProgressStore, SaveWarning, StorageError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tap_core::{
    validate_progress, GameTuningConfig, ProgressRecord, ResumePolicy, RewardId, RunState,
    ValidationError,
};
use tap_milestones::{ClaimError, Claimed, MilestoneEngine};
use tap_picker::{PickError, WeightedPicker};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Pick(#[from] PickError),
}

/// Home-screen banner data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HomeStatus {
    pub total_runs: u32,
    pub next_milestone: Option<u32>,
    pub runs_until_next: Option<u32>,
    pub claimable: Vec<u32>,
    pub achievement_available: bool,
    pub progress_to_next: Option<f32>,
    pub character: Option<RewardId>,
}

pub struct GameSession<S, R> {
    config: GameTuningConfig,
    runner: StageRunner,
    record: ProgressRecord,
    store: ProgressStore<S>,
    picker: WeightedPicker<R>,
    resolver: RewardResolver,
    character: Option<RewardId>,
    last_completion: Option<RunCompletion>,
    save_warning: Option<SaveWarning>,
    /// Runs completed while the stored record could not be read. `None` once
    /// the session is attached to the store.
    offline_runs: Option<u32>,
}

impl<S: KeyValueStore, R: Rng> GameSession<S, R> {
    /// Validate the tuning, load progress and, under `ResumeMidRun`, restore
    /// the interrupted run.
    pub fn open(
        config: GameTuningConfig,
        store: ProgressStore<S>,
        picker: WeightedPicker<R>,
        resolver: RewardResolver,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let (record, save_warning, offline_runs) = match store.load_with_retry() {
            Ok(record) => (record, None, None),
            Err(error @ StorageError::Unavailable(_)) => {
                warn!(%error, "progress unavailable, playing offline");
                let warning = SaveWarning { attempts: 2, error };
                (ProgressRecord::new(), Some(warning), Some(0))
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = validate_progress(&record, &config.ladder) {
            warn!(error = %e, "stored progress does not match the milestone ladder");
        }
        let mut runner = StageRunner::from_config(&config);
        if config.resume_policy == ResumePolicy::ResumeMidRun {
            if let Some(run) = record.saved_run() {
                runner = runner.with_run(run);
            }
        }
        info!(
            namespace = store.namespace(),
            total_runs = record.total_runs(),
            run = ?runner.run_state(),
            "session opened"
        );
        Ok(Self {
            config,
            runner,
            record,
            store,
            picker,
            resolver,
            character: None,
            last_completion: None,
            save_warning,
            offline_runs,
        })
    }

    pub fn config(&self) -> &GameTuningConfig {
        &self.config
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    pub fn screen(&self) -> Screen {
        self.runner.screen()
    }

    pub fn run_state(&self) -> RunState {
        self.runner.run_state()
    }

    pub fn taps_remaining(&self) -> u32 {
        self.runner.taps_remaining()
    }

    /// Character drawn on the latest arrival at home.
    pub fn character(&self) -> Option<RewardId> {
        self.character
    }

    pub fn last_completion(&self) -> Option<&RunCompletion> {
        self.last_completion.as_ref()
    }

    /// Display asset for a reward id.
    pub fn asset(&self, id: RewardId) -> Option<&str> {
        self.config.catalog.asset(id)
    }

    pub fn store(&self) -> &ProgressStore<S> {
        &self.store
    }

    /// Pending "progress may not be saved" notice, cleared on read.
    pub fn take_save_warning(&mut self) -> Option<SaveWarning> {
        self.save_warning.take()
    }

    /// Whether progress is held only in memory because the store could not be
    /// read.
    pub fn is_offline(&self) -> bool {
        self.offline_runs.is_some()
    }

    /// Try to read the stored record again and fold offline progress into it.
    fn reattach(&mut self, offline_runs: u32) -> bool {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(error) => {
                self.save_warning = Some(SaveWarning { attempts: 1, error });
                return false;
            }
        };
        let unlocked = stored
            .unlocked_rewards()
            .union(self.record.unlocked_rewards())
            .copied()
            .collect();
        let claimed = stored
            .claimed_milestones()
            .union(self.record.claimed_milestones())
            .copied()
            .collect();
        self.record = ProgressRecord::from_parts(
            stored.total_runs().saturating_add(offline_runs),
            unlocked,
            claimed,
            self.record.saved_run(),
            self.record.haptics_enabled(),
        );
        self.offline_runs = None;
        info!(
            total_runs = self.record.total_runs(),
            offline_runs, "progress store reattached"
        );
        true
    }

    fn persist(&mut self) {
        if let Some(offline_runs) = self.offline_runs {
            if !self.reattach(offline_runs) {
                return;
            }
        }
        if let Err(w) = self.store.save_with_retry(&self.record) {
            self.save_warning = Some(w);
        }
    }

    fn sync_run(&mut self) {
        if self.config.resume_policy == ResumePolicy::ResumeMidRun {
            self.record.set_saved_run(Some(self.runner.run_state()));
            self.persist();
        }
    }

    fn arrive_home(&mut self) -> Result<(), PickError> {
        let character = self.picker.pick(&self.config.character_table)?;
        self.character = Some(character);
        if self.record.unlock(character) {
            self.persist();
        }
        Ok(())
    }

    /// Leave the splash screen.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.runner.start()?;
        self.arrive_home()?;
        Ok(())
    }

    /// Enter the game at the current stage.
    pub fn play(&mut self) -> Result<u32, RunnerError> {
        self.runner.play()
    }

    /// Count a tap; on the final goal, resolve rewards and show the clear
    /// screen.
    pub fn tap(&mut self) -> Result<TapOutcome, SessionError> {
        let outcome = self.runner.tap();
        match outcome {
            TapOutcome::Ignored => {}
            TapOutcome::Counted { .. } | TapOutcome::StageCleared { .. } => self.sync_run(),
            TapOutcome::RunCleared => {
                let completion = self.resolver.resolve_run_completion(
                    &self.config,
                    &mut self.record,
                    &mut self.picker,
                )?;
                if let Some(n) = self.offline_runs.as_mut() {
                    *n += 1;
                }
                self.record.set_saved_run(None);
                self.persist();
                self.last_completion = Some(completion);
            }
        }
        Ok(outcome)
    }

    pub fn advance(&mut self) -> Result<u32, RunnerError> {
        let stage = self.runner.advance()?;
        self.sync_run();
        Ok(stage)
    }

    /// Leave the clear screen for home.
    pub fn finish(&mut self) -> Result<(), SessionError> {
        self.runner.finish()?;
        self.sync_run();
        self.arrive_home()?;
        Ok(())
    }

    pub fn abandon(&mut self) -> Result<RunState, RunnerError> {
        let run = self.runner.abandon()?;
        self.sync_run();
        Ok(run)
    }

    pub fn claim(&mut self, threshold: u32) -> Result<Claimed, ClaimError> {
        let claimed = MilestoneEngine::new(&self.config.ladder).claim(threshold, &mut self.record)?;
        self.persist();
        Ok(claimed)
    }

    /// Claim the lowest pending milestone.
    pub fn claim_next(&mut self) -> Result<Claimed, ClaimError> {
        let claimed = MilestoneEngine::new(&self.config.ladder).claim_next(&mut self.record)?;
        self.persist();
        Ok(claimed)
    }

    pub fn set_haptics_enabled(&mut self, enabled: bool) {
        if self.record.haptics_enabled() != enabled {
            self.record.set_haptics_enabled(enabled);
            self.persist();
        }
    }

    pub fn status(&self) -> HomeStatus {
        let ladder = MilestoneEngine::new(&self.config.ladder).status(&self.record);
        HomeStatus {
            total_runs: ladder.total_runs,
            next_milestone: ladder.next_milestone,
            runs_until_next: ladder.runs_until_next,
            achievement_available: ladder.achievement_available(),
            claimable: ladder.claimable,
            progress_to_next: ladder.progress_to_next,
            character: self.character,
        }
    }
}
