//! Per-run screen state machine.
//!
//! `Splash -> Home -> Game(1) -> StageChange(1) -> Game(2) -> ... -> Clear -> Home`.
//! Taps only count in `Game`; clearing the last stage lands on `Clear`, which
//! waits for an explicit finish.

use serde::{Deserialize, Serialize};
use std::fmt;
use tap_core::{AbandonPolicy, GameTuningConfig, RunState};
use thiserror::Error;
use tracing::debug;

/// Screen currently shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Screen {
    Splash,
    Home,
    Game { stage: u32 },
    /// Stage cleared; the stage number is held for the "stage cleared" message.
    StageChange { stage: u32 },
    Clear,
}

/// Player actions accepted by the runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Start,
    Play,
    Advance,
    Finish,
    Abandon,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Start => "start",
            Action::Play => "play",
            Action::Advance => "advance",
            Action::Finish => "finish",
            Action::Abandon => "abandon",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("cannot {action} from {screen:?}")]
    InvalidTransition { action: Action, screen: Screen },
}

/// What a single tap did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapOutcome {
    /// Counted toward the current stage goal.
    Counted { stage: u32, taps: u32 },
    /// Goal reached on a non-final stage.
    StageCleared { stage: u32 },
    /// Goal reached on the final stage.
    RunCleared,
    /// Not in `Game`; nothing changed.
    Ignored,
}

#[derive(Clone, Debug)]
pub struct StageRunner {
    total_stages: u32,
    taps_per_stage: u32,
    abandon_policy: AbandonPolicy,
    screen: Screen,
    run: RunState,
    stage_baseline: u32,
}

impl StageRunner {
    /// `total_stages` and `taps_per_stage` are raised to at least 1.
    pub fn new(total_stages: u32, taps_per_stage: u32, abandon_policy: AbandonPolicy) -> Self {
        Self {
            total_stages: total_stages.max(1),
            taps_per_stage: taps_per_stage.max(1),
            abandon_policy,
            screen: Screen::Splash,
            run: RunState::default(),
            stage_baseline: 0,
        }
    }

    pub fn from_config(cfg: &GameTuningConfig) -> Self {
        Self::new(cfg.total_stages, cfg.taps_per_stage, cfg.abandon_policy)
    }

    /// Resume an interrupted run. Out-of-range values are pulled back into
    /// bounds; a stage whose goal was already met resumes at the next stage.
    pub fn with_run(mut self, run: RunState) -> Self {
        let mut run = RunState {
            stage: run.stage.clamp(1, self.total_stages),
            taps: run.taps.min(self.taps_per_stage),
        };
        if run.taps == self.taps_per_stage {
            run = if run.stage < self.total_stages {
                RunState {
                    stage: run.stage + 1,
                    taps: 0,
                }
            } else {
                RunState::default()
            };
        }
        self.run = run;
        self
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn run_state(&self) -> RunState {
        self.run
    }

    pub fn total_stages(&self) -> u32 {
        self.total_stages
    }

    pub fn taps_per_stage(&self) -> u32 {
        self.taps_per_stage
    }

    /// Taps still needed in the current stage.
    pub fn taps_remaining(&self) -> u32 {
        self.taps_per_stage.saturating_sub(self.run.taps)
    }

    fn invalid(&self, action: Action) -> RunnerError {
        RunnerError::InvalidTransition {
            action,
            screen: self.screen,
        }
    }

    fn goto(&mut self, screen: Screen) {
        debug!(from = ?self.screen, to = ?screen, run = ?self.run, "screen transition");
        self.screen = screen;
    }

    /// Splash -> Home.
    pub fn start(&mut self) -> Result<(), RunnerError> {
        if self.screen != Screen::Splash {
            return Err(self.invalid(Action::Start));
        }
        self.goto(Screen::Home);
        Ok(())
    }

    /// Home -> Game at the current stage. Returns the stage entered.
    pub fn play(&mut self) -> Result<u32, RunnerError> {
        if self.screen != Screen::Home {
            return Err(self.invalid(Action::Play));
        }
        self.stage_baseline = self.run.taps;
        self.goto(Screen::Game {
            stage: self.run.stage,
        });
        Ok(self.run.stage)
    }

    pub fn tap(&mut self) -> TapOutcome {
        let stage = match self.screen {
            Screen::Game { stage } => stage,
            _ => return TapOutcome::Ignored,
        };
        if self.run.taps < self.taps_per_stage {
            self.run.taps += 1;
        }
        if self.run.taps < self.taps_per_stage {
            return TapOutcome::Counted {
                stage,
                taps: self.run.taps,
            };
        }
        if stage < self.total_stages {
            self.goto(Screen::StageChange { stage });
            TapOutcome::StageCleared { stage }
        } else {
            self.goto(Screen::Clear);
            TapOutcome::RunCleared
        }
    }

    /// StageChange(s) -> Game(s + 1). Returns the new stage.
    pub fn advance(&mut self) -> Result<u32, RunnerError> {
        let stage = match self.screen {
            Screen::StageChange { stage } => stage,
            _ => return Err(self.invalid(Action::Advance)),
        };
        let next = (stage + 1).min(self.total_stages);
        self.run = RunState {
            stage: next,
            taps: 0,
        };
        self.stage_baseline = 0;
        self.goto(Screen::Game { stage: next });
        Ok(next)
    }

    /// Clear -> Home, resetting the run.
    pub fn finish(&mut self) -> Result<(), RunnerError> {
        if self.screen != Screen::Clear {
            return Err(self.invalid(Action::Finish));
        }
        self.run = RunState::default();
        self.stage_baseline = 0;
        self.goto(Screen::Home);
        Ok(())
    }

    /// Game -> Home. The stage is kept; taps follow the abandon policy.
    pub fn abandon(&mut self) -> Result<RunState, RunnerError> {
        if !matches!(self.screen, Screen::Game { .. }) {
            return Err(self.invalid(Action::Abandon));
        }
        self.run.taps = match self.abandon_policy {
            AbandonPolicy::ResetToZero => 0,
            AbandonPolicy::ResetToStageBaseline => self.stage_baseline,
        };
        self.goto(Screen::Home);
        Ok(self.run)
    }
}
