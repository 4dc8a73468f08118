#![deny(warnings)]

//! Core domain models and invariants for the tap loop.
//!
//! This crate defines the serializable types shared by every other crate in the
//! workspace (run state, durable progress, milestone ladder, weight tables and the
//! reward catalog) together with validation helpers for their invariants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Opaque identifier of a catalog entry: a clear image, a character or a
/// milestone reward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub u32);

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a catalog entry is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Background shown on the clear screen, drawn on every run completion.
    Clear,
    /// Home-screen character, drawn on every arrival at home.
    Character,
    /// Special reward granted by claiming a milestone.
    Milestone,
}

/// Catalog entry mapping an id to its presentation asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Identifier referenced by weight tables and the milestone ladder.
    pub id: RewardId,
    /// Display asset name, e.g. "Clear_01".
    pub asset: String,
    /// Usage of the entry.
    pub kind: RewardKind,
}

/// Lookup table from reward ids to display assets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardCatalog {
    entries: Vec<CatalogEntry>,
}

impl RewardCatalog {
    /// Build a catalog, rejecting duplicate ids.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, ValidationError> {
        let catalog = Self { entries };
        validate_catalog(&catalog)?;
        Ok(catalog)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, id: RewardId) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Asset name for `id`, if cataloged.
    pub fn asset(&self, id: RewardId) -> Option<&str> {
        self.get(id).map(|e| e.asset.as_str())
    }

    /// Ids of the given kind, in catalog order.
    pub fn ids_of_kind(&self, kind: RewardKind) -> impl Iterator<Item = RewardId> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.kind == kind)
            .map(|e| e.id)
    }
}

/// One `(identifier, weight)` pair of a weight table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub id: RewardId,
    /// Relative weight (>= 0). Weights need not sum to 1.
    pub weight: f64,
}

/// Static list of weighted identifiers used for a single draw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightTable {
    entries: Vec<WeightEntry>,
}

impl WeightTable {
    /// Build a table with at least one entry and finite, non-negative weights.
    pub fn new(entries: Vec<WeightEntry>) -> Result<Self, ValidationError> {
        let table = Self { entries };
        validate_weight_table(&table)?;
        Ok(table)
    }

    pub fn entries(&self) -> &[WeightEntry] {
        &self.entries
    }

    pub fn contains(&self, id: RewardId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Sum of the positive weights.
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight.max(0.0)).sum()
    }
}

/// A cumulative-run threshold and the reward it grants once claimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Number of completed runs required (> 0).
    pub threshold: u32,
    pub reward: RewardId,
}

/// Strictly increasing list of milestones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilestoneLadder {
    rungs: Vec<Milestone>,
}

impl MilestoneLadder {
    pub fn new(rungs: Vec<Milestone>) -> Result<Self, ValidationError> {
        let ladder = Self { rungs };
        validate_ladder(&ladder)?;
        Ok(ladder)
    }

    /// Milestones in ascending threshold order.
    pub fn rungs(&self) -> &[Milestone] {
        &self.rungs
    }

    pub fn thresholds(&self) -> impl Iterator<Item = u32> + '_ {
        self.rungs.iter().map(|m| m.threshold)
    }

    /// Milestone with exactly this threshold.
    pub fn get(&self, threshold: u32) -> Option<&Milestone> {
        self.rungs
            .binary_search_by_key(&threshold, |m| m.threshold)
            .ok()
            .map(|i| &self.rungs[i])
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }
}

/// Progression within a single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Current stage, 1-based.
    pub stage: u32,
    /// Taps counted in the current stage.
    pub taps: u32,
}

impl Default for RunState {
    fn default() -> Self {
        Self { stage: 1, taps: 0 }
    }
}

/// Durable, cross-run progress. Counters only grow; sets never shrink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    total_runs: u32,
    unlocked_rewards: BTreeSet<RewardId>,
    claimed_milestones: BTreeSet<u32>,
    saved_run: Option<RunState>,
    haptics_enabled: bool,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            total_runs: 0,
            unlocked_rewards: BTreeSet::new(),
            claimed_milestones: BTreeSet::new(),
            saved_run: None,
            haptics_enabled: true,
        }
    }
}

impl ProgressRecord {
    /// Zero-valued record used at first launch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassemble a record from persisted parts. Use [`validate_progress`] to
    /// check it against a ladder.
    pub fn from_parts(
        total_runs: u32,
        unlocked_rewards: BTreeSet<RewardId>,
        claimed_milestones: BTreeSet<u32>,
        saved_run: Option<RunState>,
        haptics_enabled: bool,
    ) -> Self {
        Self {
            total_runs,
            unlocked_rewards,
            claimed_milestones,
            saved_run,
            haptics_enabled,
        }
    }

    pub fn total_runs(&self) -> u32 {
        self.total_runs
    }

    pub fn unlocked_rewards(&self) -> &BTreeSet<RewardId> {
        &self.unlocked_rewards
    }

    pub fn claimed_milestones(&self) -> &BTreeSet<u32> {
        &self.claimed_milestones
    }

    pub fn saved_run(&self) -> Option<RunState> {
        self.saved_run
    }

    pub fn haptics_enabled(&self) -> bool {
        self.haptics_enabled
    }

    pub fn is_unlocked(&self, id: RewardId) -> bool {
        self.unlocked_rewards.contains(&id)
    }

    pub fn is_claimed(&self, threshold: u32) -> bool {
        self.claimed_milestones.contains(&threshold)
    }

    /// Count one completed run and return the new total.
    pub fn record_completed_run(&mut self) -> u32 {
        self.total_runs = self.total_runs.saturating_add(1);
        self.total_runs
    }

    /// Unlock a reward. Returns `true` if it was not unlocked before.
    pub fn unlock(&mut self, id: RewardId) -> bool {
        let fresh = self.unlocked_rewards.insert(id);
        if fresh {
            debug!(%id, "reward unlocked");
        }
        fresh
    }

    /// Record a milestone as claimed. Eligibility is the caller's job; prefer
    /// the milestone engine's `claim`.
    pub fn mark_claimed(&mut self, threshold: u32) -> bool {
        self.claimed_milestones.insert(threshold)
    }

    pub fn set_saved_run(&mut self, run: Option<RunState>) {
        self.saved_run = run;
    }

    pub fn set_haptics_enabled(&mut self, enabled: bool) {
        self.haptics_enabled = enabled;
    }
}

/// What "abandon to home" does with the tap count of the current stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonPolicy {
    #[default]
    ResetToZero,
    /// Restore the tap count held when the stage was entered.
    ResetToStageBaseline,
}

/// Whether an interrupted run survives an app restart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    #[default]
    RestartAtStageOne,
    ResumeMidRun,
}

/// Built-in tuning profiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningProfile {
    /// Tiny milestone ladder for manual testing.
    Testing,
    Production,
}

impl FromStr for TuningProfile {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "testing" | "test" => Ok(TuningProfile::Testing),
            "production" | "prod" => Ok(TuningProfile::Production),
            other => Err(ValidationError::UnknownProfile(other.to_string())),
        }
    }
}

/// All tuning knobs of a build: stage goals, weight tables, ladder, catalog
/// and policies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameTuningConfig {
    /// Stages per run (>= 1).
    pub total_stages: u32,
    /// Taps needed to clear a stage (>= 1).
    pub taps_per_stage: u32,
    /// Weighted clear backgrounds drawn on each run completion.
    pub clear_table: WeightTable,
    /// Weighted home-screen characters.
    pub character_table: WeightTable,
    pub ladder: MilestoneLadder,
    pub catalog: RewardCatalog,
    /// Totals at which the attribution collaborator is notified.
    #[serde(default)]
    pub attribution_checkpoints: Vec<u32>,
    #[serde(default)]
    pub abandon_policy: AbandonPolicy,
    #[serde(default)]
    pub resume_policy: ResumePolicy,
}

const CLEAR_WEIGHTS: [f64; 5] = [0.75, 0.15, 0.035, 0.0132, 0.0018];
const CHARACTER_WEIGHTS: [f64; 6] = [0.3, 0.25, 0.2, 0.12, 0.08, 0.05];
const CLEAR_BASE: u32 = 1;
const CHARACTER_BASE: u32 = 101;
const MILESTONE_BASE: u32 = 201;

impl GameTuningConfig {
    /// Built-in tuning for a profile. Both profiles share stage goals, tables
    /// and catalog; they differ in ladder and attribution checkpoints.
    pub fn for_profile(profile: TuningProfile) -> Self {
        let (thresholds, checkpoints): ([u32; 4], Vec<u32>) = match profile {
            TuningProfile::Testing => ([1, 2, 3, 4], vec![1, 2, 3, 4]),
            TuningProfile::Production => ([50, 100, 150, 200], vec![1, 50, 100, 150]),
        };

        let mut catalog = Vec::new();
        let clear_table = weighted(&CLEAR_WEIGHTS, CLEAR_BASE);
        for (i, e) in clear_table.iter().enumerate() {
            catalog.push(CatalogEntry {
                id: e.id,
                asset: format!("Clear_{:02}", i + 1),
                kind: RewardKind::Clear,
            });
        }
        let character_table = weighted(&CHARACTER_WEIGHTS, CHARACTER_BASE);
        for (i, e) in character_table.iter().enumerate() {
            catalog.push(CatalogEntry {
                id: e.id,
                asset: format!("Ilustrated_{:02}", i + 1),
                kind: RewardKind::Character,
            });
        }
        let mut rungs = Vec::with_capacity(thresholds.len());
        for (i, threshold) in thresholds.into_iter().enumerate() {
            let id = RewardId(MILESTONE_BASE + i as u32);
            catalog.push(CatalogEntry {
                id,
                asset: format!("Ilustrated_{:02}", CHARACTER_WEIGHTS.len() + i + 1),
                kind: RewardKind::Milestone,
            });
            rungs.push(Milestone {
                threshold,
                reward: id,
            });
        }

        Self {
            total_stages: 6,
            taps_per_stage: 50,
            clear_table: WeightTable {
                entries: clear_table,
            },
            character_table: WeightTable {
                entries: character_table,
            },
            ladder: MilestoneLadder { rungs },
            catalog: RewardCatalog { entries: catalog },
            attribution_checkpoints: checkpoints,
            abandon_policy: AbandonPolicy::default(),
            resume_policy: ResumePolicy::default(),
        }
    }

    /// Validate every invariant, including cross-references into the catalog.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.total_stages == 0 {
            return Err(ValidationError::ZeroStages);
        }
        if self.taps_per_stage == 0 {
            return Err(ValidationError::ZeroTapsPerStage);
        }
        validate_catalog(&self.catalog)?;
        validate_weight_table(&self.clear_table)?;
        validate_weight_table(&self.character_table)?;
        validate_ladder(&self.ladder)?;
        for e in self.clear_table.entries() {
            expect_kind(&self.catalog, e.id, RewardKind::Clear)?;
        }
        for e in self.character_table.entries() {
            expect_kind(&self.catalog, e.id, RewardKind::Character)?;
        }
        for m in self.ladder.rungs() {
            expect_kind(&self.catalog, m.reward, RewardKind::Milestone)?;
        }
        Ok(())
    }
}

fn weighted(weights: &[f64], base: u32) -> Vec<WeightEntry> {
    weights
        .iter()
        .enumerate()
        .map(|(i, &weight)| WeightEntry {
            id: RewardId(base + i as u32),
            weight,
        })
        .collect()
}

fn expect_kind(
    catalog: &RewardCatalog,
    id: RewardId,
    expected: RewardKind,
) -> Result<(), ValidationError> {
    match catalog.get(id) {
        None => Err(ValidationError::UnknownReward(id)),
        Some(e) if e.kind != expected => Err(ValidationError::WrongRewardKind { id, expected }),
        Some(_) => Ok(()),
    }
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A weight table needs at least one entry.
    #[error("weight table is empty")]
    EmptyWeightTable,
    /// Weights must be finite and non-negative.
    #[error("invalid weight {weight} for reward {id}")]
    InvalidWeight { id: RewardId, weight: f64 },
    /// Milestone thresholds must be positive.
    #[error("milestone threshold must be > 0")]
    ZeroThreshold,
    /// Milestone thresholds must strictly increase.
    #[error("milestone ladder not strictly increasing: {previous} then {next}")]
    LadderNotIncreasing { previous: u32, next: u32 },
    #[error("a run needs at least one stage")]
    ZeroStages,
    #[error("a stage needs a tap goal of at least one")]
    ZeroTapsPerStage,
    /// Referenced id missing from the catalog.
    #[error("reward {0} is not in the catalog")]
    UnknownReward(RewardId),
    #[error("reward {0} appears twice in the catalog")]
    DuplicateReward(RewardId),
    #[error("reward {id} is not a {expected:?} entry")]
    WrongRewardKind { id: RewardId, expected: RewardKind },
    #[error("stage {stage} outside 1..={total}")]
    StageOutOfRange { stage: u32, total: u32 },
    #[error("tap count {taps} exceeds goal {goal}")]
    TapsOutOfRange { taps: u32, goal: u32 },
    /// Claimed milestone not in the ladder.
    #[error("milestone {0} is not in the ladder")]
    UnknownMilestone(u32),
    /// A milestone cannot be claimed before it is reached.
    #[error("milestone {threshold} claimed with only {total_runs} runs")]
    ClaimedBeforeReached { threshold: u32, total_runs: u32 },
    #[error("unknown tuning profile: {0}")]
    UnknownProfile(String),
}

/// Validate a weight table.
pub fn validate_weight_table(table: &WeightTable) -> Result<(), ValidationError> {
    if table.entries.is_empty() {
        return Err(ValidationError::EmptyWeightTable);
    }
    for e in &table.entries {
        if !e.weight.is_finite() || e.weight < 0.0 {
            return Err(ValidationError::InvalidWeight {
                id: e.id,
                weight: e.weight,
            });
        }
    }
    Ok(())
}

/// Validate that thresholds are positive and strictly increasing.
pub fn validate_ladder(ladder: &MilestoneLadder) -> Result<(), ValidationError> {
    let mut previous: Option<u32> = None;
    for m in &ladder.rungs {
        if m.threshold == 0 {
            return Err(ValidationError::ZeroThreshold);
        }
        if let Some(p) = previous {
            if m.threshold <= p {
                return Err(ValidationError::LadderNotIncreasing {
                    previous: p,
                    next: m.threshold,
                });
            }
        }
        previous = Some(m.threshold);
    }
    Ok(())
}

/// Validate that catalog ids are unique.
pub fn validate_catalog(catalog: &RewardCatalog) -> Result<(), ValidationError> {
    let mut seen = BTreeSet::new();
    for e in &catalog.entries {
        if !seen.insert(e.id) {
            return Err(ValidationError::DuplicateReward(e.id));
        }
    }
    Ok(())
}

/// Validate a run state against stage bounds.
pub fn validate_run_state(
    run: &RunState,
    total_stages: u32,
    taps_per_stage: u32,
) -> Result<(), ValidationError> {
    if run.stage == 0 || run.stage > total_stages {
        return Err(ValidationError::StageOutOfRange {
            stage: run.stage,
            total: total_stages,
        });
    }
    if run.taps > taps_per_stage {
        return Err(ValidationError::TapsOutOfRange {
            taps: run.taps,
            goal: taps_per_stage,
        });
    }
    Ok(())
}

/// Validate that every claimed milestone exists and has been reached.
pub fn validate_progress(
    record: &ProgressRecord,
    ladder: &MilestoneLadder,
) -> Result<(), ValidationError> {
    for &threshold in &record.claimed_milestones {
        if ladder.get(threshold).is_none() {
            return Err(ValidationError::UnknownMilestone(threshold));
        }
        if record.total_runs < threshold {
            return Err(ValidationError::ClaimedBeforeReached {
                threshold,
                total_runs: record.total_runs,
            });
        }
    }
    Ok(())
}
