//! YAML tuning files.
//!
//! A file names a base `profile` (default: production) and may override any
//! field of it:
//!
//! ```yaml
//! profile: testing
//! taps_per_stage: 10
//! resume_policy: resume_mid_run
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tap_core::{
    AbandonPolicy, GameTuningConfig, MilestoneLadder, ResumePolicy, RewardCatalog, TuningProfile,
    ValidationError, WeightTable,
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read tuning file: {0}")]
    Io(String),
    #[error("invalid tuning yaml: {0}")]
    Yaml(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TuningFile {
    profile: Option<TuningProfile>,
    total_stages: Option<u32>,
    taps_per_stage: Option<u32>,
    clear_table: Option<WeightTable>,
    character_table: Option<WeightTable>,
    ladder: Option<MilestoneLadder>,
    catalog: Option<RewardCatalog>,
    attribution_checkpoints: Option<Vec<u32>>,
    abandon_policy: Option<AbandonPolicy>,
    resume_policy: Option<ResumePolicy>,
}

impl TuningFile {
    fn into_config(self) -> GameTuningConfig {
        let mut cfg =
            GameTuningConfig::for_profile(self.profile.unwrap_or(TuningProfile::Production));
        if let Some(v) = self.total_stages {
            cfg.total_stages = v;
        }
        if let Some(v) = self.taps_per_stage {
            cfg.taps_per_stage = v;
        }
        if let Some(v) = self.clear_table {
            cfg.clear_table = v;
        }
        if let Some(v) = self.character_table {
            cfg.character_table = v;
        }
        if let Some(v) = self.ladder {
            cfg.ladder = v;
        }
        if let Some(v) = self.catalog {
            cfg.catalog = v;
        }
        if let Some(v) = self.attribution_checkpoints {
            cfg.attribution_checkpoints = v;
        }
        if let Some(v) = self.abandon_policy {
            cfg.abandon_policy = v;
        }
        if let Some(v) = self.resume_policy {
            cfg.resume_policy = v;
        }
        cfg
    }
}

/// Parse and validate tuning YAML.
pub fn tuning_from_yaml(text: &str) -> Result<GameTuningConfig, ConfigError> {
    let file: TuningFile = if text.trim().is_empty() {
        TuningFile::default()
    } else {
        serde_yaml::from_str(text).map_err(|e| ConfigError::Yaml(e.to_string()))?
    };
    let cfg = file.into_config();
    cfg.validate()?;
    Ok(cfg)
}

/// Load and validate a tuning file.
pub fn load_tuning<P: AsRef<Path>>(path: P) -> Result<GameTuningConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    let cfg = tuning_from_yaml(&text)?;
    info!(
        path = %path.display(),
        stages = cfg.total_stages,
        taps = cfg.taps_per_stage,
        milestones = cfg.ladder.len(),
        "tuning loaded"
    );
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tap_core::RewardId;

    #[test]
    fn empty_file_is_production() {
        let cfg = tuning_from_yaml("").unwrap();
        assert_eq!(cfg, GameTuningConfig::for_profile(TuningProfile::Production));
    }

    #[test]
    fn overrides_apply_on_top_of_profile() {
        let cfg = tuning_from_yaml(
            "profile: testing\ntaps_per_stage: 10\nresume_policy: resume_mid_run\nabandon_policy: reset_to_stage_baseline\n",
        )
        .unwrap();
        assert_eq!(cfg.taps_per_stage, 10);
        assert_eq!(cfg.total_stages, 6);
        assert_eq!(cfg.resume_policy, ResumePolicy::ResumeMidRun);
        assert_eq!(cfg.abandon_policy, AbandonPolicy::ResetToStageBaseline);
        assert_eq!(cfg.ladder.thresholds().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn custom_tables_are_validated() {
        let ok = tuning_from_yaml(
            "clear_table:\n  - { id: 1, weight: 0.5 }\n  - { id: 2, weight: 0.5 }\n",
        )
        .unwrap();
        assert_eq!(ok.clear_table.entries().len(), 2);
        assert!(ok.clear_table.contains(RewardId(2)));

        let err = tuning_from_yaml("ladder:\n  - { threshold: 5, reward: 201 }\n  - { threshold: 3, reward: 202 }\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(ValidationError::LadderNotIncreasing { .. })
        ));

        let err = tuning_from_yaml("taps_per_stage: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ValidationError::ZeroTapsPerStage)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            tuning_from_yaml("tap_goal: 3\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn bundled_tuning_files_load() {
        let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../assets/tuning");
        let testing = load_tuning(root.join("testing.yaml")).unwrap();
        assert_eq!(testing.ladder.thresholds().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        let production = load_tuning(root.join("production.yaml")).unwrap();
        assert_eq!(
            production.ladder.thresholds().collect::<Vec<_>>(),
            vec![50, 100, 150, 200]
        );
    }
}
