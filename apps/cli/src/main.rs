#![deny(warnings)]

//! Headless driver: plays complete runs through a game session and reports
//! progress, milestones and unlocks.

use anyhow::{bail, Context, Result};
use persistence::{FileStore, KeyValueStore, MemoryStore, ProgressStore};
use std::path::PathBuf;
use tap_core::{GameTuningConfig, RewardKind, TuningProfile};
use tap_picker::WeightedPicker;
use tap_runtime::{
    load_tuning, AttributionSink, CappedPortal, RewardResolver, RewardsPortal, SeededSession,
    TapOutcome,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Args {
    profile: Option<TuningProfile>,
    tuning: Option<PathBuf>,
    runs: u32,
    seed: Option<u64>,
    save: Option<PathBuf>,
    namespace: String,
    claim: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(argv: I) -> Result<Option<Args>> {
    let mut args = Args {
        profile: None,
        tuning: None,
        runs: 1,
        seed: None,
        save: None,
        namespace: "tap".to_string(),
        claim: false,
    };
    let mut it = argv.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--profile" => {
                let v = it.next().context("--profile needs a value")?;
                args.profile = Some(v.parse()?);
            }
            "--tuning" => {
                args.tuning = Some(PathBuf::from(it.next().context("--tuning needs a path")?))
            }
            "--runs" => {
                let v = it.next().context("--runs needs a value")?;
                args.runs = v.parse().with_context(|| format!("bad --runs {v:?}"))?;
            }
            "--seed" => {
                let v = it.next().context("--seed needs a value")?;
                args.seed = Some(v.parse().with_context(|| format!("bad --seed {v:?}"))?);
            }
            "--save" => args.save = Some(PathBuf::from(persistence::default_save_path())),
            "--save-to" => {
                args.save = Some(PathBuf::from(it.next().context("--save-to needs a path")?))
            }
            "--namespace" => args.namespace = it.next().context("--namespace needs a value")?,
            "--claim" => args.claim = true,
            "--version" => {
                println!(
                    "tap-loop {} ({} {})",
                    env!("CARGO_PKG_VERSION"),
                    env!("TAP_GIT_SHA"),
                    env!("TAP_BUILD_DATE")
                );
                return Ok(None);
            }
            other => bail!("unknown argument {other:?}"),
        }
    }
    if args.profile.is_some() && args.tuning.is_some() {
        bail!("--profile and --tuning are exclusive; set `profile:` inside the tuning file");
    }
    Ok(Some(args))
}

/// Attribution sink that reports checkpoints to the log.
struct LogAttribution;

impl AttributionSink for LogAttribution {
    fn on_run_completed(&mut self, total_runs: u32) {
        info!(total_runs, "attribution checkpoint");
    }
}

struct LogPortal;

impl RewardsPortal for LogPortal {
    fn log_action(&mut self, total_runs: u32) {
        info!(total_runs, "rewards portal action");
    }
}

fn open_store(args: &Args) -> Result<Box<dyn KeyValueStore>> {
    Ok(match &args.save {
        Some(path) => Box::new(
            FileStore::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(MemoryStore::new()),
    })
}

fn play_run<S: KeyValueStore>(session: &mut SeededSession<S>) -> Result<()> {
    session.play()?;
    loop {
        match session.tap()? {
            TapOutcome::Counted { .. } => {}
            TapOutcome::StageCleared { .. } => {
                session.advance()?;
            }
            TapOutcome::RunCleared => break,
            TapOutcome::Ignored => bail!("tap ignored on {:?}", session.screen()),
        }
    }
    if let Some(done) = session.last_completion() {
        let asset = session.asset(done.cosmetic).unwrap_or("?");
        println!(
            "run {:>4} | clear {} ({}){} | pending milestones: {:?}",
            done.total_runs,
            done.cosmetic,
            asset,
            if done.first_unlock { " NEW" } else { "" },
            done.pending_claims.iter().map(|m| m.threshold).collect::<Vec<_>>()
        );
    }
    session.finish()?;
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let Some(args) = parse_args(std::env::args().skip(1))? else {
        return Ok(());
    };
    info!(?args, "starting tap-loop");

    let config = match &args.tuning {
        Some(path) => load_tuning(path)?,
        None => GameTuningConfig::for_profile(args.profile.unwrap_or(TuningProfile::Testing)),
    };
    let picker = match args.seed {
        Some(seed) => WeightedPicker::seeded(seed),
        None => WeightedPicker::from_entropy(),
    };
    let resolver = RewardResolver::new(
        Box::new(LogAttribution),
        Box::new(CappedPortal::new(LogPortal, 10)),
    );
    let store = ProgressStore::new(open_store(&args)?, args.namespace.clone());
    let mut session = SeededSession::open(config, store, picker, resolver)?;

    session.start()?;
    if let Some(character) = session.character() {
        info!(%character, asset = session.asset(character).unwrap_or("?"), "home character");
    }
    for _ in 0..args.runs {
        play_run(&mut session)?;
        if let Some(w) = session.take_save_warning() {
            warn!("{w}");
        }
    }

    if args.claim {
        while let Ok(claimed) = session.claim_next() {
            println!(
                "claimed milestone {} -> {} ({})",
                claimed.threshold,
                claimed.reward,
                session.asset(claimed.reward).unwrap_or("?")
            );
        }
        if let Some(w) = session.take_save_warning() {
            warn!("{w}");
        }
    }

    println!("{}", serde_json::to_string_pretty(&session.status())?);
    let catalog = &session.config().catalog;
    let record = session.record();
    for kind in [RewardKind::Clear, RewardKind::Character, RewardKind::Milestone] {
        let (owned, total) = catalog
            .ids_of_kind(kind)
            .fold((0, 0), |(owned, total), id| {
                (owned + usize::from(record.is_unlocked(id)), total + 1)
            });
        println!("{kind:?}: {owned}/{total} unlocked");
    }
    println!(
        "claimed: {:?} | haptics: {}",
        record.claimed_milestones(),
        record.haptics_enabled()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Args>> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn flags_parse() {
        let args = parse(&["--profile", "prod", "--runs", "3", "--seed", "9", "--claim"])
            .unwrap()
            .unwrap();
        assert_eq!(args.profile, Some(TuningProfile::Production));
        assert_eq!(args.runs, 3);
        assert_eq!(args.seed, Some(9));
        assert!(args.claim);
        assert!(args.save.is_none());
    }

    #[test]
    fn missing_values_are_errors() {
        for flag in ["--tuning", "--profile", "--runs", "--seed", "--namespace", "--save-to"] {
            assert!(parse(&[flag]).is_err(), "{flag} without a value");
        }
    }

    #[test]
    fn profile_and_tuning_are_exclusive() {
        assert!(parse(&["--profile", "testing", "--tuning", "t.yaml"]).is_err());
        let args = parse(&["--tuning", "t.yaml"]).unwrap().unwrap();
        assert_eq!(args.tuning, Some(PathBuf::from("t.yaml")));
    }
}
