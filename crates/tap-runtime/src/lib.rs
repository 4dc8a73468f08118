#![deny(warnings)]

//! Game runtime: stage state machine, run-completion rewards, outbound hooks,
//! tuning files and the [`GameSession`] that ties them to durable progress.

pub mod config;
pub mod hooks;
pub mod resolver;
pub mod runner;
pub mod session;

pub use config::{load_tuning, tuning_from_yaml, ConfigError};
pub use hooks::{AttributionSink, CappedPortal, DailyCap, Noop, RewardsPortal};
pub use resolver::{RewardResolver, RunCompletion};
pub use runner::{Action, RunnerError, Screen, StageRunner, TapOutcome};
pub use session::{GameSession, HomeStatus, SessionError};

/// Session driven by the reproducible ChaCha8 picker.
pub type SeededSession<S> = GameSession<S, rand_chacha::ChaCha8Rng>;
