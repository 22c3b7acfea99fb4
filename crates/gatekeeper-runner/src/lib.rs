//! Job execution engine for Gatekeeper.

pub mod runner;
pub mod scripted;
pub mod shell;

pub use runner::{
    CancelHandle, CancelToken, JobContext, JobOutcome, JobRunner, RunnerConfig, cancel_pair,
};
pub use scripted::{ScriptedOutcomes, ScriptedRunner};
pub use shell::ShellRunner;
