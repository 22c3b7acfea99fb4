//! Gatekeeper Core
//!
//! Core domain types, the expression engine and the aggregation gate.
//! This crate has no async runtime dependency and defines the shared
//! vocabulary used by the scheduler, the runners and the CLI.

pub mod error;
pub mod expression;
pub mod gate;
pub mod ids;
pub mod inputs;
pub mod result;
pub mod run;
pub mod workflow;

pub use error::{Error, Result};
pub use ids::*;
pub use result::{JobGroup, JobResult, VariantOutcome};
