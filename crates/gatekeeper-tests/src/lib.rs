//! Workflow fixtures and helpers for Gatekeeper's end-to-end tests.
//!
//! # Usage
//!
//! ```ignore
//! use gatekeeper_tests::{WorkflowFixture, scripted_executor};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let workflow = WorkflowFixture::integration();
//!     let executor = scripted_executor(ScriptedOutcomes::default(), WorkflowFixture::config());
//!     // executor.execute(&workflow, CancelToken::never()).await
//! }
//! ```

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,gatekeeper_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}
