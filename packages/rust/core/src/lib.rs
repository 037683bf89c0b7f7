//! Build orchestration for buildgate.
//!
//! This crate ties together the toolchain version gate, output cleanup, the
//! engine request, and the bundling engine into one end-to-end `build` run.

pub mod clean;
pub mod engine;
pub mod gate;
pub mod pipeline;
pub mod request;

pub use clean::OutputCleaner;
pub use engine::{BundlingEngine, ProcessEngine};
pub use gate::{SystemProbe, ToolProbe, VersionRange, VersionRequirement};
pub use pipeline::{
    BuildOrchestrator, BuildOutcome, BuildState, EXIT_FAILURE, EXIT_SUCCESS, ProgressReporter,
    SilentProgress,
};
pub use request::BuildRequest;
