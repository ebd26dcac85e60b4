//! hdlforge toolchain - drives the external HDL toolchain
//!
//! Provides the toolchain orchestrator that:
//! - Orders requested stages (compile, simulate, lint, synthesize,
//!   schematic, waveform) against a static dependency table
//! - Runs each stage as out-of-process tool invocations with a hard timeout
//! - Verifies produced artifacts before trusting a zero exit code
//! - Reports every step to the console log

pub mod command;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod registry;
pub mod runner;
pub mod session;
pub mod stage;
pub mod viewer;

// Re-export key types
pub use command::{Placeholders, StagePlan, Step};
pub use error::RunError;
pub use pipeline::{CancelHandle, Orchestrator, PipelineRun, SkipReason, StageOutcome, StageReport};
pub use plan::execution_order;
pub use registry::{resolve_program, ToolAvailability, ToolRegistry};
pub use runner::{
    CompletedInvocation, InvocationResult, InvocationStatus, ProcessRunner, Runner, ToolInvocation,
    SENTINEL_EXIT_CODE,
};
pub use session::Console;
pub use stage::{ArtifactKind, ArtifactRecord, Stage};
pub use viewer::{open_external, ViewTarget};
