//! hdlforge core
//!
//! Building blocks of the HDL development console that do not spawn
//! processes:
//! - File classification into design and testbench roles
//! - The workspace store, which owns edit buffers and disk synchronization
//! - The console log sink
//! - Configuration and tracing setup

pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod log;
pub mod telemetry;
pub mod workspace;

// Re-export key types
pub use classify::classify;
pub use config::{ArtifactNames, ForgeConfig, ToolCommand, ToolName, ViewerCommands};
pub use domain::{FileId, Language, Role, SourceFile};
pub use error::{ConfigError, Result, WorkspaceError};
pub use log::{ConsoleLog, LogEntry, Severity, CONSOLE_TARGET};
pub use telemetry::{console_directives, init_tracing};
pub use workspace::{
    canonical_path, content_digest, SyncFailure, SyncReport, Template, WorkspaceState,
    WorkspaceStore,
};
