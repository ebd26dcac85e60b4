//! Console session: the boundary a UI (or the CLI) drives.
//!
//! A [`Console`] owns the workspace, the log and the orchestrator for one
//! session. UI events come in as method calls; results go back out as log
//! entries, classification results and artifact paths. Every error is
//! written to the log before it is returned.

use hdlforge_core::{
    ConsoleLog, FileId, ForgeConfig, Language, LogEntry, Role, SourceFile, Template,
    WorkspaceError, WorkspaceState,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::RunError;
use crate::pipeline::{CancelHandle, Orchestrator, PipelineRun};
use crate::registry::ToolAvailability;
use crate::runner::Runner;
use crate::stage::{ArtifactRecord, Stage};
use crate::viewer::{self, ViewTarget};

/// One console session.
pub struct Console {
    state: WorkspaceState,
    log: ConsoleLog,
    orchestrator: Orchestrator,
}

impl Console {
    /// Start a session and log which tools are available.
    pub fn new(config: ForgeConfig) -> Self {
        let log = ConsoleLog::new();
        let orchestrator = Orchestrator::new(Arc::new(config), log.clone());
        let console = Self {
            state: WorkspaceState::new(),
            log,
            orchestrator,
        };
        console.log_tool_probe();
        console
    }

    /// Replace the process runner.
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.orchestrator = self.orchestrator.with_runner(runner);
        self
    }

    pub fn config(&self) -> &ForgeConfig {
        self.orchestrator.config()
    }

    pub fn state(&self) -> &WorkspaceState {
        &self.state
    }

    pub fn probe_tools(&self) -> Vec<ToolAvailability> {
        self.orchestrator.registry().probe()
    }

    fn log_tool_probe(&self) {
        for tool in self.probe_tools() {
            match &tool.resolved {
                Some(path) => self
                    .log
                    .success(format!("✓ {} found: {}", tool.tool, path.display())),
                None => self
                    .log
                    .error(format!("✗ {} not found ({})", tool.tool, tool.program)),
            }
        }
    }

    fn logged<T>(&self, result: Result<T, WorkspaceError>) -> Result<T, WorkspaceError> {
        if let Err(e) = &result {
            self.log.error(e.to_string());
        }
        result
    }

    /// Open a file picked by the user. Returns its role.
    pub fn on_file_selected(&mut self, path: &Path) -> Result<Role, WorkspaceError> {
        let opened = self.orchestrator.store().open(&mut self.state, path);
        let id = self.logged(opened)?;
        let role = self.state.get(id).map_or(Role::Design, |f| f.role);
        self.log.info(format!("Loaded {} as {role}", path.display()));
        Ok(role)
    }

    /// Replace the buffer of the active file for `role`.
    pub fn on_buffer_edited(
        &mut self,
        role: Role,
        text: impl Into<String>,
    ) -> Result<(), WorkspaceError> {
        let edited = self.orchestrator.store().edit(&mut self.state, role, text);
        self.logged(edited)
    }

    /// Synchronize and run the requested stages.
    pub async fn on_pipeline_requested(
        &mut self,
        stages: &[Stage],
    ) -> Result<PipelineRun, RunError> {
        self.orchestrator.run(&mut self.state, stages).await
    }

    /// Start an unsaved buffer for `role`.
    pub fn new_scratch(&mut self, role: Role, language: Language) -> FileId {
        let id = self.orchestrator.store().scratch(&mut self.state, role, language);
        self.log.info(format!("New untitled {role} buffer"));
        id
    }

    pub fn create_file(&mut self, path: &Path, template: Template) -> Result<Role, WorkspaceError> {
        let created = self.orchestrator.store().create(&mut self.state, path, template);
        let id = self.logged(created)?;
        let role = self.state.get(id).map_or(Role::Design, |f| f.role);
        self.log.success(format!(
            "Created {} from {template} template ({role})",
            path.display()
        ));
        Ok(role)
    }

    pub fn rename_file(&mut self, old: &Path, new_name: &str) -> Result<PathBuf, WorkspaceError> {
        let renamed = self.orchestrator.store().rename(&mut self.state, old, new_name);
        let new_path = self.logged(renamed)?;
        self.log.success(format!(
            "Renamed {} to {}",
            old.display(),
            new_path.display()
        ));
        Ok(new_path)
    }

    pub fn delete_file(&mut self, path: &Path) -> Result<(), WorkspaceError> {
        let deleted = self.orchestrator.store().delete(&mut self.state, path);
        self.logged(deleted)?;
        self.log.success(format!("Deleted {}", path.display()));
        Ok(())
    }

    pub fn save(&mut self, role: Role) -> Result<PathBuf, WorkspaceError> {
        let saved = self.orchestrator.store().save(&mut self.state, role);
        let path = self.logged(saved)?;
        self.log.success(format!("Saved {}", path.display()));
        Ok(path)
    }

    /// Save every file with a path. Returns the failures, each already logged.
    pub fn save_all(&mut self) -> Vec<WorkspaceError> {
        let failures = self.orchestrator.store().save_all(&mut self.state);
        for e in &failures {
            self.log.error(e.to_string());
        }
        if failures.is_empty() {
            self.log.success("All files saved");
        }
        failures
    }

    /// Manually assign a role; authoritative until [`Console::reclassify`].
    pub fn set_role(&mut self, id: FileId, role: Role) -> Result<(), WorkspaceError> {
        let set = self.orchestrator.store().set_role(&mut self.state, id, role);
        self.logged(set)?;
        self.log.info(format!("{id} set as {role}"));
        Ok(())
    }

    pub fn reclassify(&mut self, id: FileId) -> Result<Role, WorkspaceError> {
        let role = self.orchestrator.store().reclassify(&mut self.state, id);
        let role = self.logged(role)?;
        self.log.info(format!("{id} classified as {role}"));
        Ok(role)
    }

    /// Launch an external viewer on the artifact verified in this session.
    ///
    /// Returns whether a process was spawned.
    pub fn open_external(&self, target: ViewTarget) -> bool {
        let artifact = self.orchestrator.artifact(target.artifact_kind());
        viewer::open_external(
            self.orchestrator.config(),
            &self.log,
            target,
            artifact.as_ref(),
        )
    }

    pub fn active_slot(&self, role: Role) -> Option<&SourceFile> {
        self.state.active(role)
    }

    /// Verified artifacts still present on disk.
    pub fn artifacts(&self) -> Vec<ArtifactRecord> {
        self.orchestrator.artifacts()
    }

    pub fn log(&self) -> &ConsoleLog {
        &self.log
    }

    pub fn log_snapshot(&self) -> Vec<LogEntry> {
        self.log.snapshot()
    }

    pub fn drain_log(&self) -> Vec<LogEntry> {
        self.log.drain()
    }

    pub fn clear_log(&self) {
        self.log.clear();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.orchestrator.cancel_handle()
    }
}
