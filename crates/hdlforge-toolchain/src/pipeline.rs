//! Toolchain orchestration.
//!
//! A run synchronizes the workspace, orders the requested stages against
//! the static dependency table, and executes each stage as one or more
//! out-of-process invocations. Every stage ends in exactly one
//! [`StageOutcome`]; a zero exit code only counts as success once the
//! stage's declared artifacts are verified on disk. Everything the run does
//! is written to the [`ConsoleLog`].

use chrono::{DateTime, Utc};
use hdlforge_core::{
    ConsoleLog, ForgeConfig, Role, SyncReport, ToolName, WorkspaceState, WorkspaceStore,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::command::StagePlan;
use crate::error::RunError;
use crate::plan::execution_order;
use crate::registry::ToolRegistry;
use crate::runner::{CompletedInvocation, InvocationStatus, ProcessRunner, Runner, ToolInvocation};
use crate::stage::{ArtifactKind, ArtifactRecord, Stage};

/// Why a stage was not attempted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The prerequisite was not requested and has no prior success against
    /// the current synchronized sources.
    MissingDependency { stage: Stage },

    /// The prerequisite ran in this pipeline and did not succeed.
    DependencyFailed { stage: Stage },

    NoActiveFile { role: Role },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingDependency { stage } => {
                write!(f, "requires a successful {stage} of the current sources")
            }
            SkipReason::DependencyFailed { stage } => write!(f, "{stage} did not succeed"),
            SkipReason::NoActiveFile { role } => write!(f, "no active {role} file"),
        }
    }
}

/// Terminal result of one stage.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    NonZeroExit { tool: ToolName, exit_code: i32 },
    TimedOut { tool: ToolName, timeout_secs: u64 },
    ToolNotFound { tool: ToolName, program: String },
    ArtifactMissing { artifact: ArtifactKind, path: PathBuf },
    SpawnFailed { tool: ToolName, message: String },
    Skipped { skip: SkipReason },
    Cancelled,
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success)
    }

    /// Whether the stage was never attempted.
    pub fn is_skipped(&self) -> bool {
        matches!(self, StageOutcome::Skipped { .. } | StageOutcome::Cancelled)
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Success => f.write_str("succeeded"),
            StageOutcome::NonZeroExit { tool, exit_code } => {
                write!(f, "{tool} tool exited with code {exit_code}")
            }
            StageOutcome::TimedOut { tool, timeout_secs } => {
                write!(f, "{tool} tool timed out after {timeout_secs}s")
            }
            StageOutcome::ToolNotFound { tool, program } => {
                write!(f, "{tool} tool not found ({program})")
            }
            StageOutcome::ArtifactMissing { artifact, path } => {
                write!(f, "expected {artifact} was not produced at {}", path.display())
            }
            StageOutcome::SpawnFailed { tool, message } => {
                write!(f, "could not start {tool} tool: {message}")
            }
            StageOutcome::Skipped { skip } => write!(f, "skipped: {skip}"),
            StageOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of one stage in a run.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,

    pub outcome: StageOutcome,

    /// Invocations actually executed, in order.
    pub invocations: Vec<CompletedInvocation>,

    /// Artifacts verified after success.
    pub artifacts: Vec<ArtifactRecord>,

    pub duration_ms: u64,
}

impl StageReport {
    fn not_run(stage: Stage, outcome: StageOutcome) -> Self {
        Self {
            stage,
            outcome,
            invocations: Vec::new(),
            artifacts: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,

    pub started_at: DateTime<Utc>,

    /// Stages as requested, before ordering.
    pub requested: Vec<Stage>,

    /// Digest of the synchronized sources the run operated on.
    pub sources_digest: String,

    /// Stage results in execution order.
    pub stages: Vec<StageReport>,

    pub duration_ms: u64,
}

impl PipelineRun {
    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.report(stage).map(|r| &r.outcome)
    }

    /// Whether every requested stage succeeded.
    pub fn success(&self) -> bool {
        self.stages.iter().all(|r| r.outcome.is_success())
    }

    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|r| r.outcome.is_success()).count()
    }

    /// Number of stages that were attempted and failed.
    pub fn failed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|r| !r.outcome.is_success() && !r.outcome.is_skipped())
            .count()
    }

    /// Number of stages skipped or cancelled.
    pub fn skipped_count(&self) -> usize {
        self.stages.iter().filter(|r| r.outcome.is_skipped()).count()
    }
}

/// Requests cancellation of the remaining stages of the current run.
///
/// Invocations already started run to completion or timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Clears the in-progress flag when the run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Toolchain orchestrator.
pub struct Orchestrator {
    config: Arc<ForgeConfig>,
    store: WorkspaceStore,
    registry: ToolRegistry,
    runner: Arc<dyn Runner>,
    log: ConsoleLog,
    running: AtomicBool,
    cancel: CancelHandle,
    /// Last sources digest each stage succeeded against.
    satisfied: Mutex<HashMap<Stage, String>>,
    /// Latest verified artifact of each kind.
    artifacts: Mutex<BTreeMap<ArtifactKind, ArtifactRecord>>,
}

impl Orchestrator {
    pub fn new(config: Arc<ForgeConfig>, log: ConsoleLog) -> Self {
        Self {
            store: WorkspaceStore::new(config.clone()),
            registry: ToolRegistry::new(config.clone()),
            config,
            runner: Arc::new(ProcessRunner),
            log,
            running: AtomicBool::new(false),
            cancel: CancelHandle::default(),
            satisfied: Mutex::new(HashMap::new()),
            artifacts: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replace the process runner.
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Latest verified artifacts that are still on disk.
    pub fn artifacts(&self) -> Vec<ArtifactRecord> {
        lock(&self.artifacts)
            .values()
            .filter(|a| a.exists())
            .cloned()
            .collect()
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<ArtifactRecord> {
        lock(&self.artifacts).get(&kind).filter(|a| a.exists()).cloned()
    }

    /// Synchronize the workspace and run the requested stages.
    ///
    /// Fails without invoking any tool when another run is in progress,
    /// when nothing is open, or when synchronization fails. Stage failures
    /// are reported in the returned [`PipelineRun`], not as errors.
    pub async fn run(
        &self,
        state: &mut WorkspaceState,
        requested: &[Stage],
    ) -> Result<PipelineRun, RunError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            self.log.error("A pipeline run is already in progress");
            return Err(RunError::RunInProgress);
        };
        self.cancel.reset();

        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let order = execution_order(requested);
        info!(run_id = %run_id, stages = ?order, "starting pipeline");

        if state.active(Role::Design).is_none() && state.active(Role::Testbench).is_none() {
            self.log.error("Nothing to run: open a design or testbench first");
            return Err(RunError::NoActiveFile(Role::Design));
        }

        let sync = self.store.synchronize(state);
        for role in &sync.unsaved {
            self.log
                .warning(format!("Active {role} buffer has no file; used for elaboration only"));
        }
        if !sync.is_ok() {
            for failure in &sync.failures {
                self.log.error(format!(
                    "Failed to write {}: {}",
                    failure.path.display(),
                    failure.error
                ));
            }
            self.log.error("Synchronization failed; no tools were run");
            warn!(run_id = %run_id, failures = sync.failures.len(), "pipeline aborted");
            return Err(RunError::SyncFailed(sync));
        }
        self.log.success("Files synchronized");

        let mut reports: Vec<StageReport> = Vec::with_capacity(order.len());
        for stage in order {
            let report = if self.cancel.is_cancelled() {
                self.log.warning(format!("{} cancelled", stage.title()));
                StageReport::not_run(stage, StageOutcome::Cancelled)
            } else if let Some(skip) = self.gate(stage, &reports, &sync) {
                self.log.warning(format!("{} skipped: {skip}", stage.title()));
                StageReport::not_run(stage, StageOutcome::Skipped { skip })
            } else {
                self.execute(stage).await
            };
            self.record(&report, &sync.digest);
            reports.push(report);
        }

        let run = PipelineRun {
            run_id,
            started_at,
            requested: requested.to_vec(),
            sources_digest: sync.digest.clone(),
            stages: reports,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        self.log.info(format!(
            "Pipeline finished: {} succeeded, {} failed, {} skipped",
            run.passed_count(),
            run.failed_count(),
            run.skipped_count()
        ));
        info!(
            run_id = %run_id,
            success = run.success(),
            duration_ms = run.duration_ms,
            "pipeline finished"
        );
        Ok(run)
    }

    /// Decide whether `stage` may run given earlier results.
    fn gate(&self, stage: Stage, done: &[StageReport], sync: &SyncReport) -> Option<SkipReason> {
        if stage.needs_design() && sync.design_elaboration.is_none() {
            return Some(SkipReason::NoActiveFile { role: Role::Design });
        }
        let pre = stage.prerequisite()?;
        match done.iter().find(|r| r.stage == pre) {
            Some(r) if r.outcome.is_success() => None,
            Some(_) => Some(SkipReason::DependencyFailed { stage: pre }),
            None if self.satisfied_against(pre, &sync.digest) => None,
            None => Some(SkipReason::MissingDependency { stage: pre }),
        }
    }

    /// Whether `stage` succeeded earlier against `digest` and its artifacts remain.
    fn satisfied_against(&self, stage: Stage, digest: &str) -> bool {
        let matches = lock(&self.satisfied).get(&stage).is_some_and(|d| d == digest);
        matches && StagePlan::for_stage(stage, &self.config).required().all(|a| a.exists())
    }

    fn record(&self, report: &StageReport, digest: &str) {
        let mut satisfied = lock(&self.satisfied);
        match &report.outcome {
            StageOutcome::Success => {
                satisfied.insert(report.stage, digest.to_string());
            }
            outcome if outcome.is_skipped() => {}
            _ => {
                satisfied.remove(&report.stage);
            }
        }
        drop(satisfied);

        if !report.invocations.is_empty() {
            let mut artifacts = lock(&self.artifacts);
            artifacts.retain(|_, a| a.produced_by != report.stage);
            for artifact in &report.artifacts {
                artifacts.insert(artifact.kind, artifact.clone());
            }
        }
    }

    async fn execute(&self, stage: Stage) -> StageReport {
        let start = Instant::now();
        let plan = StagePlan::for_stage(stage, &self.config);

        // Every tool of the stage must resolve before anything is spawned.
        let mut programs = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            match self.registry.resolve(step.tool) {
                Some(program) => programs.push(program),
                None => {
                    let outcome = StageOutcome::ToolNotFound {
                        tool: step.tool,
                        program: self.registry.program(step.tool).unwrap_or_default().to_string(),
                    };
                    self.log.error(format!("{} failed: {outcome}", stage.title()));
                    return StageReport::not_run(stage, outcome);
                }
            }
        }

        let tool_label = programs
            .first()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.log.info(format!("{} with {tool_label}...", stage.verb()));

        for path in plan.stale_paths() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "could not remove stale artifact");
                }
            }
        }

        let mut invocations = Vec::with_capacity(plan.steps.len());
        let mut outcome = StageOutcome::Success;
        for (step, program) in plan.steps.iter().zip(programs) {
            let invocation = ToolInvocation {
                stage,
                tool: step.tool,
                program,
                args: step.args.clone(),
                working_dir: self.config.work_dir.clone(),
                timeout_secs: self.config.timeout_secs,
            };
            let done = self.runner.run(invocation).await;
            let result = &done.result;
            let failed = match result.status {
                InvocationStatus::TimedOut => Some(StageOutcome::TimedOut {
                    tool: step.tool,
                    timeout_secs: self.config.timeout_secs,
                }),
                InvocationStatus::SpawnFailed => Some(StageOutcome::SpawnFailed {
                    tool: step.tool,
                    message: result.stderr.clone(),
                }),
                InvocationStatus::Exited if result.exit_code != 0 => {
                    Some(StageOutcome::NonZeroExit {
                        tool: step.tool,
                        exit_code: result.exit_code,
                    })
                }
                InvocationStatus::Exited => step.produces.iter().find(|a| !a.exists()).map(|a| {
                    StageOutcome::ArtifactMissing {
                        artifact: a.kind,
                        path: a.path.clone(),
                    }
                }),
            };
            invocations.push(done);
            if let Some(failed) = failed {
                outcome = failed;
                break;
            }
        }

        let artifacts = if outcome.is_success() {
            plan.required()
                .chain(plan.optional.iter().filter(|a| a.exists()))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let report = StageReport {
            stage,
            outcome,
            invocations,
            artifacts,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        self.log_report(&report);
        report
    }

    fn log_report(&self, report: &StageReport) {
        let stage = report.stage;
        if report.outcome.is_success() {
            self.log
                .success(format!("{} succeeded ({} ms)", stage.title(), report.duration_ms));
        } else {
            self.log.error(format!("{} failed: {}", stage.title(), report.outcome));
        }

        for done in &report.invocations {
            let result = &done.result;
            let stdout = result.stdout.trim_end();
            let stderr = result.stderr.trim_end();
            match stage {
                Stage::Synthesize => {
                    for line in stdout
                        .lines()
                        .filter(|l| l.contains("Number of cells") || l.contains("Chip area"))
                    {
                        self.log.info(line.trim());
                    }
                }
                _ if !stdout.is_empty() => self.log.info(stdout),
                _ => {}
            }
            if stderr.is_empty() || result.status != InvocationStatus::Exited {
                continue;
            }
            if stage == Stage::Lint {
                self.log.warning(stderr);
            } else if !result.passed() {
                self.log.error(stderr);
            }
        }

        for artifact in &report.artifacts {
            self.log
                .info(format!("{} ready: {}", artifact.kind, artifact.path.display()));
        }
    }
}
