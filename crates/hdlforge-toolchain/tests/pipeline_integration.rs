//! Integration tests for the console session against shell-script tools.
#![cfg(unix)]

use hdlforge_core::{ForgeConfig, Role, Severity, ToolName};
use hdlforge_toolchain::{ArtifactKind, Console, SkipReason, Stage, StageOutcome, ViewTarget};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable shell script named `name` into `bin`.
fn fake_tool(bin: &Path, name: &str, body: &str) -> String {
    let path = bin.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

struct Project {
    _dir: tempfile::TempDir,
    root: PathBuf,
    config: ForgeConfig,
}

/// Project with an adder pair on disk and a working compile/simulate/lint toolchain.
fn project() -> Project {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let bin = root.join("bin");
    std::fs::create_dir(&bin).unwrap();

    let mut config = ForgeConfig {
        work_dir: root.join("work"),
        ..ForgeConfig::default()
    };
    // iverilog -g2012 -o <binary> <sources>
    let iverilog = fake_tool(
        &bin,
        "iverilog",
        r#"grep -q endmodule "$4" || { echo "$4: syntax error" >&2; exit 1; }
printf '#!vvp\n' > "$3""#,
    );
    // vvp <binary>, run from the work directory
    let vvp = fake_tool(
        &bin,
        "vvp",
        r#"echo "VCD info: dumpfile dump.vcd opened for output."
printf '$date\n$end\n' > dump.vcd"#,
    );
    let verilator = fake_tool(&bin, "verilator", r#"echo "%Warning-UNUSED: unused signal" >&2"#);
    config.tools.get_mut(&ToolName::Compile).unwrap().path = iverilog;
    config.tools.get_mut(&ToolName::Simulate).unwrap().path = vvp;
    config.tools.get_mut(&ToolName::Lint).unwrap().path = verilator;
    config.tools.get_mut(&ToolName::Synthesize).unwrap().path = "/nonexistent/bin/yosys".into();

    std::fs::write(root.join("adder.v"), "module adder; endmodule\n").unwrap();
    std::fs::write(root.join("adder_tb.v"), "module adder_tb; endmodule\n").unwrap();

    Project {
        _dir: dir,
        root,
        config,
    }
}

fn open_pair(project: &Project) -> Console {
    let mut console = Console::new(project.config.clone());
    console.clear_log();
    assert_eq!(
        console.on_file_selected(&project.root.join("adder.v")).unwrap(),
        Role::Design
    );
    assert_eq!(
        console.on_file_selected(&project.root.join("adder_tb.v")).unwrap(),
        Role::Testbench
    );
    console
}

/// Test: edited buffers are synchronized, compiled and simulated in order
#[tokio::test]
async fn test_edit_compile_simulate() {
    let project = project();
    let mut console = open_pair(&project);

    let design = "module adder(input a, input b, output s);\n  assign s = a ^ b;\nendmodule\n";
    let tb = "module adder_tb;\n  initial begin\n    $dumpfile(\"dump.vcd\");\n  end\nendmodule\n";
    console.on_buffer_edited(Role::Design, design).unwrap();
    console.on_buffer_edited(Role::Testbench, tb).unwrap();
    console.clear_log();

    let run = console
        .on_pipeline_requested(&[Stage::Simulate, Stage::Compile])
        .await
        .expect("pipeline failed to start");

    assert!(run.success(), "stages: {:?}", run.stages);
    assert_eq!(run.passed_count(), 2);
    assert_eq!(
        std::fs::read_to_string(project.root.join("adder.v")).unwrap(),
        design
    );
    let combined = std::fs::read_to_string(project.config.work_path("top_active.sv")).unwrap();
    assert_eq!(combined, format!("{design}\n\n{tb}"));

    let log = console.log_snapshot();
    let pos = |severity: Severity, prefix: &str| {
        log.iter()
            .position(|e| e.severity == severity && e.message.starts_with(prefix))
            .unwrap_or_else(|| panic!("missing {severity} entry starting with {prefix:?}"))
    };
    let synced = pos(Severity::Success, "Files synchronized");
    let compiling = pos(Severity::Info, "Compiling with iverilog");
    let compiled = pos(Severity::Success, "Compile succeeded");
    let simulating = pos(Severity::Info, "Simulating with vvp");
    let simulated = pos(Severity::Success, "Simulate succeeded");
    assert!(synced < compiling && compiling < compiled);
    assert!(compiled < simulating && simulating < simulated);
    assert!(log
        .iter()
        .any(|e| e.severity == Severity::Info && e.message.starts_with("VCD info")));

    let kinds: Vec<_> = console.artifacts().iter().map(|a| a.kind).collect();
    assert!(kinds.contains(&ArtifactKind::CompiledBinary));
    assert!(kinds.contains(&ArtifactKind::Waveform));
}

/// Test: a compile error stops simulation and surfaces the tool's stderr
#[tokio::test]
async fn test_compile_error_skips_simulation() {
    let project = project();
    let mut console = open_pair(&project);
    console.on_buffer_edited(Role::Design, "module adder(").unwrap();
    console.on_buffer_edited(Role::Testbench, "module adder_tb;").unwrap();

    let run = console
        .on_pipeline_requested(&[Stage::Compile, Stage::Simulate])
        .await
        .unwrap();

    assert_eq!(
        run.outcome(Stage::Compile),
        Some(&StageOutcome::NonZeroExit {
            tool: ToolName::Compile,
            exit_code: 1
        })
    );
    assert_eq!(
        run.outcome(Stage::Simulate),
        Some(&StageOutcome::Skipped {
            skip: SkipReason::DependencyFailed {
                stage: Stage::Compile
            }
        })
    );
    assert!(console
        .log_snapshot()
        .iter()
        .any(|e| e.severity == Severity::Error && e.message.ends_with("syntax error")));
}

/// Test: lint warnings are reported as warnings without blocking anything
#[tokio::test]
async fn test_lint_warnings() {
    let project = project();
    let mut console = open_pair(&project);
    console.clear_log();

    let run = console.on_pipeline_requested(&[Stage::Lint]).await.unwrap();
    assert!(run.success());
    assert!(console
        .log_snapshot()
        .iter()
        .any(|e| e.severity == Severity::Warning && e.message.contains("UNUSED")));
}

/// Test: a tool that never finishes is killed at the timeout
#[tokio::test]
async fn test_hung_tool_times_out() {
    let mut project = project();
    let bin = project.root.join("bin");
    project.config.timeout_secs = 1;
    project.config.tools.get_mut(&ToolName::Lint).unwrap().path =
        fake_tool(&bin, "verilator-hang", "sleep 30");
    let mut console = open_pair(&project);

    let start = std::time::Instant::now();
    let run = console.on_pipeline_requested(&[Stage::Lint]).await.unwrap();

    assert_eq!(
        run.outcome(Stage::Lint),
        Some(&StageOutcome::TimedOut {
            tool: ToolName::Lint,
            timeout_secs: 1
        })
    );
    assert!(start.elapsed() < std::time::Duration::from_secs(10));
}

/// Test: a missing synthesizer fails its stage and skips the schematic
#[tokio::test]
async fn test_missing_synthesizer() {
    let project = project();
    let mut console = open_pair(&project);

    let run = console
        .on_pipeline_requested(&[Stage::Schematic, Stage::Synthesize, Stage::Lint])
        .await
        .unwrap();

    assert_eq!(run.stages[0].stage, Stage::Synthesize);
    assert!(matches!(
        run.outcome(Stage::Synthesize),
        Some(StageOutcome::ToolNotFound { .. })
    ));
    assert!(matches!(
        run.outcome(Stage::Schematic),
        Some(StageOutcome::Skipped { .. })
    ));
    assert_eq!(run.outcome(Stage::Lint), Some(&StageOutcome::Success));
    assert!(run.report(Stage::Synthesize).unwrap().invocations.is_empty());
}

/// Test: a zero exit code without the expected output is a failure
#[tokio::test]
async fn test_missing_artifact() {
    let mut project = project();
    let bin = project.root.join("bin");
    project.config.tools.get_mut(&ToolName::Compile).unwrap().path =
        fake_tool(&bin, "iverilog-silent", "exit 0");
    let mut console = open_pair(&project);

    let run = console.on_pipeline_requested(&[Stage::Compile]).await.unwrap();

    assert!(matches!(
        run.outcome(Stage::Compile),
        Some(StageOutcome::ArtifactMissing {
            artifact: ArtifactKind::CompiledBinary,
            ..
        })
    ));
    assert!(console.artifacts().is_empty());
}

/// Test: the waveform viewer is refused until this session verified a dump
#[tokio::test]
async fn test_view_waveform_after_simulation() {
    let mut project = project();
    project.config.viewers.waveform = "true".to_string();
    let mut console = open_pair(&project);

    // A dump from some earlier session is not trusted.
    std::fs::create_dir_all(&project.config.work_dir).unwrap();
    std::fs::write(project.config.work_path("dump.vcd"), "$date\n$end\n").unwrap();
    assert!(!console.open_external(ViewTarget::Waveform));

    console
        .on_pipeline_requested(&[Stage::Compile, Stage::Simulate])
        .await
        .unwrap();
    assert!(console.open_external(ViewTarget::Waveform));
}
