//! hdlforge - HDL development console
//!
//! The `hdlforge` command drives an external Verilog/SystemVerilog toolchain
//! headlessly through the same session the interactive console uses.
//!
//! ## Commands
//!
//! - `tools`: Probe and list tool availability
//! - `classify`: Print the role of each file
//! - `new`: Create a source file from a template
//! - `run`: Open a design/testbench pair and run pipeline stages
//! - `view`: Open a produced artifact in an external viewer

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hdlforge_core::{classify, ConsoleLog, ForgeConfig, LogEntry, Role, Severity, Template};
use hdlforge_toolchain::{open_external, Console, PipelineRun, Stage, ViewTarget};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "hdlforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HDL development console", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: hdlforge.toml in the current directory)
    #[arg(long, global = true, env = "HDLFORGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe and list tool availability
    Tools,

    /// Print the role each file would be given
    Classify {
        /// Files to classify
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Create a new source file from a template
    New {
        /// Path of the file to create
        path: PathBuf,

        /// Template: empty, module or testbench
        #[arg(short, long, default_value = "empty")]
        template: Template,
    },

    /// Open a design/testbench pair and run pipeline stages
    Run {
        /// Design source file
        #[arg(short, long)]
        design: Option<PathBuf>,

        /// Testbench source file
        #[arg(short, long)]
        testbench: Option<PathBuf>,

        /// Comma-separated stages (compile,simulate,lint,synthesize,schematic,waveform)
        #[arg(short, long, value_delimiter = ',', default_value = "compile,simulate")]
        stages: Vec<Stage>,
    },

    /// Open a produced artifact in an external viewer
    View {
        /// waveform, waveform-alt or schematic
        target: ViewTarget,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console lines go to stdout; tracing carries diagnostics only.
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    hdlforge_core::init_tracing(cli.json, level, false);

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let config = ForgeConfig::load(cli.config.as_deref(), &cwd)
        .context("Failed to load hdlforge configuration")?;
    debug!(work_dir = %config.work_dir.display(), "configuration resolved");

    match cli.command {
        Commands::Tools => cmd_tools(config, cli.json),
        Commands::Classify { files } => cmd_classify(&files, cli.json),
        Commands::New { path, template } => cmd_new(config, &path, template, cli.json),
        Commands::Run {
            design,
            testbench,
            stages,
        } => {
            cmd_run(
                config,
                design.as_deref(),
                testbench.as_deref(),
                &stages,
                cli.json,
            )
            .await
        }
        Commands::View { target } => cmd_view(config, target, cli.json),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_log(entries: &[LogEntry]) {
    for entry in entries {
        let marker = match entry.severity {
            Severity::Info => " ",
            Severity::Success => "✓",
            Severity::Warning => "!",
            Severity::Error => "✗",
        };
        println!(
            "[{}] {} {}",
            entry.timestamp.format("%H:%M:%S"),
            marker,
            entry.message
        );
    }
}

fn cmd_tools(config: ForgeConfig, json: bool) -> Result<()> {
    let console = Console::new(config);
    console.clear_log();
    let tools = console.probe_tools();

    if json {
        return print_json(&tools);
    }

    for tool in &tools {
        match &tool.resolved {
            Some(path) => println!("  ✓ {:<20} {}", tool.tool, path.display()),
            None => println!("  ✗ {:<20} {} (not found)", tool.tool, tool.program),
        }
    }
    let available = tools.iter().filter(|t| t.is_available()).count();
    println!();
    println!("Summary: {}/{} tools available", available, tools.len());
    Ok(())
}

#[derive(Serialize)]
struct Classification {
    path: PathBuf,
    role: Role,
}

fn classify_file(path: &Path) -> Classification {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Unreadable files are still classified by name.
    let sample = std::fs::read_to_string(path).ok();
    Classification {
        path: path.to_path_buf(),
        role: classify(&name, sample.as_deref()),
    }
}

fn cmd_classify(files: &[PathBuf], json: bool) -> Result<()> {
    let results: Vec<Classification> = files.iter().map(|p| classify_file(p)).collect();
    if json {
        return print_json(&results);
    }
    for c in &results {
        println!("{}: {}", c.path.display(), c.role);
    }
    Ok(())
}

fn cmd_new(config: ForgeConfig, path: &Path, template: Template, json: bool) -> Result<()> {
    let mut console = Console::new(config);
    console.clear_log();
    let role = console.create_file(path, template);
    let entries = console.drain_log();

    if json {
        print_json(&entries)?;
    } else {
        print_log(&entries);
    }
    role.with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(())
}

async fn cmd_run(
    config: ForgeConfig,
    design: Option<&Path>,
    testbench: Option<&Path>,
    stages: &[Stage],
    json: bool,
) -> Result<()> {
    let mut console = Console::new(config);
    // Startup probe lines only matter for the interactive console.
    console.clear_log();

    for path in design.into_iter().chain(testbench) {
        console
            .on_file_selected(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
    }

    let run = console.on_pipeline_requested(stages).await;
    let entries = console.drain_log();

    let run = match run {
        Ok(run) => run,
        Err(e) => {
            if json {
                print_json(&entries)?;
            } else {
                print_log(&entries);
            }
            return Err(e).context("Pipeline did not start");
        }
    };

    if json {
        #[derive(Serialize)]
        struct RunOutput<'a> {
            run: &'a PipelineRun,
            log: &'a [LogEntry],
        }
        print_json(&RunOutput {
            run: &run,
            log: &entries,
        })?;
    } else {
        print_log(&entries);
        print_summary(&run);
    }

    if !run.success() {
        anyhow::bail!(
            "{} stage(s) failed, {} skipped",
            run.failed_count(),
            run.skipped_count()
        );
    }
    Ok(())
}

fn print_summary(run: &PipelineRun) {
    println!();
    println!("Run ID: {}", run.run_id);
    println!("Status: {}", if run.success() { "✓ PASSED" } else { "✗ FAILED" });
    println!("Duration: {}ms", run.duration_ms);
    println!();

    for report in &run.stages {
        let status = if report.outcome.is_success() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms, {})",
            status, report.stage, report.duration_ms, report.outcome
        );
        for artifact in &report.artifacts {
            println!("      {} -> {}", artifact.kind, artifact.path.display());
        }
    }

    println!();
    println!(
        "Summary: {}/{} stages passed",
        run.passed_count(),
        run.stages.len()
    );
}

fn cmd_view(config: ForgeConfig, target: ViewTarget, json: bool) -> Result<()> {
    // A one-shot process has no run history; trust what an earlier run left.
    let artifact = target.record_on_disk(&config);
    let log = ConsoleLog::new();
    let launched = open_external(&config, &log, target, artifact.as_ref());
    let entries = log.drain();

    if json {
        print_json(&entries)?;
    } else {
        print_log(&entries);
    }
    if !launched {
        anyhow::bail!("Could not open {target}");
    }
    Ok(())
}
