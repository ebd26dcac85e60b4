//! Detached launch of external waveform and schematic viewers.
//!
//! Viewers sit outside the pipeline: a launch has no outcome beyond
//! "spawn attempted". Only artifacts the orchestrator verified are opened.

use hdlforge_core::{ConsoleLog, ForgeConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::stage::{ArtifactKind, ArtifactRecord, Stage};

/// What to open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViewTarget {
    /// Simulation dump in the primary waveform viewer
    Waveform,

    /// Simulation dump in the alternative waveform viewer
    WaveformAlt,

    /// Rendered schematic in the image viewer
    Schematic,
}

impl ViewTarget {
    pub fn name(&self) -> &'static str {
        match self {
            ViewTarget::Waveform => "waveform",
            ViewTarget::WaveformAlt => "waveform-alt",
            ViewTarget::Schematic => "schematic",
        }
    }

    /// Artifact the viewer opens.
    pub fn artifact_kind(&self) -> ArtifactKind {
        match self {
            ViewTarget::Waveform | ViewTarget::WaveformAlt => ArtifactKind::Waveform,
            ViewTarget::Schematic => ArtifactKind::SchematicImage,
        }
    }

    /// Configured viewer executable.
    pub fn program(&self, config: &ForgeConfig) -> String {
        let v = &config.viewers;
        match self {
            ViewTarget::Waveform => v.waveform.clone(),
            ViewTarget::WaveformAlt => v.waveform_alt.clone(),
            ViewTarget::Schematic => v.image.clone(),
        }
    }

    /// Record for the configured output file when it is on disk.
    ///
    /// For callers without a session history, such as a one-shot CLI
    /// invocation, where the file left by an earlier process is all there is.
    pub fn record_on_disk(&self, config: &ForgeConfig) -> Option<ArtifactRecord> {
        let a = &config.artifacts;
        let record = match self {
            ViewTarget::Waveform | ViewTarget::WaveformAlt => ArtifactRecord::new(
                ArtifactKind::Waveform,
                config.work_path(&a.waveform),
                Stage::Simulate,
            ),
            ViewTarget::Schematic => ArtifactRecord::new(
                ArtifactKind::SchematicImage,
                config.work_path(&a.schematic_image),
                Stage::Schematic,
            ),
        };
        record.exists().then_some(record)
    }

    fn hint(&self) -> &'static str {
        match self {
            ViewTarget::Waveform | ViewTarget::WaveformAlt => "run simulation first",
            ViewTarget::Schematic => "generate the schematic first",
        }
    }
}

impl fmt::Display for ViewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ViewTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waveform" | "wave" => Ok(ViewTarget::Waveform),
            "waveform-alt" | "waveform_alt" | "surfer" => Ok(ViewTarget::WaveformAlt),
            "schematic" | "schem" => Ok(ViewTarget::Schematic),
            other => Err(format!("unknown view target: {other}")),
        }
    }
}

/// Launch the viewer for `target` on a verified `artifact` without waiting.
///
/// Returns whether a process was spawned. Every outcome is logged. The
/// child is reaped on a background thread once the viewer exits.
pub fn open_external(
    config: &ForgeConfig,
    log: &ConsoleLog,
    target: ViewTarget,
    artifact: Option<&ArtifactRecord>,
) -> bool {
    let file = match artifact {
        Some(record) if record.kind == target.artifact_kind() && record.exists() => {
            record.path.clone()
        }
        _ => {
            log.error(format!("No verified {target} file: {}", target.hint()));
            return false;
        }
    };

    let program = target.program(config);
    debug!(viewer = %program, file = %file.display(), "launching viewer");
    let spawned = Command::new(&program)
        .arg(&file)
        .current_dir(&config.work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(child) => {
            log.success(format!("Launched {program} for {}", file.display()));
            reap_detached(child, program);
            true
        }
        Err(e) => {
            log.error(format!("Failed to launch {program}: {e}"));
            false
        }
    }
}

fn reap_detached(mut child: Child, program: String) {
    let spawned = std::thread::Builder::new()
        .name("hdlforge-viewer-reaper".to_string())
        .spawn(move || match child.wait() {
            Ok(status) => debug!(viewer = %program, %status, "viewer exited"),
            Err(e) => warn!(viewer = %program, error = %e, "failed to reap viewer"),
        });
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start viewer reaper thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdlforge_core::Severity;

    fn config_in(dir: &std::path::Path) -> ForgeConfig {
        ForgeConfig {
            work_dir: dir.to_path_buf(),
            ..ForgeConfig::default()
        }
    }

    #[test]
    fn test_missing_dump_is_reported_not_spawned() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let log = ConsoleLog::new();

        assert!(ViewTarget::Waveform.record_on_disk(&config).is_none());
        assert!(!open_external(&config, &log, ViewTarget::Waveform, None));
        let entries = log.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Error);
        assert!(entries[0].message.contains("run simulation first"));
    }

    #[test]
    fn test_unverified_file_on_disk_is_not_opened() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.viewers.waveform = "/nonexistent/bin/gtkwave".to_string();
        std::fs::write(dir.path().join("dump.vcd"), b"$date $end").unwrap();
        let log = ConsoleLog::new();

        assert!(!open_external(&config, &log, ViewTarget::Waveform, None));
        assert!(log.snapshot()[0].message.starts_with("No verified waveform"));
    }

    #[test]
    fn test_record_of_other_kind_or_deleted_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let png = dir.path().join("schematic.png");
        std::fs::write(&png, b"png").unwrap();
        let image = ArtifactRecord::new(ArtifactKind::SchematicImage, &png, Stage::Schematic);
        let log = ConsoleLog::new();

        assert!(!open_external(&config, &log, ViewTarget::Waveform, Some(&image)));

        std::fs::remove_file(&png).unwrap();
        assert!(!open_external(&config, &log, ViewTarget::Schematic, Some(&image)));
        assert_eq!(log.snapshot().len(), 2);
    }

    #[test]
    fn test_spawn_failure_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.viewers.image = "/nonexistent/bin/xdg-open".to_string();
        std::fs::write(dir.path().join("schematic.png"), b"png").unwrap();
        let record = ViewTarget::Schematic.record_on_disk(&config).unwrap();
        let log = ConsoleLog::new();

        assert!(!open_external(&config, &log, ViewTarget::Schematic, Some(&record)));
        assert!(log.snapshot()[0].message.starts_with("Failed to launch"));
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_is_detached() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.viewers.waveform_alt = "true".to_string();
        std::fs::write(dir.path().join("dump.vcd"), b"$date $end").unwrap();
        let record = ViewTarget::WaveformAlt.record_on_disk(&config).unwrap();
        assert_eq!(record.produced_by, Stage::Simulate);
        let log = ConsoleLog::new();

        assert!(open_external(&config, &log, ViewTarget::WaveformAlt, Some(&record)));
        assert_eq!(log.snapshot()[0].severity, Severity::Success);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_exited_viewer_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.viewers.waveform = "true".to_string();
        std::fs::write(dir.path().join("dump.vcd"), b"$date $end").unwrap();
        let record = ViewTarget::Waveform.record_on_disk(&config).unwrap();
        let log = ConsoleLog::new();

        let before = zombie_children();
        assert!(open_external(&config, &log, ViewTarget::Waveform, Some(&record)));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while zombie_children() > before && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(zombie_children() <= before);
    }

    /// Defunct processes whose parent is this test process.
    #[cfg(target_os = "linux")]
    fn zombie_children() -> usize {
        let me = std::process::id().to_string();
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return 0;
        };
        entries
            .filter_map(|e| std::fs::read_to_string(e.ok()?.path().join("stat")).ok())
            .filter(|stat| {
                // "<pid> (<comm>) <state> <ppid> ..."
                let Some(rest) = stat.rsplit_once(") ").map(|(_, r)| r) else {
                    return false;
                };
                let mut fields = rest.split_whitespace();
                fields.next() == Some("Z") && fields.next() == Some(me.as_str())
            })
            .count()
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("waveform-alt".parse::<ViewTarget>().unwrap(), ViewTarget::WaveformAlt);
        assert_eq!("Schematic".parse::<ViewTarget>().unwrap(), ViewTarget::Schematic);
        assert!("netlist".parse::<ViewTarget>().is_err());
    }
}
