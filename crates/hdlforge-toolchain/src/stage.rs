//! Pipeline stage definitions and the static dependency table.

use hdlforge_core::ToolName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Pipeline stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// iverilog: elaborate design + testbench into a simulation binary
    Compile,

    /// vvp: run the compiled binary
    Simulate,

    /// verilator --lint-only
    Lint,

    /// yosys: synthesize the design and write a netlist
    Synthesize,

    /// yosys show + dot: schematic graph, then rendered image
    Schematic,

    /// vcd2fst: convert the simulation dump into a compact waveform
    Waveform,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Compile,
        Stage::Simulate,
        Stage::Lint,
        Stage::Synthesize,
        Stage::Schematic,
        Stage::Waveform,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Compile => "compile",
            Stage::Simulate => "simulate",
            Stage::Lint => "lint",
            Stage::Synthesize => "synthesize",
            Stage::Schematic => "schematic",
            Stage::Waveform => "waveform",
        }
    }

    /// Capitalized name used at the start of console messages.
    pub fn title(&self) -> &'static str {
        match self {
            Stage::Compile => "Compile",
            Stage::Simulate => "Simulate",
            Stage::Lint => "Lint",
            Stage::Synthesize => "Synthesize",
            Stage::Schematic => "Schematic",
            Stage::Waveform => "Waveform",
        }
    }

    /// Present participle used in console messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Stage::Compile => "Compiling",
            Stage::Simulate => "Simulating",
            Stage::Lint => "Linting",
            Stage::Synthesize => "Synthesizing",
            Stage::Schematic => "Generating schematic",
            Stage::Waveform => "Converting waveform",
        }
    }

    /// The stage that must have succeeded before this one may run.
    ///
    /// `Lint` is independent of every other stage.
    pub fn prerequisite(&self) -> Option<Stage> {
        match self {
            Stage::Simulate => Some(Stage::Compile),
            Stage::Schematic => Some(Stage::Synthesize),
            Stage::Waveform => Some(Stage::Simulate),
            Stage::Compile | Stage::Lint | Stage::Synthesize => None,
        }
    }

    /// Tools invoked by this stage, in order.
    pub fn tools(&self) -> &'static [ToolName] {
        match self {
            Stage::Compile => &[ToolName::Compile],
            Stage::Simulate => &[ToolName::Simulate],
            Stage::Lint => &[ToolName::Lint],
            Stage::Synthesize => &[ToolName::Synthesize],
            Stage::Schematic => &[ToolName::SchematicGraph, ToolName::Schematic],
            Stage::Waveform => &[ToolName::Waveform],
        }
    }

    /// Whether the stage only consumes the design (not the testbench).
    pub fn needs_design(&self) -> bool {
        matches!(self, Stage::Synthesize | Stage::Schematic)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compile" => Ok(Stage::Compile),
            "simulate" | "sim" => Ok(Stage::Simulate),
            "lint" => Ok(Stage::Lint),
            "synthesize" | "synth" => Ok(Stage::Synthesize),
            "schematic" | "schem" => Ok(Stage::Schematic),
            "waveform" | "wave" => Ok(Stage::Waveform),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Kinds of files produced by stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    CompiledBinary,
    /// Value change dump written by the simulation
    Waveform,
    /// Compact waveform converted from the dump
    CompactWaveform,
    Netlist,
    SchematicGraph,
    SchematicImage,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::CompiledBinary => "compiled binary",
            ArtifactKind::Waveform => "waveform",
            ArtifactKind::CompactWaveform => "compact waveform",
            ArtifactKind::Netlist => "netlist",
            ArtifactKind::SchematicGraph => "schematic graph",
            ArtifactKind::SchematicImage => "schematic image",
        })
    }
}

/// A file a stage is expected to leave behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub kind: ArtifactKind,

    pub path: PathBuf,

    /// Stage whose successful completion produces the file.
    pub produced_by: Stage,
}

impl ArtifactRecord {
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>, produced_by: Stage) -> Self {
        Self {
            kind,
            path: path.into(),
            produced_by,
        }
    }

    pub fn exists(&self) -> bool {
        is_present(&self.path)
    }
}

pub(crate) fn is_present(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_round_trip_through_from_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.name().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!("SYNTH".parse::<Stage>().unwrap(), Stage::Synthesize);
        assert!("place_route".parse::<Stage>().is_err());
    }

    #[test]
    fn test_dependency_table() {
        assert_eq!(Stage::Simulate.prerequisite(), Some(Stage::Compile));
        assert_eq!(Stage::Schematic.prerequisite(), Some(Stage::Synthesize));
        assert_eq!(Stage::Waveform.prerequisite(), Some(Stage::Simulate));
        assert_eq!(Stage::Lint.prerequisite(), None);
        assert_eq!(Stage::Compile.prerequisite(), None);
        assert_eq!(Stage::Synthesize.prerequisite(), None);
    }

    #[test]
    fn test_schematic_is_two_tools() {
        assert_eq!(
            Stage::Schematic.tools(),
            &[ToolName::SchematicGraph, ToolName::Schematic]
        );
        assert_eq!(Stage::Compile.tools(), &[ToolName::Compile]);
    }

    #[test]
    fn test_artifact_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.vvp");
        let record = ArtifactRecord::new(ArtifactKind::CompiledBinary, &path, Stage::Compile);
        assert!(!record.exists());
        std::fs::write(&path, b"#!vvp").unwrap();
        assert!(record.exists());
    }
}
