//! Console configuration.
//!
//! Resolved once at startup from built-in defaults, an optional TOML file
//! and `HDLFORGE_*` environment overrides, then shared immutably.
//!
//! ```toml
//! work_dir = "build"
//! timeout_secs = 30
//!
//! [tools.compile]
//! path = "/opt/iverilog/bin/iverilog"
//!
//! [artifacts]
//! binary = "sim.vvp"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// File looked up in the project directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "hdlforge.toml";

/// Default hard wall-clock bound for a single tool invocation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Logical tool names recognized in `[tools.<name>]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    Compile,
    Simulate,
    Lint,
    Synthesize,
    /// Graph generation, the first half of the schematic stage.
    SchematicGraph,
    /// Image rendering, the second half of the schematic stage.
    Schematic,
    Waveform,
}

impl ToolName {
    pub const ALL: [ToolName; 7] = [
        ToolName::Compile,
        ToolName::Simulate,
        ToolName::Lint,
        ToolName::Synthesize,
        ToolName::SchematicGraph,
        ToolName::Schematic,
        ToolName::Waveform,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolName::Compile => "compile",
            ToolName::Simulate => "simulate",
            ToolName::Lint => "lint",
            ToolName::Synthesize => "synthesize",
            ToolName::SchematicGraph => "schematic_graph",
            ToolName::Schematic => "schematic",
            ToolName::Waveform => "waveform",
        }
    }

    fn env_key(&self) -> String {
        format!("HDLFORGE_TOOL_{}", self.name().to_ascii_uppercase())
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Executable plus argument template for one tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable path, or a bare name looked up on `PATH`.
    pub path: String,

    /// Arguments; `{placeholder}` tokens are expanded per invocation.
    pub args: Vec<String>,
}

impl ToolCommand {
    fn new(path: &str, args: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// File names of intermediate files and artifacts inside `work_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactNames {
    pub binary: String,
    pub waveform: String,
    pub waveform_compact: String,
    pub netlist: String,
    pub schematic_graph: String,
    pub schematic_image: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            binary: "design.vvp".to_string(),
            waveform: "dump.vcd".to_string(),
            waveform_compact: "dump.fst".to_string(),
            netlist: "synth.v".to_string(),
            schematic_graph: "schematic.dot".to_string(),
            schematic_image: "schematic.png".to_string(),
        }
    }
}

/// External viewers launched outside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewerCommands {
    pub waveform: String,
    pub waveform_alt: String,
    pub image: String,
}

impl Default for ViewerCommands {
    fn default() -> Self {
        Self {
            waveform: "gtkwave".to_string(),
            waveform_alt: "surfer".to_string(),
            image: "xdg-open".to_string(),
        }
    }
}

/// Resolved console configuration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ForgeConfig {
    /// Directory for elaboration files and artifacts.
    pub work_dir: PathBuf,

    /// Hard wall-clock timeout per tool invocation, in seconds.
    pub timeout_secs: u64,

    /// Combined design + testbench file consumed by compile and lint.
    pub elaboration_file: String,

    /// Design-only file consumed by synthesis and schematic generation.
    pub design_elaboration_file: String,

    pub artifacts: ArtifactNames,

    pub tools: BTreeMap<ToolName, ToolCommand>,

    pub viewers: ViewerCommands,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        let mut tools = BTreeMap::new();
        tools.insert(
            ToolName::Compile,
            ToolCommand::new("iverilog", &["-g2012", "-o", "{binary}", "{sources}"]),
        );
        tools.insert(ToolName::Simulate, ToolCommand::new("vvp", &["{binary}"]));
        tools.insert(
            ToolName::Lint,
            ToolCommand::new("verilator", &["--lint-only", "-Wall", "{sources}"]),
        );
        tools.insert(
            ToolName::Synthesize,
            ToolCommand::new(
                "yosys",
                &[
                    "-p",
                    "read_verilog -sv {design}; hierarchy -auto-top; proc; opt; fsm; opt; \
                     memory; opt; techmap; opt; stat; write_verilog {netlist}",
                ],
            ),
        );
        tools.insert(
            ToolName::SchematicGraph,
            ToolCommand::new(
                "yosys",
                &[
                    "-p",
                    "read_verilog -sv {design}; hierarchy -auto-top; proc; opt; \
                     show -format dot -prefix {schematic_prefix}",
                ],
            ),
        );
        tools.insert(
            ToolName::Schematic,
            ToolCommand::new(
                "dot",
                &["-Tpng", "{schematic_graph}", "-o", "{schematic_image}"],
            ),
        );
        tools.insert(
            ToolName::Waveform,
            ToolCommand::new("vcd2fst", &["{waveform}", "{waveform_compact}"]),
        );

        Self {
            work_dir: PathBuf::from(".hdlforge"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            elaboration_file: "top_active.sv".to_string(),
            design_elaboration_file: "design_active.sv".to_string(),
            artifacts: ArtifactNames::default(),
            tools,
            viewers: ViewerCommands::default(),
        }
    }
}

/// On-disk shape: every key optional, merged over the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    work_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    elaboration_file: Option<String>,
    design_elaboration_file: Option<String>,
    #[serde(default)]
    artifacts: ArtifactOverrides,
    #[serde(default)]
    tools: BTreeMap<ToolName, ToolOverride>,
    #[serde(default)]
    viewers: ViewerOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArtifactOverrides {
    binary: Option<String>,
    waveform: Option<String>,
    waveform_compact: Option<String>,
    netlist: Option<String>,
    schematic_graph: Option<String>,
    schematic_image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolOverride {
    path: Option<String>,
    args: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ViewerOverrides {
    waveform: Option<String>,
    waveform_alt: Option<String>,
    image: Option<String>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl ForgeConfig {
    /// Parse a TOML document and merge it over the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text)?;
        let mut config = Self::default();
        config.merge(file);
        config.validate()?;
        Ok(config)
    }

    /// Resolve the configuration for a project rooted at `base_dir`.
    ///
    /// An explicit `path` must be readable. Without one, `hdlforge.toml` in
    /// `base_dir` is used when present. Environment overrides are applied
    /// last and a relative `work_dir` is anchored at `base_dir`.
    pub fn load(path: Option<&Path>, base_dir: &Path) -> Result<Self, ConfigError> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = base_dir.join(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        };

        let mut config = match candidate {
            Some(p) => {
                let text = std::fs::read_to_string(&p)
                    .map_err(|source| ConfigError::Read { path: p.clone(), source })?;
                tracing::debug!(path = %p.display(), "loaded config file");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        if config.work_dir.is_relative() {
            config.work_dir = base_dir.join(&config.work_dir);
        }
        Ok(config)
    }

    fn merge(&mut self, file: FileConfig) {
        set(&mut self.work_dir, file.work_dir);
        set(&mut self.timeout_secs, file.timeout_secs);
        set(&mut self.elaboration_file, file.elaboration_file);
        set(&mut self.design_elaboration_file, file.design_elaboration_file);

        let a = file.artifacts;
        set(&mut self.artifacts.binary, a.binary);
        set(&mut self.artifacts.waveform, a.waveform);
        set(&mut self.artifacts.waveform_compact, a.waveform_compact);
        set(&mut self.artifacts.netlist, a.netlist);
        set(&mut self.artifacts.schematic_graph, a.schematic_graph);
        set(&mut self.artifacts.schematic_image, a.schematic_image);

        for (name, over) in file.tools {
            if let Some(cmd) = self.tools.get_mut(&name) {
                set(&mut cmd.path, over.path);
                set(&mut cmd.args, over.args);
            }
        }

        let v = file.viewers;
        set(&mut self.viewers.waveform, v.waveform);
        set(&mut self.viewers.waveform_alt, v.waveform_alt);
        set(&mut self.viewers.image, v.image);
    }

    /// Apply `HDLFORGE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("HDLFORGE_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("HDLFORGE_TIMEOUT_SECS") {
            self.timeout_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "HDLFORGE_TIMEOUT_SECS".to_string(),
                reason: format!("not an integer: {raw:?}"),
            })?;
        }
        for name in ToolName::ALL {
            if let Some(path) = lookup(&name.env_key()) {
                if let Some(cmd) = self.tools.get_mut(&name) {
                    cmd.path = path;
                }
            }
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        for name in [&self.elaboration_file, &self.design_elaboration_file] {
            if name.is_empty() || Path::new(name).components().count() != 1 {
                return Err(ConfigError::InvalidValue {
                    key: "elaboration_file".to_string(),
                    reason: format!("must be a plain file name, got {name:?}"),
                });
            }
        }
        if let Some((name, _)) = self.tools.iter().find(|(_, c)| c.path.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: format!("tools.{name}.path"),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn tool(&self, name: ToolName) -> Option<&ToolCommand> {
        self.tools.get(&name)
    }

    /// Path of a file inside `work_dir`.
    pub fn work_path(&self, file_name: &str) -> PathBuf {
        self.work_dir.join(file_name)
    }

    pub fn elaboration_path(&self) -> PathBuf {
        self.work_path(&self.elaboration_file)
    }

    pub fn design_elaboration_path(&self) -> PathBuf {
        self.work_path(&self.design_elaboration_file)
    }
}
