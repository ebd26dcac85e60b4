//! Stage-to-command mapping.
//!
//! Turns the configured argument templates into concrete arguments and
//! lists the artifacts each step must leave behind.

use hdlforge_core::{ForgeConfig, ToolName};
use std::path::{Path, PathBuf};

use crate::stage::{ArtifactKind, ArtifactRecord, Stage};

/// Values substituted for `{placeholder}` tokens in argument templates.
#[derive(Debug, Clone)]
pub struct Placeholders {
    pairs: Vec<(&'static str, String)>,
}

impl Placeholders {
    pub fn from_config(config: &ForgeConfig) -> Self {
        let a = &config.artifacts;
        let graph = config.work_path(&a.schematic_graph);
        // yosys `show -prefix` appends `.dot` itself.
        let prefix = graph.with_extension("");

        let pairs = vec![
            ("work_dir", display(&config.work_dir)),
            ("sources", display(&config.elaboration_path())),
            ("design", display(&config.design_elaboration_path())),
            ("binary", display(&config.work_path(&a.binary))),
            ("waveform", display(&config.work_path(&a.waveform))),
            ("waveform_compact", display(&config.work_path(&a.waveform_compact))),
            ("netlist", display(&config.work_path(&a.netlist))),
            ("schematic_graph", display(&graph)),
            ("schematic_prefix", display(&prefix)),
            ("schematic_image", display(&config.work_path(&a.schematic_image))),
        ];
        Self { pairs }
    }

    /// Expand every known placeholder in `template`; unknown ones stay verbatim.
    pub fn expand(&self, template: &str) -> String {
        let mut out = template.to_string();
        for (key, value) in &self.pairs {
            let token = format!("{{{key}}}");
            if out.contains(&token) {
                out = out.replace(&token, value);
            }
        }
        out
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// One tool call within a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub tool: ToolName,

    /// Expanded arguments.
    pub args: Vec<String>,

    /// Files that must exist after this step exits 0.
    pub produces: Vec<ArtifactRecord>,
}

/// Steps and artifacts for one stage under a given configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: Stage,

    pub steps: Vec<Step>,

    /// Recorded when present after success, never required.
    pub optional: Vec<ArtifactRecord>,
}

impl StagePlan {
    pub fn for_stage(stage: Stage, config: &ForgeConfig) -> Self {
        let vars = Placeholders::from_config(config);
        let a = &config.artifacts;
        let artifact = |kind, name: &str| ArtifactRecord::new(kind, config.work_path(name), stage);

        let steps = stage
            .tools()
            .iter()
            .map(|tool| {
                let args = config
                    .tool(*tool)
                    .map(|c| c.args.iter().map(|t| vars.expand(t)).collect::<Vec<_>>())
                    .unwrap_or_default();
                let produces = match tool {
                    ToolName::Compile => vec![artifact(ArtifactKind::CompiledBinary, &a.binary)],
                    ToolName::Synthesize => vec![artifact(ArtifactKind::Netlist, &a.netlist)],
                    ToolName::SchematicGraph => {
                        vec![artifact(ArtifactKind::SchematicGraph, &a.schematic_graph)]
                    }
                    ToolName::Schematic => {
                        vec![artifact(ArtifactKind::SchematicImage, &a.schematic_image)]
                    }
                    ToolName::Waveform => {
                        vec![artifact(ArtifactKind::CompactWaveform, &a.waveform_compact)]
                    }
                    ToolName::Simulate | ToolName::Lint => Vec::new(),
                };
                Step {
                    tool: *tool,
                    args,
                    produces,
                }
            })
            .collect();

        let optional = match stage {
            Stage::Simulate => vec![artifact(ArtifactKind::Waveform, &a.waveform)],
            _ => Vec::new(),
        };

        Self {
            stage,
            steps,
            optional,
        }
    }

    /// Every artifact the stage must produce.
    pub fn required(&self) -> impl Iterator<Item = &ArtifactRecord> {
        self.steps.iter().flat_map(|s| s.produces.iter())
    }

    /// Paths removed before the stage runs so stale files are never trusted.
    pub fn stale_paths(&self) -> Vec<PathBuf> {
        self.required()
            .chain(self.optional.iter())
            .map(|r| r.path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ForgeConfig {
        ForgeConfig {
            work_dir: PathBuf::from("/w"),
            ..ForgeConfig::default()
        }
    }

    #[test]
    fn test_expand_known_and_unknown_placeholders() {
        let vars = Placeholders::from_config(&config());
        assert_eq!(vars.expand("{binary}"), "/w/design.vvp");
        assert_eq!(vars.expand("-o{netlist}"), "-o/w/synth.v");
        assert_eq!(vars.expand("{nope}"), "{nope}");
        assert_eq!(vars.expand("{schematic_prefix}"), "/w/schematic");
    }

    #[test]
    fn test_compile_plan() {
        let plan = StagePlan::for_stage(Stage::Compile, &config());
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(
            plan.steps[0].args,
            vec!["-g2012", "-o", "/w/design.vvp", "/w/top_active.sv"]
        );
        let required: Vec<_> = plan.required().collect();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0].kind, ArtifactKind::CompiledBinary);
        assert_eq!(required[0].produced_by, Stage::Compile);
    }

    #[test]
    fn test_schematic_plan_has_graph_then_image() {
        let plan = StagePlan::for_stage(Stage::Schematic, &config());
        let tools: Vec<_> = plan.steps.iter().map(|s| s.tool).collect();
        assert_eq!(tools, vec![ToolName::SchematicGraph, ToolName::Schematic]);
        assert!(plan.steps[0].args[1].contains("-prefix /w/schematic"));
        assert!(plan.steps[0].args[1].contains("read_verilog -sv /w/design_active.sv"));
        assert_eq!(plan.steps[1].produces[0].kind, ArtifactKind::SchematicImage);
    }

    #[test]
    fn test_simulate_waveform_is_optional() {
        let plan = StagePlan::for_stage(Stage::Simulate, &config());
        assert_eq!(plan.required().count(), 0);
        assert_eq!(plan.optional[0].path, PathBuf::from("/w/dump.vcd"));
        assert_eq!(plan.stale_paths(), vec![PathBuf::from("/w/dump.vcd")]);
    }
}
