//! Tool registry: logical tool names to executables.

use hdlforge_core::{ForgeConfig, ToolName};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Availability of one configured executable.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolAvailability {
    /// Logical name (`compile`, `viewer.waveform`, ...).
    pub tool: String,

    /// Configured executable.
    pub program: String,

    /// Resolved location, `None` when not found.
    pub resolved: Option<PathBuf>,
}

impl ToolAvailability {
    pub fn is_available(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Resolves configured tools against the filesystem and `PATH`.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    config: Arc<ForgeConfig>,
}

impl ToolRegistry {
    pub fn new(config: Arc<ForgeConfig>) -> Self {
        Self { config }
    }

    /// Configured executable for `tool`.
    pub fn program(&self, tool: ToolName) -> Option<&str> {
        self.config.tool(tool).map(|c| c.path.as_str())
    }

    /// Resolve `tool` to an executable path.
    pub fn resolve(&self, tool: ToolName) -> Option<PathBuf> {
        self.program(tool).and_then(resolve_program)
    }

    pub fn is_available(&self, tool: ToolName) -> bool {
        self.resolve(tool).is_some()
    }

    /// Availability of every configured tool and viewer.
    pub fn probe(&self) -> Vec<ToolAvailability> {
        let tools = ToolName::ALL.iter().filter_map(|name| {
            self.program(*name).map(|program| ToolAvailability {
                tool: name.to_string(),
                program: program.to_string(),
                resolved: resolve_program(program),
            })
        });

        let viewers = &self.config.viewers;
        let viewers = [
            ("viewer.waveform", &viewers.waveform),
            ("viewer.waveform_alt", &viewers.waveform_alt),
            ("viewer.image", &viewers.image),
        ]
        .into_iter()
        .map(|(tool, program)| ToolAvailability {
            tool: tool.to_string(),
            program: program.clone(),
            resolved: resolve_program(program),
        });

        tools.chain(viewers).collect()
    }
}

/// Bare names are searched on `PATH`; anything with a separator is checked
/// directly.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(tool: ToolName, path: &str) -> ToolRegistry {
        let mut config = ForgeConfig::default();
        if let Some(cmd) = config.tools.get_mut(&tool) {
            cmd.path = path.to_string();
        }
        ToolRegistry::new(Arc::new(config))
    }

    #[test]
    fn test_missing_absolute_path_is_unavailable() {
        let registry = registry_with(ToolName::Synthesize, "/nonexistent/bin/yosys");
        assert!(!registry.is_available(ToolName::Synthesize));
        assert_eq!(registry.program(ToolName::Synthesize), Some("/nonexistent/bin/yosys"));
    }

    #[cfg(unix)]
    #[test]
    fn test_path_lookup_finds_sh() {
        let registry = registry_with(ToolName::Lint, "sh");
        assert!(registry.is_available(ToolName::Lint));
    }

    #[test]
    fn test_probe_lists_tools_and_viewers() {
        let registry = registry_with(ToolName::Compile, "/nonexistent/iverilog");
        let probe = registry.probe();
        assert_eq!(probe.len(), ToolName::ALL.len() + 3);
        let compile = probe.iter().find(|t| t.tool == "compile").unwrap();
        assert!(!compile.is_available());
        assert!(probe.iter().any(|t| t.tool == "viewer.image"));
    }
}
