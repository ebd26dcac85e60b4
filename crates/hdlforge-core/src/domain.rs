//! Source file domain types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Role a source file plays in the active pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The hardware module under development.
    Design,

    /// The stimulus harness driving the design.
    Testbench,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Design => "design",
            Role::Testbench => "testbench",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source language, inferred from the file extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Verilog,
    SystemVerilog,
}

impl Language {
    /// `.sv` and `.svh` are SystemVerilog; everything else is treated as Verilog.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("sv") | Some("svh") => Language::SystemVerilog,
            _ => Language::Verilog,
        }
    }
}

/// Stable handle for a file in the workspace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// A design or testbench file with its editable buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub id: FileId,

    /// On-disk location; `None` for an unsaved scratch buffer.
    pub path: Option<PathBuf>,

    pub role: Role,

    pub language: Language,

    /// Current editable text, independent of the on-disk content.
    pub buffer: String,

    /// Digest of the content last read from or written to `path`.
    pub(crate) disk_digest: Option<String>,
}

impl SourceFile {
    /// Display label used for pane and tab titles.
    pub fn label(&self) -> String {
        match &self.path {
            Some(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string()),
            None => format!("untitled {}", self.role),
        }
    }

    /// Whether the buffer differs from the last known on-disk content.
    pub fn is_dirty(&self) -> bool {
        match &self.disk_digest {
            Some(d) => *d != crate::workspace::content_digest(&self.buffer),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_path(Path::new("top.sv")), Language::SystemVerilog);
        assert_eq!(Language::from_path(Path::new("pkg.SVH")), Language::SystemVerilog);
        assert_eq!(Language::from_path(Path::new("adder.v")), Language::Verilog);
        assert_eq!(Language::from_path(Path::new("Makefile")), Language::Verilog);
    }

    #[test]
    fn test_label_uses_file_name() {
        let file = SourceFile {
            id: FileId(1),
            path: Some(PathBuf::from("/tmp/rtl/adder.v")),
            role: Role::Design,
            language: Language::Verilog,
            buffer: String::new(),
            disk_digest: None,
        };
        assert_eq!(file.label(), "adder.v");
    }

    #[test]
    fn test_label_for_unsaved_buffer() {
        let file = SourceFile {
            id: FileId(2),
            path: None,
            role: Role::Testbench,
            language: Language::SystemVerilog,
            buffer: String::new(),
            disk_digest: None,
        };
        assert_eq!(file.label(), "untitled testbench");
        assert!(file.is_dirty());
    }
}
