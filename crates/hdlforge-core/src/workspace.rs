//! Workspace store: source files, active slots and disk synchronization.
//!
//! [`WorkspaceState`] is the explicit session value holding every known
//! file and the active design/testbench pointers. [`WorkspaceStore`] owns
//! the operations on it; nothing here touches the disk implicitly, buffers
//! only reach their paths through [`WorkspaceStore::synchronize`],
//! [`WorkspaceStore::save`] or [`WorkspaceStore::save_all`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::config::ForgeConfig;
use crate::domain::{FileId, Language, Role, SourceFile};
use crate::error::{Result, WorkspaceError};

/// SHA-256 hex digest of a buffer.
pub fn content_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Every file the console knows about plus the active pair.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    files: BTreeMap<FileId, SourceFile>,
    active_design: Option<FileId>,
    active_testbench: Option<FileId>,
    /// Files whose role was set by hand and must survive re-opening.
    pinned: Vec<FileId>,
    next_id: u64,
}

impl WorkspaceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(&id)
    }

    pub fn active_id(&self, role: Role) -> Option<FileId> {
        match role {
            Role::Design => self.active_design,
            Role::Testbench => self.active_testbench,
        }
    }

    pub fn active(&self, role: Role) -> Option<&SourceFile> {
        self.active_id(role).and_then(|id| self.files.get(&id))
    }

    /// Look up a file by its stored path; see [`canonical_path`].
    pub fn find_by_path(&self, path: &Path) -> Option<FileId> {
        self.files
            .values()
            .find(|f| f.path.as_deref() == Some(path))
            .map(|f| f.id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn allocate_id(&mut self) -> FileId {
        self.next_id += 1;
        FileId(self.next_id)
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<FileId> {
        match role {
            Role::Design => &mut self.active_design,
            Role::Testbench => &mut self.active_testbench,
        }
    }

    /// Point the slot for `role` at `id`, clearing any other slot holding it.
    fn activate(&mut self, id: FileId, role: Role) {
        for other in [Role::Design, Role::Testbench] {
            let slot = self.slot_mut(other);
            if other != role && *slot == Some(id) {
                *slot = None;
            }
        }
        *self.slot_mut(role) = Some(id);
    }

    fn remove(&mut self, id: FileId) -> Option<SourceFile> {
        for role in [Role::Design, Role::Testbench] {
            let slot = self.slot_mut(role);
            if *slot == Some(id) {
                *slot = None;
            }
        }
        self.pinned.retain(|p| *p != id);
        self.files.remove(&id)
    }
}

const MODULE_TEMPLATE: &str = "\
module {name} (
    input wire clk,
    input wire rst,
    output reg [7:0] data_out
);

// Your code here

endmodule
";

const TESTBENCH_TEMPLATE: &str = "\
module {name};

    reg clk;
    reg rst;
    wire [7:0] data_out;

    // Instantiate DUT
    // your_module dut (
    //     .clk(clk),
    //     .rst(rst),
    //     .data_out(data_out)
    // );

    // Clock generation
    initial begin
        clk = 0;
        forever #5 clk = ~clk;
    end

    // VCD dump
    initial begin
        $dumpfile(\"dump.vcd\");
        $dumpvars(0, {name});
    end

    // Test stimulus
    initial begin
        rst = 1;
        #20 rst = 0;

        // Your test cases here

        #1000 $finish;
    end

endmodule
";

/// Boilerplate offered when authoring a new file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    #[default]
    Empty,
    Module,
    Testbench,
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Template::Empty => "empty",
            Template::Module => "module",
            Template::Testbench => "testbench",
        }
    }

    /// Render the template for a module named `module_name`.
    pub fn render(&self, module_name: &str) -> String {
        match self {
            Template::Empty => String::new(),
            Template::Module => MODULE_TEMPLATE.replace("{name}", module_name),
            Template::Testbench => TESTBENCH_TEMPLATE.replace("{name}", module_name),
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Template {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empty" => Ok(Template::Empty),
            "module" | "module-skeleton" => Ok(Template::Module),
            "testbench" | "testbench-skeleton" => Ok(Template::Testbench),
            other => Err(format!("unknown template: {other}")),
        }
    }
}

/// A file that could not be written during synchronization.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of flushing buffers to disk.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    /// Source files written because their buffer changed.
    pub written: Vec<PathBuf>,

    /// Source files whose buffer already matched the disk.
    pub unchanged: Vec<PathBuf>,

    /// Active roles backed by an unsaved buffer (no path).
    pub unsaved: Vec<Role>,

    pub failures: Vec<SyncFailure>,

    /// Combined design + testbench file, when any active file exists.
    pub elaboration: Option<PathBuf>,

    /// Design-only file, when a design is active.
    pub design_elaboration: Option<PathBuf>,

    /// Digest identifying the synchronized buffers.
    pub digest: String,
}

impl SyncReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Operations over a [`WorkspaceState`].
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    config: Arc<ForgeConfig>,
}

impl WorkspaceStore {
    pub fn new(config: Arc<ForgeConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Read `path`, classify it and make it active for its role.
    ///
    /// Paths are matched after [`canonical_path`], so any spelling of a
    /// known file selects the existing entry. Re-opening refreshes a clean
    /// buffer from disk and keeps unsaved edits. A role set by hand through
    /// [`WorkspaceStore::set_role`] is kept.
    pub fn open(&self, state: &mut WorkspaceState, path: &Path) -> Result<FileId> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => WorkspaceError::NotFound(path.to_path_buf()),
            _ => WorkspaceError::io(path, e),
        })?;
        let canonical = canonical_path(path);
        let path = canonical.as_path();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let classified = classify(&filename, Some(&content));
        let digest = content_digest(&content);

        let id = match state.find_by_path(path) {
            Some(id) => {
                let pinned = state.pinned.contains(&id);
                if let Some(file) = state.files.get_mut(&id) {
                    if !pinned {
                        file.role = classified;
                    }
                    if !file.is_dirty() {
                        file.buffer = content;
                    }
                    file.disk_digest = Some(digest);
                }
                id
            }
            None => {
                let id = state.allocate_id();
                state.files.insert(
                    id,
                    SourceFile {
                        id,
                        path: Some(path.to_path_buf()),
                        role: classified,
                        language: Language::from_path(path),
                        buffer: content,
                        disk_digest: Some(digest),
                    },
                );
                id
            }
        };

        let role = state.files[&id].role;
        state.activate(id, role);
        info!(path = %path.display(), role = %role, "opened source file");
        Ok(id)
    }

    /// Create an unsaved buffer and make it active for `role`.
    pub fn scratch(&self, state: &mut WorkspaceState, role: Role, language: Language) -> FileId {
        let id = state.allocate_id();
        state.files.insert(
            id,
            SourceFile {
                id,
                path: None,
                role,
                language,
                buffer: String::new(),
                disk_digest: None,
            },
        );
        state.activate(id, role);
        id
    }

    /// Replace the buffer of the active file for `role`. No disk I/O.
    pub fn edit(
        &self,
        state: &mut WorkspaceState,
        role: Role,
        text: impl Into<String>,
    ) -> Result<()> {
        let id = state.active_id(role).ok_or(WorkspaceError::NoActiveFile(role))?;
        let file = state
            .files
            .get_mut(&id)
            .ok_or(WorkspaceError::NoActiveFile(role))?;
        file.buffer = text.into();
        Ok(())
    }

    /// Override the role of a file; authoritative until [`WorkspaceStore::reclassify`].
    pub fn set_role(&self, state: &mut WorkspaceState, id: FileId, role: Role) -> Result<()> {
        let file = state.files.get_mut(&id).ok_or_else(|| missing(id))?;
        file.role = role;
        if !state.pinned.contains(&id) {
            state.pinned.push(id);
        }
        state.activate(id, role);
        Ok(())
    }

    /// Drop any manual override and classify the file again.
    pub fn reclassify(&self, state: &mut WorkspaceState, id: FileId) -> Result<Role> {
        let file = state.files.get_mut(&id).ok_or_else(|| missing(id))?;
        let name = file
            .path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let role = classify(&name, Some(&file.buffer));
        file.role = role;
        state.pinned.retain(|p| *p != id);
        if state.active_id(Role::Design) == Some(id)
            || state.active_id(Role::Testbench) == Some(id)
        {
            state.activate(id, role);
        }
        Ok(role)
    }

    /// Flush changed active buffers and emit the elaboration files.
    ///
    /// A failed write is recorded in the report and the remaining files
    /// are still written.
    pub fn synchronize(&self, state: &mut WorkspaceState) -> SyncReport {
        let mut report = SyncReport::default();

        for role in [Role::Design, Role::Testbench] {
            let Some(id) = state.active_id(role) else {
                continue;
            };
            let Some(file) = state.files.get_mut(&id) else {
                continue;
            };
            let Some(path) = file.path.clone() else {
                warn!(role = %role, "active buffer has no path, not written");
                report.unsaved.push(role);
                continue;
            };
            if !file.is_dirty() {
                report.unchanged.push(path);
                continue;
            }
            match std::fs::write(&path, &file.buffer) {
                Ok(()) => {
                    file.disk_digest = Some(content_digest(&file.buffer));
                    report.written.push(path);
                }
                Err(e) => report.failures.push(SyncFailure {
                    path,
                    error: e.to_string(),
                }),
            }
        }

        let design = state.active(Role::Design).map(|f| f.buffer.as_str());
        let testbench = state.active(Role::Testbench).map(|f| f.buffer.as_str());
        let combined = match (design, testbench) {
            (Some(d), Some(t)) => Some(format!("{d}\n\n{t}")),
            (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
            (None, None) => None,
        };

        let mut hasher = Sha256::new();
        hasher.update(combined.as_deref().unwrap_or_default().as_bytes());
        hasher.update(b"\0");
        hasher.update(design.unwrap_or_default().as_bytes());
        report.digest = hex::encode(hasher.finalize());

        if combined.is_some() {
            if let Err(e) = std::fs::create_dir_all(&self.config.work_dir) {
                report.failures.push(SyncFailure {
                    path: self.config.work_dir.clone(),
                    error: e.to_string(),
                });
                return report;
            }
        }

        if let Some(text) = combined {
            let path = self.config.elaboration_path();
            match std::fs::write(&path, text) {
                Ok(()) => report.elaboration = Some(path),
                Err(e) => report.failures.push(SyncFailure {
                    path,
                    error: e.to_string(),
                }),
            }
        }
        if let Some(text) = design {
            let path = self.config.design_elaboration_path();
            match std::fs::write(&path, text) {
                Ok(()) => report.design_elaboration = Some(path),
                Err(e) => report.failures.push(SyncFailure {
                    path,
                    error: e.to_string(),
                }),
            }
        }

        debug!(
            written = report.written.len(),
            failures = report.failures.len(),
            digest = %report.digest,
            "workspace synchronized"
        );
        report
    }

    /// Write the active file for `role` to its path.
    pub fn save(&self, state: &mut WorkspaceState, role: Role) -> Result<PathBuf> {
        let id = state.active_id(role).ok_or(WorkspaceError::NoActiveFile(role))?;
        write_file(state, id)
    }

    /// Write every file that has a path. Returns the failures.
    pub fn save_all(&self, state: &mut WorkspaceState) -> Vec<WorkspaceError> {
        let ids: Vec<FileId> = state
            .files
            .values()
            .filter(|f| f.path.is_some())
            .map(|f| f.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| write_file(state, id).err())
            .collect()
    }

    /// Author a new file from a template and open it.
    pub fn create(
        &self,
        state: &mut WorkspaceState,
        path: &Path,
        template: Template,
    ) -> Result<FileId> {
        if path.exists() {
            return Err(WorkspaceError::AlreadyExists(path.to_path_buf()));
        }
        let module_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "top".to_string());
        let content = template.render(&module_name);

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        let write = options.open(path).and_then(|mut f| {
            use std::io::Write;
            f.write_all(content.as_bytes())
        });
        if let Err(e) = write {
            return Err(match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    WorkspaceError::AlreadyExists(path.to_path_buf())
                }
                _ => WorkspaceError::io(path, e),
            });
        }
        info!(path = %path.display(), template = %template, "created source file");
        self.open(state, path)
    }

    /// Rename a file within its directory. Returns the new path.
    pub fn rename(
        &self,
        state: &mut WorkspaceState,
        old: &Path,
        new_name: &str,
    ) -> Result<PathBuf> {
        let single = matches!(
            Path::new(new_name).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        );
        if !single {
            return Err(WorkspaceError::InvalidName(new_name.to_string()));
        }
        if !old.exists() {
            return Err(WorkspaceError::NotFound(old.to_path_buf()));
        }
        let old = canonical_path(old);
        let new_path = old.with_file_name(new_name);
        if new_path.exists() {
            return Err(WorkspaceError::AlreadyExists(new_path));
        }
        std::fs::rename(&old, &new_path).map_err(|e| WorkspaceError::io(&old, e))?;
        let new_path = canonical_path(&new_path);

        if let Some(id) = state.find_by_path(&old) {
            if let Some(file) = state.files.get_mut(&id) {
                file.language = Language::from_path(&new_path);
                file.path = Some(new_path.clone());
            }
        }
        info!(from = %old.display(), to = %new_path.display(), "renamed source file");
        Ok(new_path)
    }

    /// Delete a file from disk and drop it from the workspace.
    pub fn delete(&self, state: &mut WorkspaceState, path: &Path) -> Result<()> {
        let known = state.find_by_path(&canonical_path(path));
        if !path.exists() {
            if let Some(id) = known {
                state.remove(id);
            }
            return Err(WorkspaceError::NotFound(path.to_path_buf()));
        }
        std::fs::remove_file(path).map_err(|e| WorkspaceError::io(path, e))?;
        if let Some(id) = known {
            state.remove(id);
        }
        info!(path = %path.display(), "deleted source file");
        Ok(())
    }
}

/// Resolve `path` to the single spelling the workspace stores.
///
/// A file that no longer exists is resolved through its parent directory;
/// when that fails too the path is kept as given.
pub fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            std::fs::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

fn missing(id: FileId) -> WorkspaceError {
    WorkspaceError::NotFound(PathBuf::from(id.to_string()))
}

fn write_file(state: &mut WorkspaceState, id: FileId) -> Result<PathBuf> {
    let file = state.files.get_mut(&id).ok_or_else(|| missing(id))?;
    let path = file
        .path
        .clone()
        .ok_or_else(|| WorkspaceError::NotFound(PathBuf::from(file.label())))?;
    std::fs::write(&path, &file.buffer).map_err(|e| WorkspaceError::io(&path, e))?;
    file.disk_digest = Some(content_digest(&file.buffer));
    Ok(path)
}
