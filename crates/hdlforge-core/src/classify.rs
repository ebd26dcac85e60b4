//! Filename-first role classification.

use std::path::Path;

use crate::domain::Role;

/// Lower-cased filename fragments that mark a testbench.
const TESTBENCH_MARKERS: [&str; 5] = ["tb_", "_tb", ".tb", "test", "testbench"];

/// Prefix shared by the waveform dump system tasks (`$dumpfile`, `$dumpvars`).
const DUMP_DIRECTIVE: &str = "$dump";

/// Classify a file as design or testbench.
///
/// The filename is checked first; the content sample is only consulted
/// when the name carries no testbench marker.
pub fn classify(filename: &str, content_sample: Option<&str>) -> Role {
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| filename.to_lowercase());

    if TESTBENCH_MARKERS.iter().any(|m| name.contains(m)) {
        return Role::Testbench;
    }

    match content_sample {
        Some(text) if text.contains(DUMP_DIRECTIVE) => Role::Testbench,
        _ => Role::Design,
    }
}
