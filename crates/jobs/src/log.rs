//! Append-only job log files.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Append one line to the log at `path`, creating the file if needed.
pub fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
