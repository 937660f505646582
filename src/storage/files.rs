//! Line-oriented file primitives
//!
//! Every persisted artifact in FlatDB (relation files, RID counters, the
//! attribute registry, compiled programs) is a newline-delimited text file.
//! These helpers open, fully read or fully rewrite, and close a file within
//! one call, so no handle ever outlives a single operation.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::Result;

pub fn file_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}

pub fn dir_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_dir()
}

pub fn read_all_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(line?);
    }
    Ok(lines)
}

/// Overwrite `path` with `lines`, one per line.
pub fn write_all_lines(path: impl AsRef<Path>, lines: &[String]) -> Result<()> {
    let mut file = File::create(path.as_ref())?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    Ok(())
}

pub fn append_line(path: impl AsRef<Path>, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Remove the first line equal to `line`, rewriting the file.
pub fn delete_line(path: impl AsRef<Path>, line: &str) -> Result<()> {
    let mut lines = read_all_lines(path.as_ref())?;
    if let Some(position) = lines.iter().position(|l| l == line) {
        lines.remove(position);
        write_all_lines(path, &lines)?;
    }
    Ok(())
}

/// Read the 0-based `index`th line, if present.
pub fn read_line_at(path: impl AsRef<Path>, index: usize) -> Result<Option<String>> {
    let lines = read_all_lines(path)?;
    Ok(lines.into_iter().nth(index))
}

/// Create an empty file; truncates if it already exists.
pub fn create_file(path: impl AsRef<Path>) -> Result<()> {
    File::create(path.as_ref())?;
    Ok(())
}

/// Create a directory and any missing parents; no-op if already present.
pub fn create_directory(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref())?;
    Ok(())
}
