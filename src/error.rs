//! Error types for FlatDB
//!
//! This module defines all error types used throughout the database engine,
//! plus the diagnostic records accumulated by the compiler.

use std::fmt;

use thiserror::Error;

/// The main error type for FlatDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Scanner Errors ==========
    #[error("Linker error: source file '{0}' does not exist")]
    SourceFileMissing(String),

    // ========== Compiler Errors ==========
    #[error("Build failed: {0} error(s) generated")]
    BuildFailed(usize),

    // ========== Catalog Errors ==========
    #[error("Catalog error: schema '{0}' not found")]
    SchemaNotFound(String),

    #[error("Catalog error: relation '{0}' not found")]
    RelationNotFound(String),

    #[error("Catalog error: attribute '{0}' not found in relation '{1}'")]
    AttributeNotFound(String, String),

    #[error("Catalog error: relation '{0}' has no primary key")]
    MissingPrimaryKey(String),

    // ========== Type Errors ==========
    #[error("Type error: '{value}' is not a valid {type_name}")]
    InvalidLiteral { value: String, type_name: String },

    #[error("Type error: datatype '{0}' is not recognized")]
    UnknownDataType(String),

    #[error("Type error: constraint '{0}' is not recognized")]
    UnknownConstraint(String),

    // ========== Program (IR) Errors ==========
    #[error("Program error: unknown opcode '{0}'")]
    UnknownOpcode(String),

    #[error("Program error: malformed instruction '{0}'")]
    MalformedInstruction(String),

    // ========== Executor Errors ==========
    // The instruction stream is produced by the validated compiler, so these
    // indicate a broken internal invariant rather than a user mistake.
    #[error("Internal error: {0}")]
    InvariantViolation(String),

    #[error("Predicate error: {0}")]
    InvalidPredicate(String),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for FlatDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Severity of a compile-time diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One diagnostic produced while compiling a source file.
///
/// `line` is the 1-based line number in the original, pre-strip source text;
/// `source` carries that line's text when the scanner still has it.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: usize,
    pub message: String,
    pub source: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} at line {}: {}", label, self.line, self.message)?;
        if let Some(source) = &self.source {
            write!(f, "\n    {}", source.trim_end())?;
        }
        Ok(())
    }
}

/// Accumulator for compile-time diagnostics.
///
/// Errors are deduplicated per source line so one malformed statement does
/// not flood the report; warnings are kept as-is. Order of first occurrence
/// is preserved for both.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error for `line` unless one was already recorded there.
    pub fn error(&mut self, line: usize, message: impl Into<String>) {
        if self
            .entries
            .iter()
            .any(|d| d.severity == Severity::Error && d.line == line)
        {
            return;
        }
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            line,
            message: message.into(),
            source: None,
        });
    }

    pub fn warning(&mut self, line: usize, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            line,
            message: message.into(),
            source: None,
        });
    }

    /// Attach original source lines to diagnostics that do not carry one yet.
    /// `line_table` holds the pre-strip source, one entry per line.
    pub fn attach_sources(&mut self, line_table: &[String]) {
        for diagnostic in &mut self.entries {
            if diagnostic.source.is_none() && diagnostic.line >= 1 {
                diagnostic.source = line_table.get(diagnostic.line - 1).cloned();
            }
        }
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}
