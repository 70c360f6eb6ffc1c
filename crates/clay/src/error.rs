//! The single fatal error channel.
//!
//! Every failure the engine can produce — lexical, syntactic, resolution,
//! match, type, inference, primitive, external — flows through
//! [`CompileError`] and the [`CompileResult`] alias. There is no recoverable
//! error channel visible to user programs: errors propagate with `?` until
//! the driver renders the diagnostic and exits non-zero.
//!
//! Locations come from the location stack kept on the engine context: every
//! AST node whose location enters evaluation pushes it for the duration of
//! the walk, and an error captures the top non-empty location at the moment
//! it is raised.

use std::fmt;

use crate::source::Location;

/// Result alias used on every fallible engine path.
pub type CompileResult<T> = Result<T, CompileError>;

/// A fatal diagnostic: a message plus the location that was current when it
/// was raised.
#[derive(Debug)]
pub struct CompileError {
    pub message: String,
    pub location: Option<Location>,
}

impl CompileError {
    pub fn new(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    /// Formats the full diagnostic: the caret context window followed by
    /// `file(line,col): error: message`. Lines and columns are 1-based in
    /// the output.
    pub fn render(&self) -> String {
        match &self.location {
            Some(loc) => {
                let (line, column) = loc.line_col();
                format!(
                    "{}{}({},{}): error: {}",
                    loc.context_window(),
                    loc.source.file_name,
                    line + 1,
                    column + 1,
                    self.message
                )
            }
            None => format!("error: {}", self.message),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for CompileError {}
