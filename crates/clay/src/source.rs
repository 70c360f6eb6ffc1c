//! Source buffers and byte-offset locations.
//!
//! A [`Source`] is an immutable, reference-counted text buffer (a file on
//! disk or an in-memory module such as `__primitives__`). A [`Location`] is
//! a cheap `(source, byte offset)` pair attached to tokens and AST nodes;
//! line/column numbers are computed only when a diagnostic is rendered.

use std::{fmt, rc::Rc};

/// An immutable source buffer with the name it was loaded under.
pub struct Source {
    pub file_name: String,
    pub text: String,
}

impl Source {
    pub fn new(file_name: impl Into<String>, text: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            file_name: file_name.into(),
            text: text.into(),
        })
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("file_name", &self.file_name)
            .field("len", &self.text.len())
            .finish()
    }
}

/// A position inside a [`Source`], kept as a byte offset.
#[derive(Clone, Debug)]
pub struct Location {
    pub source: Rc<Source>,
    pub offset: usize,
}

impl Location {
    pub fn new(source: &Rc<Source>, offset: usize) -> Self {
        Self {
            source: Rc::clone(source),
            offset,
        }
    }

    /// Computes the 0-based line and column of this location.
    pub fn line_col(&self) -> (usize, usize) {
        let mut line = 0;
        let mut column = 0;
        for byte in self.source.text.as_bytes()[..self.offset].iter().copied() {
            column += 1;
            if byte == b'\n' {
                line += 1;
                column = 0;
            }
        }
        (line, column)
    }

    /// Renders the ±2-line context window with a caret under the offending
    /// column, as shown before every diagnostic.
    pub fn context_window(&self) -> String {
        let (line, column) = self.line_col();
        let lines: Vec<&str> = self.source.text.split_inclusive('\n').collect();
        let mut out = String::new();
        out.push_str("###############################\n");
        let lo = line.saturating_sub(2);
        for (i, text) in lines.iter().enumerate().skip(lo).take(line + 3 - lo) {
            out.push_str(text);
            if !text.ends_with('\n') {
                out.push('\n');
            }
            if i == line {
                for _ in 0..column {
                    out.push('-');
                }
                out.push_str("^\n");
            }
        }
        out.push_str("###############################\n");
        out
    }
}
