//! Source file bookkeeping.
//!
//! The compiler records a source byte offset for every emitted instruction;
//! the debugger resolves those offsets back to 1-based line/column positions
//! through the [`SourceFile`] the program was compiled from.

use std::rc::Rc;

/// A position in source code (1-based line and column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Name of the source file ("" when unknown, e.g. inside a native call).
    pub filename: Rc<str>,
    /// 1-based line number; 0 means "no source position".
    pub line: u32,
    /// 1-based column number; 0 means "no source position".
    pub column: u32,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            filename: Rc::from(""),
            line: 0,
            column: 0,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

/// An immutable source file with a precomputed line index.
#[derive(Debug)]
pub struct SourceFile {
    name: Rc<str>,
    text: String,
    /// Byte offset of the start of each line.
    line_starts: Vec<u32>,
}

impl SourceFile {
    /// Create a source file and index its line starts.
    pub fn new(name: &str, text: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self {
            name: Rc::from(name),
            text: text.to_string(),
            line_starts,
        }
    }

    /// The file name this source was loaded from.
    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    /// The raw source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Resolve a byte offset to a 1-based position.
    ///
    /// Offsets past the end of the text clamp to the last line.
    pub fn position(&self, offset: u32) -> Position {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Position {
            filename: self.name.clone(),
            line: line_idx as u32 + 1,
            column: offset - self.line_starts[line_idx] + 1,
        }
    }

    /// The 1-based line containing a byte offset.
    pub fn line_of(&self, offset: u32) -> u32 {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => i as u32 + 1,
            Err(i) => i as u32,
        }
    }
}
