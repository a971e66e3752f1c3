// src/core/symbols/mod.rs
//! Symbol introspection: the file, text and document-symbol view of a source tree
//!
//! Discovery never reads files itself. It asks a `SymbolProvider` for the files
//! matching a glob, for a line/character addressable view of each file, and for the
//! declaration tree (types with their nested members).

mod java;

pub use java::{JavaSymbolProvider, parse_java, TYPE_DECLARATION_KINDS};
pub(crate) use java::{node_range, node_text, parse_blocking};

use std::fmt;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Zero-based line and zero-based byte column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// Range between two positions; `contains` includes both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    /// Line span, used to pick the innermost of several enclosing ranges
    pub fn line_span(&self) -> usize {
        self.end.line.saturating_sub(self.start.line)
    }
}

/// A file plus a position inside it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub position: Position,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, position: Position) -> Self {
        Self {
            file: file.into(),
            position,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file.display(),
            self.position.line + 1,
            self.position.character + 1
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Class,
    Interface,
    Enum,
    Record,
    Method,
    Constructor,
    Field,
}

impl SymbolKind {
    pub fn is_type(&self) -> bool {
        matches!(self, Self::Class | Self::Interface | Self::Enum | Self::Record)
    }
}

/// One declaration in a file, with its nested declarations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Whole declaration, modifiers and body included
    pub full_range: Range,
    /// The name token
    pub selection_range: Range,
    pub children: Vec<DocumentSymbol>,
}

/// Line/character addressable view of a file's text
#[derive(Debug, Clone)]
pub struct TextDocument {
    text: String,
    line_starts: Vec<usize>,
}

impl TextDocument {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (offset, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        Self { text, line_starts }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Text between two positions; positions past the end clamp to the document bounds
    pub fn text_in_range(&self, range: Range) -> &str {
        let start = self.offset_of(range.start);
        let end = self.offset_of(range.end).max(start);
        &self.text[start..end]
    }

    fn offset_of(&self, position: Position) -> usize {
        let Some(&line_start) = self.line_starts.get(position.line) else {
            return self.text.len();
        };
        let line_end = self
            .line_starts
            .get(position.line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());

        let mut offset = (line_start + position.character).min(line_end);
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }
}

/// Provides files, text and declaration trees for a source corpus
#[async_trait]
pub trait SymbolProvider: Send + Sync {
    /// Files under the provider's root matching a glob such as `**/*.java`
    async fn list_files(&self, glob: &str) -> Result<Vec<PathBuf>>;

    async fn open_document(&self, file: &Path) -> Result<TextDocument>;

    /// Top-level declarations of a file, members nested as children
    async fn document_symbols(&self, file: &Path) -> Result<Vec<DocumentSymbol>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_in_range_spans_lines() {
        let doc = TextDocument::new("@RestController\npublic class C {\n}\n");
        let text = doc.text_in_range(Range::new(Position::new(0, 0), Position::new(1, 13)));
        assert_eq!(text, "@RestController\npublic class ");
    }

    #[test]
    fn test_text_in_range_clamps_past_end() {
        let doc = TextDocument::new("abc\ndef");
        assert_eq!(doc.line_count(), 2);
        assert_eq!(doc.text_in_range(Range::new(Position::new(0, 10), Position::new(9, 0))), "\ndef");
    }

    #[test]
    fn test_text_in_range_respects_char_boundaries() {
        let doc = TextDocument::new("/* ü */ x");
        // byte 4 is inside the two-byte ü
        assert_eq!(doc.text_in_range(Range::new(Position::new(0, 0), Position::new(0, 4))), "/* ");
    }

    #[test]
    fn test_location_display_is_one_based() {
        let location = SourceLocation::new("src/A.java", Position::new(4, 2));
        assert_eq!(location.to_string(), "src/A.java:5:3");
    }
}
