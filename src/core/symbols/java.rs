// src/core/symbols/java.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

use crate::error::{RoutetraceError, Result};
use super::{DocumentSymbol, Position, Range, SymbolKind, SymbolProvider, TextDocument};

/// Tree-sitter node kinds that declare a type
pub const TYPE_DECLARATION_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

/// Parse Java source with a fresh tree-sitter parser
pub fn parse_java(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    let java_language = tree_sitter_java::language();
    parser.set_language(&java_language)
        .map_err(|e| RoutetraceError::Parser(format!("Failed to set Java language: {}", e)))?;

    parser.parse(source, None)
        .ok_or_else(|| RoutetraceError::Parser("Failed to parse Java code".to_string()))
}

/// Extract text content of a node
pub(crate) fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

pub(crate) fn node_range(node: Node) -> Range {
    let start = node.start_position();
    let end = node.end_position();
    Range::new(
        Position::new(start.row, start.column),
        Position::new(end.row, end.column),
    )
}

/// Symbol provider over a directory of Java sources
///
/// Each file is read from disk once per provider; later requests share the text.
pub struct JavaSymbolProvider {
    root: PathBuf,
    max_file_size: usize,
    sources: Mutex<HashMap<PathBuf, Arc<str>>>,
}

impl JavaSymbolProvider {
    pub fn new(root: impl Into<PathBuf>, max_file_size: usize) -> Self {
        Self {
            root: root.into(),
            max_file_size,
            sources: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Source text of `file`, from the cache when it was read before
    pub async fn source(&self, file: &Path) -> Result<Arc<str>> {
        if let Some(cached) = self.cached(file) {
            return Ok(cached);
        }

        let metadata = tokio::fs::metadata(file).await?;
        if metadata.len() as usize > self.max_file_size {
            return Err(RoutetraceError::Parser(
                format!("File {} exceeds maximum size limit", file.display())
            ));
        }
        let source: Arc<str> = tokio::fs::read_to_string(file).await?.into();

        if let Ok(mut sources) = self.sources.lock() {
            sources.insert(file.to_path_buf(), source.clone());
        }
        Ok(source)
    }

    fn cached(&self, file: &Path) -> Option<Arc<str>> {
        self.sources.lock().ok()?.get(file).cloned()
    }

    /// Declaration tree of one Java source text
    pub fn symbols_in_source(&self, source: &str) -> Result<Vec<DocumentSymbol>> {
        declarations(source)
    }
}

/// Parse on the blocking pool so a large file never stalls the runtime threads
pub async fn parse_blocking<T, F>(source: Arc<str>, parse: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&str) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || parse(&source))
        .await
        .map_err(|e| RoutetraceError::Parser(format!("Parse task failed: {}", e)))?
}

fn declarations(source: &str) -> Result<Vec<DocumentSymbol>> {
    let tree = parse_java(source)?;

    let mut symbols = Vec::new();
    collect_types(tree.root_node(), source, &mut symbols);
    Ok(symbols)
}

/// Walk children looking for type declarations
fn collect_types(node: Node, source: &str, symbols: &mut Vec<DocumentSymbol>) {
    let mut cursor = node.walk();

    for child in node.children(&mut cursor) {
        if let Some(kind) = type_kind(child.kind()) {
            if let Some(symbol) = type_symbol(child, kind, source) {
                symbols.push(symbol);
            }
        } else {
            // Declarations can hide under ERROR nodes in partially broken files
            collect_types(child, source, symbols);
        }
    }
}

fn type_symbol(node: Node, kind: SymbolKind, source: &str) -> Option<DocumentSymbol> {
    let name_node = node.child_by_field_name("name")?;

    let mut children = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        collect_members(body, source, &mut children);
    }

    Some(DocumentSymbol {
        name: node_text(name_node, source).to_string(),
        kind,
        full_range: node_range(node),
        selection_range: node_range(name_node),
        children,
    })
}

fn collect_members(body: Node, source: &str, members: &mut Vec<DocumentSymbol>) {
    let mut cursor = body.walk();

    for child in body.children(&mut cursor) {
        match child.kind() {
            "method_declaration" | "constructor_declaration" => {
                let kind = if child.kind() == "method_declaration" {
                    SymbolKind::Method
                } else {
                    SymbolKind::Constructor
                };
                if let Some(name_node) = child.child_by_field_name("name") {
                    members.push(DocumentSymbol {
                        name: node_text(name_node, source).to_string(),
                        kind,
                        full_range: node_range(child),
                        selection_range: node_range(name_node),
                        children: vec![],
                    });
                }
            }
            "field_declaration" => {
                let name_node = child
                    .child_by_field_name("declarator")
                    .and_then(|declarator| declarator.child_by_field_name("name"));
                if let Some(name_node) = name_node {
                    members.push(DocumentSymbol {
                        name: node_text(name_node, source).to_string(),
                        kind: SymbolKind::Field,
                        full_range: node_range(child),
                        selection_range: node_range(name_node),
                        children: vec![],
                    });
                }
            }
            // Enum members other than constants live one level down
            "enum_body_declarations" => collect_members(child, source, members),
            other => {
                if let Some(kind) = type_kind(other) {
                    if let Some(nested) = type_symbol(child, kind, source) {
                        members.push(nested);
                    }
                }
            }
        }
    }
}

fn type_kind(node_kind: &str) -> Option<SymbolKind> {
    match node_kind {
        "class_declaration" => Some(SymbolKind::Class),
        "interface_declaration" => Some(SymbolKind::Interface),
        "enum_declaration" => Some(SymbolKind::Enum),
        "record_declaration" => Some(SymbolKind::Record),
        _ => None,
    }
}

#[async_trait]
impl SymbolProvider for JavaSymbolProvider {
    async fn list_files(&self, glob: &str) -> Result<Vec<PathBuf>> {
        let mut overrides = OverrideBuilder::new(&self.root);
        overrides.add(glob)
            .map_err(|e| RoutetraceError::FileSystem(format!("Invalid glob '{}': {}", glob, e)))?;
        let overrides = overrides.build()
            .map_err(|e| RoutetraceError::FileSystem(e.to_string()))?;

        // Use ignore crate to respect .gitignore
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .overrides(overrides)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| RoutetraceError::FileSystem(e.to_string()))?;
            if entry.file_type().map_or(false, |t| t.is_file()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        debug!("Matched {} files for '{}' under {}", files.len(), glob, self.root.display());
        Ok(files)
    }

    async fn open_document(&self, file: &Path) -> Result<TextDocument> {
        Ok(TextDocument::new(self.source(file).await?.as_ref()))
    }

    async fn document_symbols(&self, file: &Path) -> Result<Vec<DocumentSymbol>> {
        let source = self.source(file).await?;
        parse_blocking(source, declarations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    const CONTROLLER: &str = r#"package com.acme.web;

@RestController
@RequestMapping("/api/users")
public class UserController {
    private final UserService userService;

    public UserController(UserService userService) {
        this.userService = userService;
    }

    @GetMapping("/{id}")
    public User get(@PathVariable long id) {
        return userService.find(id);
    }

    static class Helper {
        void help() {}
    }
}
"#;

    #[tokio::test]
    async fn test_document_symbols_nest_members_under_types() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("UserController.java");
        file.write_str(CONTROLLER).unwrap();

        let provider = JavaSymbolProvider::new(dir.path(), 1024 * 1024);
        let symbols = provider.document_symbols(file.path()).await.unwrap();

        assert_eq!(symbols.len(), 1);
        let class = &symbols[0];
        assert_eq!(class.name, "UserController");
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.selection_range.start, Position::new(4, 13));
        // annotations belong to the declaration
        assert_eq!(class.full_range.start, Position::new(2, 0));

        let names: Vec<(&str, SymbolKind)> = class.children.iter()
            .map(|s| (s.name.as_str(), s.kind))
            .collect();
        assert_eq!(names, vec![
            ("userService", SymbolKind::Field),
            ("UserController", SymbolKind::Constructor),
            ("get", SymbolKind::Method),
            ("Helper", SymbolKind::Class),
        ]);

        let get = &class.children[2];
        assert_eq!(get.selection_range.start, Position::new(12, 16));
        assert_eq!(get.full_range.end.line, 14);
        assert_eq!(class.children[3].children[0].name, "help");
    }

    #[tokio::test]
    async fn test_list_files_applies_glob() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("src/main/java/A.java").write_str("class A {}").unwrap();
        dir.child("src/main/java/nested/B.java").write_str("class B {}").unwrap();
        dir.child("README.md").write_str("# readme").unwrap();

        let provider = JavaSymbolProvider::new(dir.path(), 1024 * 1024);
        let files = provider.list_files("**/*.java").await.unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "java"));
    }

    #[tokio::test]
    async fn test_source_is_read_once() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("UserController.java");
        file.write_str(CONTROLLER).unwrap();

        let provider = JavaSymbolProvider::new(dir.path(), 1024 * 1024);
        let first = provider.open_document(file.path()).await.unwrap();

        file.write_str("class Replaced {}").unwrap();
        let symbols = provider.document_symbols(file.path()).await.unwrap();
        assert_eq!(symbols[0].name, "UserController");
        assert_eq!(provider.open_document(file.path()).await.unwrap().text(), first.text());
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("Big.java");
        file.write_str(CONTROLLER).unwrap();

        let provider = JavaSymbolProvider::new(dir.path(), 16);
        assert!(matches!(
            provider.open_document(file.path()).await,
            Err(RoutetraceError::Parser(_))
        ));
    }
}
