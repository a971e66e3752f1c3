// src/core/routes/discovery.rs
use std::path::Path;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::core::boundary::CallGuard;
use crate::core::symbols::{
    DocumentSymbol, Position, Range, SourceLocation, SymbolKind, SymbolProvider, TextDocument,
};
use crate::error::Result;
use super::{combine_paths, AnnotationParser, EndpointDescriptor};

/// Finds every annotated route handler in a source corpus
pub struct EndpointDiscovery<'a> {
    provider: &'a dyn SymbolProvider,
    parser: &'a AnnotationParser,
    include_glob: String,
    class_window_lines: usize,
    concurrency: usize,
}

impl<'a> EndpointDiscovery<'a> {
    pub fn new(
        provider: &'a dyn SymbolProvider,
        parser: &'a AnnotationParser,
        config: &DiscoveryConfig,
        include_glob: &str,
    ) -> Self {
        Self {
            provider,
            parser,
            include_glob: include_glob.to_string(),
            class_window_lines: config.class_window_lines,
            concurrency: config.concurrency.max(1),
        }
    }

    /// Discover endpoints in every matching file
    ///
    /// Files are processed concurrently and results come back in no particular order.
    /// A file that cannot be opened or introspected is logged and skipped.
    pub async fn discover(&self, guard: &CallGuard) -> Vec<EndpointDescriptor> {
        if guard.is_cancelled() {
            return Vec::new();
        }

        let files = match guard
            .guarded("list_files", self.provider.list_files(&self.include_glob))
            .await
        {
            Ok(files) => files,
            Err(e) => {
                warn!("Could not list files matching '{}': {}", self.include_glob, e);
                return Vec::new();
            }
        };

        info!("Scanning {} files for endpoints", files.len());

        let per_file: Vec<Vec<EndpointDescriptor>> = stream::iter(files)
            .map(|file| async move {
                if guard.is_cancelled() {
                    return Vec::new();
                }
                match self.discover_in_file(&file, guard).await {
                    Ok(endpoints) => endpoints,
                    Err(e) if e.is_cancelled() => Vec::new(),
                    Err(e) => {
                        warn!("Skipping {}: {}", file.display(), e);
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let endpoints: Vec<EndpointDescriptor> = per_file.into_iter().flatten().collect();
        info!("Found {} endpoints", endpoints.len());
        endpoints
    }

    async fn discover_in_file(&self, file: &Path, guard: &CallGuard) -> Result<Vec<EndpointDescriptor>> {
        let document = guard
            .guarded("open_document", self.provider.open_document(file))
            .await?;
        let symbols = guard
            .guarded("document_symbols", self.provider.document_symbols(file))
            .await?;

        Ok(self.extract_endpoints(file, &document, &symbols))
    }

    /// Endpoints declared in one already-introspected file
    pub fn extract_endpoints(
        &self,
        file: &Path,
        document: &TextDocument,
        symbols: &[DocumentSymbol],
    ) -> Vec<EndpointDescriptor> {
        let mut endpoints = Vec::new();
        self.visit_types(file, document, symbols, None, &mut endpoints);
        endpoints
    }

    fn visit_types(
        &self,
        file: &Path,
        document: &TextDocument,
        symbols: &[DocumentSymbol],
        floor: Option<Position>,
        endpoints: &mut Vec<EndpointDescriptor>,
    ) {
        for (index, symbol) in symbols.iter().enumerate() {
            if !symbol.kind.is_type() {
                continue;
            }
            let previous_end = match index {
                0 => floor,
                _ => Some(symbols[index - 1].full_range.end),
            };
            self.visit_type(file, document, symbol, previous_end, endpoints);
        }
    }

    fn visit_type(
        &self,
        file: &Path,
        document: &TextDocument,
        class: &DocumentSymbol,
        floor: Option<Position>,
        endpoints: &mut Vec<EndpointDescriptor>,
    ) {
        let name_start = class.selection_range.start;
        // The declaration range holds the class's own annotations and stops short of its Javadoc
        let window_start = if class.full_range.start < name_start {
            class.full_range.start
        } else {
            self.line_window_start(name_start, floor)
        };

        let header = document.text_in_range(Range::new(window_start, name_start));
        match self.controller_base_paths(header) {
            Some(base_paths) => {
                debug!("Controller {} with base paths {:?}", class.name, base_paths);
                self.visit_handlers(file, document, class, &base_paths, endpoints);
            }
            None => debug!("{} is not a controller", class.name),
        }

        // Nested types are judged on their own annotations
        self.visit_types(file, document, &class.children, Some(class.selection_range.end), endpoints);
    }

    /// Up to `class_window_lines` above the name, never reaching back into the previous declaration
    fn line_window_start(&self, name_start: Position, floor: Option<Position>) -> Position {
        let window_start = Position::new(name_start.line.saturating_sub(self.class_window_lines), 0);
        match floor {
            Some(floor) if floor > window_start && floor <= name_start => floor,
            _ => window_start,
        }
    }

    /// Base paths of a controller class, `None` for anything that is not one
    fn controller_base_paths(&self, header: &str) -> Option<Vec<String>> {
        let route = self.parser.parse(header);
        if route.is_none() && !self.parser.is_controller(header) {
            return None;
        }

        Some(route.map(|r| r.paths).unwrap_or_else(|| vec!["/".to_string()]))
    }

    fn visit_handlers(
        &self,
        file: &Path,
        document: &TextDocument,
        class: &DocumentSymbol,
        base_paths: &[String],
        endpoints: &mut Vec<EndpointDescriptor>,
    ) {
        for (index, member) in class.children.iter().enumerate() {
            if member.kind != SymbolKind::Method {
                continue;
            }

            let window_start = match index {
                0 => class.selection_range.end,
                _ => class.children[index - 1].full_range.end,
            };
            let window = document.text_in_range(Range::new(window_start, member.selection_range.start));

            let Some(route) = self.parser.parse(window) else {
                continue;
            };

            for base_path in base_paths {
                for path in &route.paths {
                    endpoints.push(EndpointDescriptor {
                        method: route.method,
                        path: combine_paths(base_path, path),
                        handler_name: member.name.clone(),
                        location: SourceLocation::new(file, member.selection_range.start),
                        annotation_span: (window_start.line, member.full_range.end.line),
                    });
                }
            }
        }
    }
}
