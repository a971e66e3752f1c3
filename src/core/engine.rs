// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RoutetraceError;
use super::{
    create_assistant, sort_endpoints, synthesize, AnnotationParser, CallGuard, CallTreeBuilder,
    ConsoleSink, EndpointDescriptor, EndpointDiscovery, EndpointMeta, EndpointResolver,
    JavaSymbolProvider, LanguageAssistant, OutputSink, Resolution, StaticCallGraphOracle,
};

const CONFIG_FILE: &str = "Routetrace.toml";

/// Wires discovery, resolution, call tree expansion and diagram synthesis together
pub struct Engine {
    config: Config,
    assistant: Option<Box<dyn LanguageAssistant>>,
    sink: Arc<dyn OutputSink>,
}

impl Engine {
    /// Create a new engine from the configuration file (or defaults)
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        Ok(Self::with_sink(config, Arc::new(ConsoleSink)))
    }

    pub fn with_sink(config: Config, sink: Arc<dyn OutputSink>) -> Self {
        let assistant = if config.llm.enabled {
            match create_assistant(&config.llm) {
                Ok(assistant) => {
                    info!("Language assistant enabled: {} ({})", assistant.provider_name(), assistant.model_name());
                    Some(assistant)
                }
                Err(e) => {
                    warn!("Failed to initialize language assistant: {}", e);
                    warn!("Continuing without assistant-based endpoint selection");
                    None
                }
            }
        } else {
            debug!("Language assistant disabled");
            None
        };

        Self { config, assistant, sink }
    }

    /// Write a default configuration file into `path` (or the current directory)
    pub async fn init(&self, path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        let target = target_dir.join(CONFIG_FILE);

        if target.exists() && !force {
            return Err(RoutetraceError::Config(format!(
                "{} already exists (use --force to overwrite)",
                target.display()
            )).into());
        }

        std::fs::create_dir_all(&target_dir)?;
        let mut config = Config::default();
        if let Some(name) = target_dir.canonicalize().ok().and_then(|d| d.file_name().map(|n| n.to_string_lossy().to_string())) {
            config.project.name = name;
        }
        config.save(&target)?;

        info!("Wrote {}", target.display());
        Ok(target)
    }

    /// Every endpoint under the source directory, in presentation order
    pub async fn list_endpoints(&self, source: Option<PathBuf>, cancel: &CancellationToken) -> Result<Vec<EndpointDescriptor>> {
        let provider = self.symbol_provider(source)?;
        let guard = self.guard(cancel);
        self.discover(&provider, &guard).await
    }

    /// Run the whole pipeline for `query` and return the diagram text
    ///
    /// `Ok(None)` covers every expected non-result: no endpoints, a query that needs
    /// clarification (already shown through the sink), a handler without a call
    /// hierarchy, and cancellation.
    pub async fn diagram(&self, query: &str, source: Option<PathBuf>, cancel: &CancellationToken) -> Result<Option<String>> {
        let provider = self.symbol_provider(source)?;
        let guard = self.guard(cancel);

        self.sink.progress("Discovering endpoints");
        let endpoints = self.discover(&provider, &guard).await?;

        let resolver = EndpointResolver::new(self.assistant.as_deref(), self.sink.as_ref())?;
        let endpoint = match resolver.resolve(query, &endpoints, &guard).await? {
            Resolution::Selected { endpoint, .. } => endpoint,
            Resolution::NotFound => {
                self.sink.markdown(&format!("No HTTP endpoints found under `{}`.", provider.root().display()));
                return Ok(None);
            }
            Resolution::NeedsClarification { .. } | Resolution::Cancelled => return Ok(None),
        };

        self.sink.progress(&format!("Tracing calls from {} ({})", endpoint.route(), endpoint.handler_name));
        let oracle = match StaticCallGraphOracle::index(&provider, &self.config.project.include_glob, &guard).await {
            Ok(oracle) => oracle,
            Err(e) if e.is_cancelled() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let builder = CallTreeBuilder::new(&oracle, &self.config.call_tree);
        let Some(tree) = builder.build(&endpoint.location, &guard).await? else {
            self.sink.markdown(&format!(
                "Could not resolve the call hierarchy of `{}` at {}.",
                endpoint.handler_name, endpoint.location
            ));
            return Ok(None);
        };

        if !tree.is_complete() {
            warn!("Call tree for {} is partial ({} nodes)", endpoint.route(), tree.len());
            debug!("Partial tree: {}", serde_json::to_string(&tree)?);
        }

        Ok(Some(synthesize(&tree, Some(&EndpointMeta::from(&endpoint)))))
    }

    async fn discover(&self, provider: &JavaSymbolProvider, guard: &CallGuard) -> Result<Vec<EndpointDescriptor>> {
        let parser = AnnotationParser::new();
        let discovery = EndpointDiscovery::new(provider, &parser, &self.config.discovery, &self.config.project.include_glob);

        let mut endpoints = discovery.discover(guard).await;
        sort_endpoints(&mut endpoints);
        Ok(endpoints)
    }

    fn symbol_provider(&self, source: Option<PathBuf>) -> Result<JavaSymbolProvider> {
        let root = source.unwrap_or_else(|| self.config.project.source_dir.clone());
        if !root.is_dir() {
            return Err(RoutetraceError::FileSystem(format!("Source directory not found: {}", root.display())).into());
        }
        Ok(JavaSymbolProvider::new(root, self.config.discovery.max_file_size))
    }

    fn guard(&self, cancel: &CancellationToken) -> CallGuard {
        CallGuard::new(Duration::from_secs(self.config.collaborators.timeout_secs), cancel.clone())
    }
}
