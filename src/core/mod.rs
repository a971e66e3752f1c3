// src/core/mod.rs
mod engine;
mod boundary;
mod sink;
mod llm;

// Symbol introspection over Java sources
mod symbols;

// Route discovery
mod routes;

// Endpoint resolution cascade
mod resolver;

// Call hierarchy and its rendering
mod call_graph;
mod sequence_diagram;

pub use boundary::CallGuard;
pub use sink::{ConsoleSink, OutputSink};
pub use llm::{create_assistant, LanguageAssistant};
pub use symbols::JavaSymbolProvider;
pub use routes::{sort_endpoints, AnnotationParser, EndpointDescriptor, EndpointDiscovery};
pub use resolver::{EndpointResolver, Resolution};
pub use call_graph::{CallTreeBuilder, StaticCallGraphOracle};
pub use sequence_diagram::{synthesize, EndpointMeta};

// Export the main engine
pub use engine::Engine;
