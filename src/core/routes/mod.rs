// src/core/routes/mod.rs
//! HTTP route discovery
//!
//! Pure text functions (annotation parsing, path combination) plus the discovery
//! engine that runs them over every controller found through symbol introspection.

mod annotations;
mod discovery;
mod endpoint;
mod path_combiner;

pub use annotations::{
    default_mapping_rules, AnnotationParser, MappingRule, RouteAnnotation, DEFAULT_CONTROLLER_MARKERS,
};
pub use discovery::EndpointDiscovery;
pub use endpoint::{sort_endpoints, EndpointDescriptor, HttpMethod};
pub use path_combiner::{combine_paths, normalize_path};

#[cfg(test)]
pub(crate) use endpoint::endpoint;
