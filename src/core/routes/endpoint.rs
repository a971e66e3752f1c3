// src/core/routes/endpoint.rs
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::core::symbols::SourceLocation;
use crate::error::RoutetraceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = RoutetraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RoutetraceError::InvalidInput(format!("Unsupported HTTP method: {}", s)))
    }
}

/// One discovered route handler
///
/// An annotation declaring N paths yields N descriptors that share the handler
/// and location and differ only in `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub method: HttpMethod,
    /// Normalized absolute path
    pub path: String,
    pub handler_name: String,
    /// Position of the handler's name token
    pub location: SourceLocation,
    /// First line of the annotation window through the last line of the handler body
    pub annotation_span: (usize, usize),
}

impl EndpointDescriptor {
    /// `GET /api/users/{id}`
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Stable presentation order: path, method, handler, then location
pub fn sort_endpoints(endpoints: &mut [EndpointDescriptor]) {
    endpoints.sort_by(|a, b| {
        a.path.cmp(&b.path)
            .then(a.method.cmp(&b.method))
            .then(a.handler_name.cmp(&b.handler_name))
            .then(a.location.file.cmp(&b.location.file))
            .then(a.location.position.cmp(&b.location.position))
    });
}

#[cfg(test)]
pub(crate) fn endpoint(method: HttpMethod, path: &str, handler: &str) -> EndpointDescriptor {
    use crate::core::symbols::Position;

    EndpointDescriptor {
        method,
        path: path.to_string(),
        handler_name: handler.to_string(),
        location: SourceLocation::new(format!("src/{}.java", handler), Position::new(3, 4)),
        annotation_span: (1, 6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing_is_case_insensitive() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(" PATCH ".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("HEAD".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_sort_endpoints_orders_by_path_then_method() {
        let mut endpoints = vec![
            endpoint(HttpMethod::Post, "/users", "create"),
            endpoint(HttpMethod::Get, "/orders", "orders"),
            endpoint(HttpMethod::Get, "/users", "list"),
        ];
        sort_endpoints(&mut endpoints);

        let routes: Vec<String> = endpoints.iter().map(|e| e.route()).collect();
        assert_eq!(routes, vec!["GET /orders", "GET /users", "POST /users"]);
    }

    #[test]
    fn test_method_serializes_uppercase() {
        let json = serde_json::to_string(&HttpMethod::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
    }
}
