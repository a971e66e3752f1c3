// src/core/routes/path_combiner.rs
//! Joins class-level and method-level route paths without ever producing `//`

/// Ensure a leading `/` and strip a single trailing `/` unless that would empty the path
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    normalized
}

/// Combine a base path with a method path
pub fn combine_paths(base_path: &str, method_path: &str) -> String {
    let base = normalize_path(base_path);
    let method = normalize_path(method_path);

    // Normalization never yields an empty string, so "/" stands for "no path"
    if base == "/" {
        method
    } else if method == "/" {
        base
    } else {
        format!("{}{}", base, method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("users"), "/users");
        assert_eq!(normalize_path(" /users/ "), "/users");
        // only one trailing slash is stripped
        assert_eq!(normalize_path("/a//"), "/a/");
    }

    #[test]
    fn test_combine_paths() {
        assert_eq!(combine_paths("/api/users", "/{id}"), "/api/users/{id}");
        assert_eq!(combine_paths("api/users/", "{id}"), "/api/users/{id}");
        assert_eq!(combine_paths("/", "/"), "/");
        assert_eq!(combine_paths("", "health"), "/health");
        assert_eq!(combine_paths("/api", ""), "/api");
    }

    #[test]
    fn test_root_is_identity_on_either_side() {
        for path in ["/", "/a", "/a/b/", "x/{id}", "  /spaced  "] {
            assert_eq!(combine_paths("/", path), normalize_path(path));
            assert_eq!(combine_paths(path, "/"), normalize_path(path));
        }
    }

    #[test]
    fn test_no_double_slash() {
        for (base, method) in [("/a/", "/b"), ("a", "b/"), ("/", "/c"), ("/d/", "/")] {
            assert!(!combine_paths(base, method).contains("//"));
        }
    }
}
