// src/core/routes/annotations.rs
//! Route annotation parsing over bounded text windows
//!
//! The parser never builds a syntax tree. It blanks out comments and string contents, finds the last
//! route annotation in the window, cuts out its (possibly multi-line) attribute list
//! with a quote-aware bracket scan, and reads the verb and paths from that list.
//! Which annotation names count as routes, and which verb each implies, is plain
//! data in `MappingRule`s.

use regex::Regex;

use crate::error::{RoutetraceError, Result};
use super::HttpMethod;

/// Annotation name and the verb it implies; `None` means the verb comes from `method =`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    pub annotation: String,
    pub method: Option<HttpMethod>,
}

impl MappingRule {
    pub fn new(annotation: impl Into<String>, method: Option<HttpMethod>) -> Self {
        Self {
            annotation: annotation.into(),
            method,
        }
    }
}

pub fn default_mapping_rules() -> Vec<MappingRule> {
    vec![
        MappingRule::new("GetMapping", Some(HttpMethod::Get)),
        MappingRule::new("PostMapping", Some(HttpMethod::Post)),
        MappingRule::new("PutMapping", Some(HttpMethod::Put)),
        MappingRule::new("DeleteMapping", Some(HttpMethod::Delete)),
        MappingRule::new("PatchMapping", Some(HttpMethod::Patch)),
        MappingRule::new("RequestMapping", None),
    ]
}

/// Class annotations that mark a type as a request handler
pub const DEFAULT_CONTROLLER_MARKERS: &[&str] = &["RestController", "Controller"];

/// Verb and raw paths declared by one route annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAnnotation {
    pub method: HttpMethod,
    /// Trimmed but otherwise as written; normalization happens when paths are combined
    pub paths: Vec<String>,
}

pub struct AnnotationParser {
    rules: Vec<MappingRule>,
    mapping_regex: Regex,
    controller_regex: Regex,
    path_key_regex: Regex,
    method_key_regex: Regex,
    verb_regex: Regex,
    string_literal_regex: Regex,
}

impl AnnotationParser {
    pub fn new() -> Self {
        Self::with_rules(default_mapping_rules(), DEFAULT_CONTROLLER_MARKERS)
            .expect("Invalid default annotation rules")
    }

    pub fn with_rules(rules: Vec<MappingRule>, controller_markers: &[&str]) -> Result<Self> {
        if rules.is_empty() {
            return Err(RoutetraceError::Config("At least one mapping rule is required".to_string()));
        }

        let mapping_names: Vec<&str> = rules.iter().map(|r| r.annotation.as_str()).collect();
        let mapping_regex = annotation_regex(&mapping_names)?;
        let controller_regex = annotation_regex(controller_markers)?;

        Ok(Self {
            rules,
            mapping_regex,
            controller_regex,
            path_key_regex: Regex::new(r"\b(?:value|path)\s*=\s*")
                .expect("Invalid path key regex"),
            method_key_regex: Regex::new(r"\bmethod\s*=\s*")
                .expect("Invalid method key regex"),
            verb_regex: Regex::new(r"\b(?:RequestMethod\s*\.\s*)?([A-Za-z]+)\b")
                .expect("Invalid verb regex"),
            string_literal_regex: Regex::new(r#""((?:[^"\\]|\\.)*)""#)
                .expect("Invalid string literal regex"),
        })
    }

    /// Parse the route annotation closest to the end of `block`
    pub fn parse(&self, block: &str) -> Option<RouteAnnotation> {
        if block.trim().is_empty() {
            return None;
        }

        // Same byte offsets in both views: match on live code, read values from literals
        let code = blank_comments(block);
        let live = code_only(block);
        let captures = self.mapping_regex.captures_iter(&live).last()?;
        let name = captures.name("name")?.as_str();
        let rule = self.rules.iter().find(|r| r.annotation == name)?;
        let args = parenthesized(&code, captures.get(0)?.end());

        let method = match rule.method {
            Some(method) => method,
            None => args
                .and_then(|a| self.declared_method(a))
                .unwrap_or(HttpMethod::Get),
        };
        let paths = self.declared_paths(args)?;

        Some(RouteAnnotation { method, paths })
    }

    /// Whether the block carries a controller marker annotation
    pub fn is_controller(&self, block: &str) -> bool {
        self.controller_regex.is_match(&code_only(block))
    }

    /// First supported verb named by `method =`, single value or brace list
    fn declared_method(&self, args: &str) -> Option<HttpMethod> {
        let masked = mask_string_literals(args);
        let key = self.method_key_regex.find(&masked)?;
        let value = &masked[key.end()..];

        let value = if value.starts_with('{') {
            &value[..closing_brace(value)]
        } else {
            value.split(|c| c == ',' || c == ')').next().unwrap_or(value)
        };

        self.verb_regex
            .captures_iter(value)
            .find_map(|c| c[1].parse::<HttpMethod>().ok())
    }

    fn declared_paths(&self, args: Option<&str>) -> Option<Vec<String>> {
        let root = || Some(vec!["/".to_string()]);
        let Some(args) = args else {
            return root();
        };

        let masked = mask_string_literals(args);
        let value_start = match self.path_key_regex.find(&masked) {
            Some(key) => key.end(),
            None => {
                let start = args.len() - args.trim_start().len();
                match args[start..].chars().next() {
                    Some('"') | Some('{') => start,
                    _ => return root(),
                }
            }
        };

        self.literal_values(&args[value_start..])
    }

    /// A string literal or a brace list of them; anything else (a constant, a
    /// concatenation) cannot be resolved from text and yields no paths
    fn literal_values(&self, value: &str) -> Option<Vec<String>> {
        let value = value.trim_start();

        if value.starts_with('"') {
            let captures = self.string_literal_regex.captures(value)?;
            return Some(vec![captures[1].trim().to_string()]);
        }

        if value.starts_with('{') {
            let list = &value[..closing_brace(value)];
            let paths: Vec<String> = self.string_literal_regex
                .captures_iter(list)
                .map(|c| c[1].trim().to_string())
                .collect();
            return Some(if paths.is_empty() { vec!["/".to_string()] } else { paths });
        }

        None
    }
}

impl Default for AnnotationParser {
    fn default() -> Self {
        Self::new()
    }
}

fn annotation_regex(names: &[&str]) -> Result<Regex> {
    let alternatives: Vec<String> = names.iter().map(|n| regex::escape(n)).collect();
    let pattern = format!(
        r"@(?:[A-Za-z_$][\w$]*\s*\.\s*)*(?P<name>{})\b",
        alternatives.join("|")
    );
    Regex::new(&pattern)
        .map_err(|e| RoutetraceError::Config(format!("Invalid annotation rule: {}", e)))
}

/// Text inside the parentheses opening at or after `from`; an unterminated list
/// runs to the end of the window
fn parenthesized(code: &str, from: usize) -> Option<&str> {
    let rest = &code[from..];
    let open = rest.len() - rest.trim_start().len();
    if !rest[open..].starts_with('(') {
        return None;
    }

    let inner = &rest[open + 1..];
    let mut depth = 1;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in inner.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&inner[..i]);
                }
            }
            _ => {}
        }
    }

    Some(inner)
}

/// Byte index just past the `}` closing the brace that starts `value`
fn closing_brace(value: &str) -> usize {
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }

    value.len()
}

#[derive(Clone, Copy, PartialEq)]
enum Lexical {
    Code,
    LineComment,
    BlockComment,
    Literal(char),
}

/// Replace comment text with spaces, keeping newlines and byte offsets intact
fn blank_comments(text: &str) -> String {
    rewrite(text, |state, _| matches!(state, Lexical::LineComment | Lexical::BlockComment))
}

/// Replace the contents of string and char literals with spaces, keeping the quotes
fn mask_string_literals(text: &str) -> String {
    rewrite(text, |state, c| matches!(state, Lexical::Literal(q) if c != q))
}

/// Both of the above in one pass
fn code_only(text: &str) -> String {
    rewrite(text, |state, c| match state {
        Lexical::Code => false,
        Lexical::LineComment | Lexical::BlockComment => true,
        Lexical::Literal(q) => c != q,
    })
}

fn rewrite(text: &str, blank: impl Fn(Lexical, char) -> bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = Lexical::Code;
    let mut chars = text.chars().peekable();
    let mut escaped = false;

    while let Some(c) = chars.next() {
        // State for this character; transitions out of it apply to the next one
        let mut current = state;
        match state {
            Lexical::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    state = Lexical::LineComment;
                    current = state;
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = Lexical::BlockComment;
                    current = state;
                    // consume the '*' so "/*/" is not read as open-and-close
                    push_char(&mut out, c, blank(current, c));
                    if let Some(star) = chars.next() {
                        push_char(&mut out, star, blank(current, star));
                    }
                    continue;
                }
                '"' | '\'' => state = Lexical::Literal(c),
                _ => {}
            },
            Lexical::LineComment => {
                if c == '\n' {
                    state = Lexical::Code;
                    current = state;
                }
            }
            Lexical::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    push_char(&mut out, c, blank(current, c));
                    if let Some(slash) = chars.next() {
                        push_char(&mut out, slash, blank(current, slash));
                    }
                    state = Lexical::Code;
                    continue;
                }
            }
            Lexical::Literal(quote) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == quote || c == '\n' {
                    state = Lexical::Code;
                }
            }
        }
        push_char(&mut out, c, blank(current, c));
    }

    out
}

fn push_char(out: &mut String, c: char, blank: bool) {
    if blank && c != '\n' {
        out.extend(std::iter::repeat(' ').take(c.len_utf8()));
    } else {
        out.push(c);
    }
}
