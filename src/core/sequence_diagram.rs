// src/core/sequence_diagram.rs
//! Mermaid sequence diagram text for a call tree
//!
//! Output is a pure function of the tree and the optional endpoint metadata:
//! participants appear in first-seen depth-first order, one edge per parent/child
//! pair, four-space indentation, no trailing whitespace.

use crate::core::call_graph::{CallIdentity, CallTree, NodeId};
use crate::core::routes::{EndpointDescriptor, HttpMethod};

const CLIENT: &str = "Client";
const PLACEHOLDER: &str = "Unknown";

/// Words the Mermaid sequence lexer reads as syntax, compared case-insensitively
const RESERVED: &[&str] = &[
    "participant", "actor", "as", "loop", "alt", "else", "opt", "par", "and", "rect",
    "critical", "break", "end", "note", "over", "left", "right", "of", "activate",
    "deactivate", "autonumber", "title", "box", "link", "links", "create", "destroy",
];

/// Request framing for a diagram rooted at a route handler
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointMeta {
    pub method: HttpMethod,
    pub path: String,
    pub handler_name: String,
}

impl From<&EndpointDescriptor> for EndpointMeta {
    fn from(endpoint: &EndpointDescriptor) -> Self {
        Self {
            method: endpoint.method,
            path: endpoint.path.clone(),
            handler_name: endpoint.handler_name.clone(),
        }
    }
}

/// Render `tree` as a `sequenceDiagram`
pub fn synthesize(tree: &CallTree, meta: Option<&EndpointMeta>) -> String {
    let edges = collect_edges(tree);
    let root = participant_id(&tree.root().identity);

    let mut participants: Vec<String> = Vec::new();
    let mut add_participant = |id: &str| {
        if !participants.iter().any(|p| p == id) {
            participants.push(id.to_string());
        }
    };
    if meta.is_some() {
        add_participant(CLIENT);
    }
    add_participant(&root);
    for edge in &edges {
        add_participant(&edge.from);
        add_participant(&edge.to);
    }

    let mut lines = vec!["sequenceDiagram".to_string()];
    lines.extend(participants.iter().map(|p| format!("    participant {}", p)));

    if let Some(meta) = meta {
        lines.push(format!("    {}->>{}: {} {}", CLIENT, root, meta.method, label_safe(&meta.path)));
        lines.push(format!("    Note over {}: {}()", root, label_safe(&meta.handler_name)));
    }

    for edge in &edges {
        lines.push(format!("    {}->>{}: {}", edge.from, edge.to, edge.label));
    }

    match meta {
        Some(_) => lines.push(format!("    {}-->>{}: response", root, CLIENT)),
        None if edges.is_empty() => lines.push(format!("    {}->>{}: No outgoing calls found", root, root)),
        None => {}
    }

    lines.join("\n")
}

struct Edge {
    from: String,
    to: String,
    label: String,
}

/// Parent/child pairs in depth-first pre-order
fn collect_edges(tree: &CallTree) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut pending: Vec<NodeId> = vec![CallTree::ROOT];

    while let Some(id) = pending.pop() {
        let node = tree.node(id);
        if let Some(parent) = node.parent {
            edges.push(Edge {
                from: participant_id(&tree.node(parent).identity),
                to: participant_id(&node.identity),
                label: label_safe(&node.identity.name),
            });
        }
        pending.extend(node.children.iter().rev());
    }

    edges
}

/// `Context.name` reduced to characters a participant id can carry
pub fn participant_id(identity: &CallIdentity) -> String {
    let context = identity.context.rsplit(['.', '$']).next().map(sanitize).unwrap_or_default();
    let name = sanitize(&identity.name);

    match (context.is_empty(), name.is_empty()) {
        (false, false) => format!("{}.{}", context, name),
        (true, false) => unreserved(name),
        (false, true) => unreserved(context),
        (true, true) => PLACEHOLDER.to_string(),
    }
}

/// Bare ids that would read as a keyword or as the external caller get a `_` suffix;
/// sanitized ids never end in `_`, so the result cannot collide
fn unreserved(id: String) -> String {
    let lowered = id.to_ascii_lowercase();
    if id == CLIENT || RESERVED.contains(&lowered.as_str()) {
        format!("{}_", id)
    } else {
        id
    }
}

fn sanitize(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    replaced.trim_matches('_').to_string()
}

/// Message text may not break the line or start a comment
fn label_safe(raw: &str) -> String {
    raw.replace(['\n', '\r', ';', '#'], " ").trim().to_string()
}
