// src/core/call_graph/call_tree.rs
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CallTreeConfig;
use crate::core::boundary::CallGuard;
use crate::core::symbols::{Range, SourceLocation};
use crate::error::{RoutetraceError, Result};
use super::{CallGraphOracle, CallIdentity};

/// Index of a node inside its `CallTree`
pub type NodeId = usize;

/// Why a node was not expanded (or not fully expanded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The identity already appears on the path from the root
    Cycle,
    DepthLimit,
    /// The tree reached its node budget while adding this node's callees
    NodeLimit,
    Cancelled,
    /// The oracle failed for this node
    OracleFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallTreeNode {
    pub identity: CallIdentity,
    pub depth: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Sites in the parent's body where this callee is invoked
    pub call_sites: Vec<Range>,
    pub stopped: Option<StopReason>,
}

/// Finite call tree stored as an arena; node 0 is the root
#[derive(Debug, Clone, Serialize)]
pub struct CallTree {
    nodes: Vec<CallTreeNode>,
}

impl CallTree {
    fn with_root(identity: CallIdentity) -> Self {
        Self {
            nodes: vec![CallTreeNode {
                identity,
                depth: 0,
                parent: None,
                children: Vec::new(),
                call_sites: Vec::new(),
                stopped: None,
            }],
        }
    }

    pub const ROOT: NodeId = 0;

    pub fn root(&self) -> &CallTreeNode {
        &self.nodes[Self::ROOT]
    }

    pub fn node(&self, id: NodeId) -> &CallTreeNode {
        &self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &CallTreeNode)> + '_ {
        self.nodes[id].children.iter().map(move |&child| (child, &self.nodes[child]))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// False when a cancellation or the node budget cut the tree short
    pub fn is_complete(&self) -> bool {
        !self.nodes.iter().any(|n| matches!(n.stopped, Some(StopReason::Cancelled | StopReason::NodeLimit)))
    }

    fn push_child(&mut self, parent: NodeId, identity: CallIdentity, call_sites: Vec<Range>) -> NodeId {
        let id = self.nodes.len();
        let depth = self.nodes[parent].depth + 1;
        self.nodes.push(CallTreeNode {
            identity,
            depth,
            parent: Some(parent),
            children: Vec::new(),
            call_sites,
            stopped: None,
        });
        self.nodes[parent].children.push(id);
        id
    }

    fn stop(&mut self, id: NodeId, reason: StopReason) {
        self.nodes[id].stopped = Some(reason);
    }

    /// Whether `identity` is `from` or one of its ancestors
    fn on_path(&self, from: NodeId, identity: &CallIdentity) -> bool {
        let mut current = Some(from);
        while let Some(id) = current {
            if &self.nodes[id].identity == identity {
                return true;
            }
            current = self.nodes[id].parent;
        }
        false
    }
}

/// Expands a handler into its call tree using a `CallGraphOracle`
///
/// Expansion is depth first with an explicit stack. A callee already on the path from
/// the root is added once more as a `Cycle` leaf and not expanded again, so recursion
/// terminates while diamonds (the same callee reached along different paths) still
/// appear in full under each caller.
pub struct CallTreeBuilder<'a> {
    oracle: &'a dyn CallGraphOracle,
    max_depth: usize,
    max_nodes: usize,
}

impl<'a> CallTreeBuilder<'a> {
    pub fn new(oracle: &'a dyn CallGraphOracle, config: &CallTreeConfig) -> Self {
        Self {
            oracle,
            max_depth: config.max_depth,
            max_nodes: config.max_nodes.max(1),
        }
    }

    /// Build the tree rooted at the callable found at `location`
    ///
    /// Returns `Ok(None)` when the location resolves to no callable or the run is
    /// cancelled before the root resolves. A cancellation after that yields the
    /// partial tree with the unexpanded nodes marked `Cancelled`.
    pub async fn build(&self, location: &SourceLocation, guard: &CallGuard) -> Result<Option<CallTree>> {
        if location.file.as_os_str().is_empty() {
            return Err(RoutetraceError::InvalidInput("call tree location has no file".to_string()));
        }
        if guard.is_cancelled() {
            return Ok(None);
        }

        let prepared = match guard
            .guarded("prepare_call_hierarchy", self.oracle.prepare(&location.file, location.position))
            .await
        {
            Ok(items) => items,
            Err(e) if e.is_cancelled() => return Ok(None),
            Err(e) => {
                warn!("No call hierarchy for {}: {}", location, e);
                return Ok(None);
            }
        };
        let Some(root) = prepared.into_iter().next() else {
            debug!("Nothing callable at {}", location);
            return Ok(None);
        };

        let mut tree = CallTree::with_root(root);
        let mut pending = vec![CallTree::ROOT];

        while let Some(id) = pending.pop() {
            if guard.is_cancelled() {
                tree.stop(id, StopReason::Cancelled);
                pending.drain(..).for_each(|rest| tree.stop(rest, StopReason::Cancelled));
                break;
            }
            if tree.node(id).depth >= self.max_depth {
                tree.stop(id, StopReason::DepthLimit);
                continue;
            }

            let identity = tree.node(id).identity.clone();
            let calls = match guard.guarded("outgoing_calls", self.oracle.outgoing_calls(&identity)).await {
                Ok(calls) => calls,
                Err(e) if e.is_cancelled() => {
                    tree.stop(id, StopReason::Cancelled);
                    pending.drain(..).for_each(|rest| tree.stop(rest, StopReason::Cancelled));
                    break;
                }
                Err(e) => {
                    warn!("Outgoing calls of {} at {} failed: {}", identity.name, identity.location, e);
                    tree.stop(id, StopReason::OracleFailure);
                    continue;
                }
            };

            let mut expandable = Vec::new();
            for call in calls {
                if tree.len() >= self.max_nodes {
                    tree.stop(id, StopReason::NodeLimit);
                    break;
                }
                let cycle = tree.on_path(id, &call.callee);
                let child = tree.push_child(id, call.callee, call.call_sites);
                if cycle {
                    tree.stop(child, StopReason::Cycle);
                } else {
                    expandable.push(child);
                }
            }
            // first callee is expanded first
            pending.extend(expandable.into_iter().rev());
        }

        debug!("Call tree for {} has {} nodes", tree.root().identity.name, tree.len());
        Ok(Some(tree))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::call_graph::OutgoingCall;
    use crate::core::symbols::Position;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    pub(crate) fn ident(name: &str) -> CallIdentity {
        CallIdentity::new(name, "Svc", SourceLocation::new("Svc.java", Position::new(0, 0)))
    }

    /// Oracle over a fixed adjacency list; `root` is what `prepare` answers for Svc.java
    #[derive(Default)]
    pub(crate) struct MapOracle {
        pub root: Option<String>,
        pub edges: HashMap<String, Vec<String>>,
        pub failing: HashSet<String>,
        pub cancel_on_call: Option<CancellationToken>,
    }

    impl MapOracle {
        pub(crate) fn new(root: &str, edges: &[(&str, &[&str])]) -> Self {
            Self {
                root: Some(root.to_string()),
                edges: edges
                    .iter()
                    .map(|(from, to)| (from.to_string(), to.iter().map(|t| t.to_string()).collect()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl CallGraphOracle for MapOracle {
        async fn prepare(&self, file: &Path, _position: Position) -> Result<Vec<CallIdentity>> {
            Ok(match &self.root {
                Some(root) if file == Path::new("Svc.java") => vec![ident(root)],
                _ => Vec::new(),
            })
        }

        async fn outgoing_calls(&self, identity: &CallIdentity) -> Result<Vec<OutgoingCall>> {
            if let Some(token) = &self.cancel_on_call {
                token.cancel();
            }
            if self.failing.contains(&identity.name) {
                return Err(RoutetraceError::collaborator("outgoing_calls", "index unavailable"));
            }
            Ok(self.edges.get(&identity.name).into_iter().flatten()
                .map(|callee| OutgoingCall { callee: ident(callee), call_sites: Vec::new() })
                .collect())
        }
    }

    fn config(max_depth: usize, max_nodes: usize) -> CallTreeConfig {
        CallTreeConfig { max_depth, max_nodes }
    }

    fn guard() -> CallGuard {
        CallGuard::new(Duration::from_secs(1), CancellationToken::new())
    }

    fn root_location() -> SourceLocation {
        SourceLocation::new("Svc.java", Position::new(3, 4))
    }

    /// `name[reason]` per node, depth first
    fn outline(tree: &CallTree) -> Vec<String> {
        fn walk(tree: &CallTree, id: NodeId, out: &mut Vec<String>) {
            let node = tree.node(id);
            let reason = node.stopped.map(|r| format!("[{:?}]", r)).unwrap_or_default();
            out.push(format!("{}{}{}", "  ".repeat(node.depth), node.identity.name, reason));
            for (child, _) in tree.children(id) {
                walk(tree, child, out);
            }
        }
        let mut out = Vec::new();
        walk(tree, CallTree::ROOT, &mut out);
        out
    }

    async fn build(oracle: &MapOracle, config: CallTreeConfig) -> Option<CallTree> {
        CallTreeBuilder::new(oracle, &config).build(&root_location(), &guard()).await.unwrap()
    }

    #[tokio::test]
    async fn test_builds_tree_in_call_order() {
        let oracle = MapOracle::new("handle", &[("handle", &["validate", "save"]), ("save", &["insert"])]);
        let tree = build(&oracle, config(6, 100)).await.unwrap();

        assert_eq!(outline(&tree), vec!["handle", "  validate", "  save", "    insert"]);
        assert!(tree.is_complete());
        assert_eq!(tree.node(3).parent, Some(2));
    }

    #[tokio::test]
    async fn test_mutual_recursion_ends_in_cycle_leaf() {
        let oracle = MapOracle::new("a", &[("a", &["b"]), ("b", &["a"])]);
        let tree = build(&oracle, config(6, 100)).await.unwrap();
        assert_eq!(outline(&tree), vec!["a", "  b", "    a[Cycle]"]);
    }

    #[tokio::test]
    async fn test_self_recursion() {
        let oracle = MapOracle::new("walk", &[("walk", &["walk", "visit"])]);
        let tree = build(&oracle, config(6, 100)).await.unwrap();
        assert_eq!(outline(&tree), vec!["walk", "  walk[Cycle]", "  visit"]);
    }

    #[tokio::test]
    async fn test_diamond_is_expanded_under_each_caller() {
        let oracle = MapOracle::new("a", &[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"])]);
        let tree = build(&oracle, config(6, 100)).await.unwrap();
        assert_eq!(outline(&tree), vec!["a", "  b", "    d", "  c", "    d"]);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let oracle = MapOracle::new("l0", &[("l0", &["l1"]), ("l1", &["l2"]), ("l2", &["l3"]), ("l3", &["l4"])]);
        let tree = build(&oracle, config(2, 100)).await.unwrap();
        assert_eq!(outline(&tree), vec!["l0", "  l1", "    l2[DepthLimit]"]);
        assert!(tree.is_complete());
    }

    #[tokio::test]
    async fn test_node_limit() {
        let oracle = MapOracle::new("fan", &[("fan", &["a", "b", "c", "d"])]);
        let tree = build(&oracle, config(6, 3)).await.unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root().stopped, Some(StopReason::NodeLimit));
        assert!(!tree.is_complete());
    }

    #[tokio::test]
    async fn test_oracle_failure_leaves_siblings_intact() {
        let mut oracle = MapOracle::new("a", &[("a", &["b", "c"]), ("c", &["d"])]);
        oracle.failing.insert("b".to_string());
        let tree = build(&oracle, config(6, 100)).await.unwrap();
        assert_eq!(outline(&tree), vec!["a", "  b[OracleFailure]", "  c", "    d"]);
    }

    #[tokio::test]
    async fn test_unresolvable_root() {
        let oracle = MapOracle::default();
        assert!(build(&oracle, config(6, 100)).await.is_none());

        let oracle = MapOracle::new("a", &[]);
        let elsewhere = SourceLocation::new("Other.java", Position::new(0, 0));
        let tree = CallTreeBuilder::new(&oracle, &config(6, 100)).build(&elsewhere, &guard()).await.unwrap();
        assert!(tree.is_none());
    }

    #[tokio::test]
    async fn test_location_without_file_is_invalid() {
        let oracle = MapOracle::new("a", &[]);
        let location = SourceLocation::new("", Position::new(0, 0));
        let err = CallTreeBuilder::new(&oracle, &config(6, 100)).build(&location, &guard()).await.unwrap_err();
        assert!(matches!(err, RoutetraceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_root_resolves() {
        let oracle = MapOracle::new("a", &[("a", &["b"])]);
        let token = CancellationToken::new();
        token.cancel();
        let guard = CallGuard::new(Duration::from_secs(1), token);
        let tree = CallTreeBuilder::new(&oracle, &config(6, 100)).build(&root_location(), &guard).await.unwrap();
        assert!(tree.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_mid_build_returns_partial_tree() {
        let token = CancellationToken::new();
        let mut oracle = MapOracle::new("a", &[("a", &["b", "c"]), ("b", &["d"])]);
        oracle.cancel_on_call = Some(token.clone());
        let guard = CallGuard::new(Duration::from_secs(1), token);

        let tree = CallTreeBuilder::new(&oracle, &config(6, 100))
            .build(&root_location(), &guard)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outline(&tree), vec!["a", "  b[Cancelled]", "  c[Cancelled]"]);
        assert!(!tree.is_complete());
    }

    #[tokio::test]
    async fn test_tree_serializes() {
        let oracle = MapOracle::new("a", &[("a", &["b"]), ("b", &["a"])]);
        let tree = build(&oracle, config(6, 100)).await.unwrap();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["nodes"][2]["stopped"], "cycle");
    }
}
