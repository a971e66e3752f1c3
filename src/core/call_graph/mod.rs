// src/core/call_graph/mod.rs
//! Call hierarchy reconstruction
//!
//! An oracle answers two questions about code: which callable lives at a source
//! location, and what that callable calls. The tree builder turns those answers
//! into a finite tree rooted at a route handler.

mod call_tree;
mod static_oracle;

pub use call_tree::{CallTree, CallTreeBuilder, CallTreeNode, NodeId, StopReason};
pub use static_oracle::StaticCallGraphOracle;

#[cfg(test)]
pub(crate) use call_tree::tests::{ident, MapOracle};

use std::path::Path;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::symbols::{Position, Range, SourceLocation};
use crate::error::Result;

/// Canonical identity of a callable as reported by the oracle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallIdentity {
    pub name: String,
    /// Qualifying context, typically the enclosing type; may be empty
    pub context: String,
    pub location: SourceLocation,
}

impl CallIdentity {
    pub fn new(name: impl Into<String>, context: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            context: context.into(),
            location,
        }
    }
}

/// One callee of a callable with every site where it is called
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingCall {
    pub callee: CallIdentity,
    pub call_sites: Vec<Range>,
}

/// External source of call relationships
#[async_trait]
pub trait CallGraphOracle: Send + Sync {
    /// Identities of the callables at a position; empty when nothing callable is there
    async fn prepare(&self, file: &Path, position: Position) -> Result<Vec<CallIdentity>>;

    /// Callables invoked by `identity`, in first call-site order
    async fn outgoing_calls(&self, identity: &CallIdentity) -> Result<Vec<OutgoingCall>>;
}
