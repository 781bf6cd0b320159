//! Depth-first traversal of the node hierarchy
//!
//! The walk keeps its own stack instead of recursing, so deep trees cost heap
//! rather than call stack. The visited set is borrowed from the caller and
//! shared by every root of a run: a node reachable from two containers is
//! yielded once.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::providers::NodeProvider;

pub struct TreeWalker<'a> {
    nodes: &'a dyn NodeProvider,
    visited: &'a mut HashSet<String>,
    stack: Vec<String>,
    pending_error: Option<EngineError>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(nodes: &'a dyn NodeProvider, root: &str, visited: &'a mut HashSet<String>) -> Self {
        Self {
            nodes,
            visited,
            stack: vec![root.to_string()],
            pending_error: None,
        }
    }

    /// Next node id, or an error standing in for a subtree that could not be
    /// read. `None` once the walk is done.
    pub async fn next(&mut self) -> Option<Result<String>> {
        if let Some(err) = self.pending_error.take() {
            return Some(Err(err));
        }

        while let Some(node_id) = self.stack.pop() {
            if self.visited.contains(&node_id) {
                continue;
            }

            match self.nodes.exists(&node_id).await {
                Ok(true) => {},
                Ok(false) => {
                    debug!(node = %node_id, "Node does not exist, skipping");
                    continue;
                },
                Err(e) => {
                    self.visited.insert(node_id.clone());
                    return Some(Err(subtree_error(&node_id, e)));
                },
            }
            self.visited.insert(node_id.clone());

            let container = match self.nodes.is_container(&node_id).await {
                Ok(container) => container,
                Err(e) => return Some(Err(subtree_error(&node_id, e))),
            };

            if container {
                match self.nodes.children_of(&node_id).await {
                    // Reversed so the first child is visited first
                    Ok(children) => self.stack.extend(children.into_iter().rev()),
                    Err(e) => {
                        warn!(node = %node_id, error = %e, "Failed to list children");
                        self.pending_error = Some(subtree_error(&node_id, e));
                    },
                }
            }

            return Some(Ok(node_id));
        }

        None
    }

    /// Drain the walk
    pub async fn collect(mut self) -> Vec<Result<String>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        items
    }
}

fn subtree_error(node_id: &str, cause: EngineError) -> EngineError {
    EngineError::provider(format!("Cannot traverse {node_id}: {cause}"))
}
