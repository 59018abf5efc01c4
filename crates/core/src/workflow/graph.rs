//! Validated node graph of a workflow.
//!
//! Nodes are stored in an arena and linked by id. Construction checks that
//! the graph has a single start node and that following `next_node` from it
//! reaches a terminal node without revisiting anything.

use std::collections::{HashMap, HashSet};

use crate::workflow::error::WorkflowError;
use crate::workflow::types::{Node, NodeKind};

/// Arena of nodes indexed by node id.
#[derive(Debug, Clone)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    start: usize,
}

impl NodeGraph {
    /// Builds and validates a graph.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGraph` if the nodes do not form a single chain from
    /// one start node to a terminal node.
    pub fn new(nodes: Vec<Node>) -> Result<Self, WorkflowError> {
        if nodes.is_empty() {
            return Err(WorkflowError::InvalidGraph(
                "workflow has no nodes".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.node_id.clone(), i).is_some() {
                return Err(WorkflowError::InvalidGraph(format!(
                    "duplicate node id {}",
                    node.node_id
                )));
            }
        }

        let starts: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.prev_node.is_none())
            .map(|(i, _)| i)
            .collect();
        let start = match starts.as_slice() {
            [only] => *only,
            [] => {
                return Err(WorkflowError::InvalidGraph(
                    "no start node (every node has a predecessor)".to_string(),
                ));
            }
            _ => {
                return Err(WorkflowError::InvalidGraph(format!(
                    "{} nodes have no predecessor",
                    starts.len()
                )));
            }
        };

        if !nodes.iter().any(|n| n.next_node.is_none()) {
            return Err(WorkflowError::InvalidGraph(
                "no terminal node (every node has a successor)".to_string(),
            ));
        }

        for node in &nodes {
            if let Some(next) = &node.next_node
                && !index.contains_key(next)
            {
                return Err(WorkflowError::InvalidGraph(format!(
                    "node {} points to missing node {next}",
                    node.node_id
                )));
            }
        }

        let graph = Self {
            nodes,
            index,
            start,
        };
        graph.check_reaches_end()?;
        Ok(graph)
    }

    fn check_reaches_end(&self) -> Result<(), WorkflowError> {
        let mut seen = HashSet::new();
        let mut current = self.start;
        loop {
            if !seen.insert(current) {
                return Err(WorkflowError::InvalidGraph(format!(
                    "cycle through node {}",
                    self.nodes[current].node_id
                )));
            }
            match &self.nodes[current].next_node {
                None => return Ok(()),
                Some(next) => match self.index.get(next) {
                    Some(&i) => current = i,
                    None => {
                        return Err(WorkflowError::InvalidGraph(format!(
                            "missing node {next}"
                        )));
                    }
                },
            }
        }
    }

    /// The single node without a predecessor.
    #[must_use]
    pub fn start(&self) -> &Node {
        &self.nodes[self.start]
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<&Node> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    /// The successor of `node_id`, or `None` at a terminal node.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if `node_id` is not part of the graph.
    pub fn next(&self, node_id: &str) -> Result<Option<&Node>, WorkflowError> {
        let node = self.get(node_id).ok_or_else(|| WorkflowError::NodeNotFound {
            wf_id: self.start().wf_id.clone(),
            node_id: node_id.to_string(),
        })?;
        Ok(node.next_node.as_deref().and_then(|next| self.get(next)))
    }

    /// Position of a node, inferred from its links.
    #[must_use]
    pub fn kind(&self, node: &Node) -> NodeKind {
        match (&node.prev_node, &node.next_node) {
            (None, _) => NodeKind::Start,
            (Some(_), None) => NodeKind::End,
            (Some(_), Some(_)) => NodeKind::Approval,
        }
    }

    /// Node ids in execution order from the start node.
    #[must_use]
    pub fn path(&self) -> Vec<&str> {
        let mut out = vec![self.start().node_id.as_str()];
        let mut current = self.start();
        while let Some(next) = current.next_node.as_deref().and_then(|n| self.get(n)) {
            out.push(next.node_id.as_str());
            current = next;
        }
        out
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a constructed graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
