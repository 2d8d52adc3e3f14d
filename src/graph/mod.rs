//! Dependency graph of registered nodes
//!
//! Edges are implicit: a node depends on whichever inputs or node outputs are
//! bound under its parameter names. Ordering is resolved by name availability.

pub mod node;

pub use node::{Args, Dependency, Node, NodeFn, Param};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Required parameters a node could not get bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingInputs {
    pub output_name: String,
    pub missing: Vec<String>,
}

impl fmt::Display for MissingInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - node '{}' is missing required inputs: [{}]",
            self.output_name,
            self.missing.join(", ")
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Configuration error: output '{0}' is already registered")]
    DuplicateOutput(String),

    #[error("Configuration error: node '{output}' declares map axis '{axis}' which is not one of its parameters")]
    UnknownMapAxis { output: String, axis: String },

    #[error("Configuration error: node '{0}' declares a key attribute without a map axis")]
    KeyAttrWithoutMapAxis(String),

    #[error("Configuration error: only one map axis is supported; found '{existing}' and '{found}'")]
    MultipleMapAxes { existing: String, found: String },

    #[error("Cannot resolve pipeline dependencies. The following nodes have missing inputs:\n{}", format_missing(.missing))]
    Unresolved { missing: Vec<MissingInputs> },
}

fn format_missing(missing: &[MissingInputs]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Registered nodes in registration order
#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: Vec<Arc<Node>>,
    by_output: HashMap<String, usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node
    ///
    /// Rejects duplicate output names, a map axis the node does not take, a
    /// key attribute without a map axis, and a second distinct map axis.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        let output = node.output_name().to_string();

        if self.by_output.contains_key(&output) {
            return Err(GraphError::DuplicateOutput(output));
        }

        match node.map_axis_name() {
            Some(axis) => {
                if !node.has_param(axis) {
                    return Err(GraphError::UnknownMapAxis {
                        output,
                        axis: axis.to_string(),
                    });
                }
                if let Some(existing) = self.map_axis() {
                    if existing != axis {
                        return Err(GraphError::MultipleMapAxes {
                            existing: existing.to_string(),
                            found: axis.to_string(),
                        });
                    }
                }
            }
            None if node.key_attr_name().is_some() => {
                return Err(GraphError::KeyAttrWithoutMapAxis(output));
            }
            None => {}
        }

        debug!(node = %output, params = node.param_list().len(), "registered node");
        self.by_output.insert(output, self.nodes.len());
        self.nodes.push(Arc::new(node));
        Ok(())
    }

    /// Builder-style registration
    pub fn with_node(mut self, node: Node) -> Result<Self, GraphError> {
        self.add_node(node)?;
        Ok(self)
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn get(&self, output_name: &str) -> Option<&Arc<Node>> {
        self.by_output.get(output_name).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The single map axis declared across all nodes, if any
    pub fn map_axis(&self) -> Option<&str> {
        self.nodes.iter().find_map(|n| n.map_axis_name())
    }

    /// Item key attribute declared alongside the map axis, if any
    pub fn map_key_attr(&self) -> Option<&str> {
        self.nodes
            .iter()
            .filter(|n| n.map_axis_name().is_some())
            .find_map(|n| n.key_attr_name())
    }

    /// Order nodes so every required parameter is bound before its node runs
    ///
    /// Each pass walks the remaining nodes in registration order; a node whose
    /// required parameters are all available is emitted and its output becomes
    /// available to later nodes in the same pass. A pass without progress
    /// fails with the missing parameters of every unresolved node.
    pub fn topological_order<'a, I>(&self, available: I) -> Result<Vec<Arc<Node>>, GraphError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut available: HashSet<String> = available.into_iter().map(str::to_string).collect();
        let mut remaining: Vec<&Arc<Node>> = self.nodes.iter().collect();
        let mut ordered = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let before = remaining.len();
            let mut still_blocked = Vec::new();

            for node in remaining {
                if node.required_params().all(|p| available.contains(p)) {
                    available.insert(node.output_name().to_string());
                    ordered.push(Arc::clone(node));
                } else {
                    still_blocked.push(node);
                }
            }

            if still_blocked.len() == before {
                let missing = still_blocked
                    .iter()
                    .map(|node| {
                        let mut missing: Vec<String> = node
                            .required_params()
                            .filter(|p| !available.contains(*p))
                            .map(str::to_string)
                            .collect();
                        missing.sort();
                        MissingInputs {
                            output_name: node.output_name().to_string(),
                            missing,
                        }
                    })
                    .collect();
                return Err(GraphError::Unresolved { missing });
            }

            remaining = still_blocked;
        }

        Ok(ordered)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_output.clear();
    }
}
