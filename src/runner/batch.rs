/// Delegated batch execution
///
/// When a run maps over many items, the mapped part of the graph can be
/// handed to an external executor (a dataframe engine, a worker pool). The
/// runner computes everything that does not depend on the map axis first and
/// passes it along as constants.
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::graph::{Args, Node};
use crate::value::{Environment, Value};

/// The mapped slice of a run handed to a `BatchExecutor`
#[derive(Debug)]
pub struct BatchRequest<'a> {
    /// Mapped nodes in execution order
    pub nodes: &'a [Arc<Node>],
    /// Caller inputs plus outputs of every non-mapped node
    pub constants: &'a Environment,
    /// Name each item is bound under
    pub axis: &'a str,
    pub items: &'a [Value],
}

/// Executes mapped nodes across all items of a batch
pub trait BatchExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns one column per node in `request.nodes`, each with exactly one
    /// value per item, in item order
    fn execute(&self, request: &BatchRequest<'_>) -> Result<Vec<Vec<Value>>>;
}

/// Runs every item through the mapped nodes on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopExecutor;

impl BatchExecutor for LoopExecutor {
    fn name(&self) -> &'static str {
        "loop"
    }

    fn execute(&self, request: &BatchRequest<'_>) -> Result<Vec<Vec<Value>>> {
        let mut columns = vec![Vec::with_capacity(request.items.len()); request.nodes.len()];

        for (index, item) in request.items.iter().enumerate() {
            let mut env = request.constants.clone();
            env.insert(request.axis.to_string(), item.clone());

            for (column, node) in columns.iter_mut().zip(request.nodes) {
                let args = Args::gather(node, &env);
                let value = node.call(&args).with_context(|| {
                    format!("node '{}' failed on item {}", node.output_name(), index)
                })?;
                env.insert(node.output_name().to_string(), value.clone());
                column.push(value);
            }
        }

        debug!(
            executor = "loop",
            nodes = request.nodes.len(),
            items = request.items.len(),
            "batch executed"
        );
        Ok(columns)
    }
}

/// Split an execution order into (mapped, non-mapped) nodes
///
/// A node is mapped when it declares the axis, takes the axis as a
/// parameter, or consumes the output of another mapped node. Both halves
/// keep their relative order.
pub fn partition_mapped(order: &[Arc<Node>], axis: &str) -> (Vec<Arc<Node>>, Vec<Arc<Node>>) {
    let mut mapped_outputs: HashSet<&str> = HashSet::new();
    let mut mapped = Vec::new();
    let mut unmapped = Vec::new();

    for node in order {
        let is_mapped = node.map_axis_name().is_some()
            || node
                .param_names()
                .any(|p| p == axis || mapped_outputs.contains(p));
        if is_mapped {
            mapped_outputs.insert(node.output_name());
            mapped.push(Arc::clone(node));
        } else {
            unmapped.push(Arc::clone(node));
        }
    }

    (mapped, unmapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Vec<Arc<Node>> {
        vec![
            Arc::new(
                Node::new("index", |args: &Args| Ok(Value::Int(args.int("corpus_size")?)))
                    .param("corpus_size"),
            ),
            Arc::new(
                Node::new("hits", |args: &Args| {
                    Ok(Value::Int(args.int("query")? * args.int("index")?))
                })
                .params(["query", "index"])
                .map_axis("query"),
            ),
            Arc::new(
                Node::new("score", |args: &Args| Ok(Value::Int(args.int("hits")? + 1)))
                    .param("hits"),
            ),
        ]
    }

    #[test]
    fn test_partition_follows_mapped_outputs() {
        let (mapped, unmapped) = partition_mapped(&order(), "query");

        let mapped: Vec<&str> = mapped.iter().map(|n| n.output_name()).collect();
        let unmapped: Vec<&str> = unmapped.iter().map(|n| n.output_name()).collect();
        assert_eq!(mapped, vec!["hits", "score"]);
        assert_eq!(unmapped, vec!["index"]);
    }

    #[test]
    fn test_loop_executor_columns() {
        let order = order();
        let (mapped, _) = partition_mapped(&order, "query");
        let mut constants = Environment::new();
        constants.insert("index".to_string(), Value::Int(10));

        let items = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        let request = BatchRequest {
            nodes: &mapped,
            constants: &constants,
            axis: "query",
            items: &items,
        };

        let columns = LoopExecutor.execute(&request).unwrap();
        assert_eq!(
            columns,
            vec![
                vec![Value::Int(10), Value::Int(20), Value::Int(30)],
                vec![Value::Int(11), Value::Int(21), Value::Int(31)],
            ]
        );
    }

    #[test]
    fn test_loop_executor_reports_failing_item() {
        let failing = vec![Arc::new(
            Node::new("parsed", |args: &Args| Ok(Value::Int(args.int("query")?))).param("query"),
        )];
        let constants = Environment::new();
        let items = vec![Value::Int(1), Value::from("not a number")];
        let request = BatchRequest {
            nodes: &failing,
            constants: &constants,
            axis: "query",
            items: &items,
        };

        let err = LoopExecutor.execute(&request).unwrap_err();
        assert!(err.to_string().contains("failed on item 1"));
    }
}
