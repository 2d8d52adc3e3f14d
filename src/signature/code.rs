/// Code and static dependency fingerprints
use std::collections::{BTreeSet, HashMap};

use super::short_hash;
use crate::graph::{Dependency, Node};

/// Fingerprint of a node's logic
///
/// Uses the declared code version; nodes without one are identified by the
/// fully-qualified name of their callable.
pub fn code_identity(node: &Node) -> String {
    match node.code_version_id() {
        Some(version) => short_hash(version.as_bytes()),
        None => short_hash(node.callable_name().as_bytes()),
    }
}

/// Fingerprint of a node's declared dependency tree, `depth` levels deep
///
/// Direct dependencies are level 1. The tree is walked level by level, so
/// each dependency name is expanded at the shallowest level it is declared
/// at. Per-dependency fingerprints are deduplicated and sorted before
/// combining, so the result does not depend on declaration or traversal
/// order. Returns an empty string when `depth` is 0 or nothing is declared.
pub fn static_dependency_identity(dependencies: &[Dependency], depth: usize) -> String {
    let mut shallowest: HashMap<&str, usize> = HashMap::new();
    let mut fingerprints = BTreeSet::new();
    let mut frontier: Vec<&Dependency> = dependencies.iter().collect();
    let mut level = 1;

    while level <= depth && !frontier.is_empty() {
        let mut next = Vec::new();
        for dependency in frontier {
            let first_seen = *shallowest.entry(dependency.name.as_str()).or_insert(level);
            if first_seen < level {
                continue;
            }
            fingerprints.insert(short_hash(
                format!("{}:{}", dependency.name, dependency.fingerprint).as_bytes(),
            ));
            next.extend(dependency.children.iter());
        }
        frontier = next;
        level += 1;
    }

    if fingerprints.is_empty() {
        return String::new();
    }
    short_hash(fingerprints.into_iter().collect::<String>().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Args;
    use crate::value::Value;

    fn tree() -> Vec<Dependency> {
        vec![
            Dependency::new("tokenizer", "v1").with_child(Dependency::new("unicode", "15.0")),
            Dependency::new("scoring", "v3"),
        ]
    }

    #[test]
    fn test_code_identity_prefers_declared_version() {
        let a = Node::new("out", |_: &Args| Ok(Value::Null)).code_version("abc");
        let b = Node::new("out", |_: &Args| Ok(Value::Int(1))).code_version("abc");
        let c = Node::new("out", |_: &Args| Ok(Value::Null)).code_version("abd");
        assert_eq!(code_identity(&a), code_identity(&b));
        assert_ne!(code_identity(&a), code_identity(&c));
        assert_eq!(code_identity(&a).len(), 16);
    }

    #[test]
    fn test_code_identity_falls_back_to_callable_name() {
        let a = Node::new("out", |_: &Args| Ok(Value::Null));
        assert_eq!(code_identity(&a), short_hash(a.callable_name().as_bytes()));
        assert_eq!(code_identity(&a), code_identity(&a.clone()));
    }

    #[test]
    fn test_depth_zero_disables() {
        assert_eq!(static_dependency_identity(&tree(), 0), "");
        assert_eq!(static_dependency_identity(&[], 2), "");
    }

    #[test]
    fn test_order_independent() {
        let mut reversed = tree();
        reversed.reverse();
        assert_eq!(
            static_dependency_identity(&tree(), 2),
            static_dependency_identity(&reversed, 2)
        );
    }

    #[test]
    fn test_depth_bounds_exploration() {
        let mut changed = tree();
        changed[0].children[0].fingerprint = "16.0".to_string();

        // The nested change is only visible once level 2 is explored
        assert_eq!(
            static_dependency_identity(&tree(), 1),
            static_dependency_identity(&changed, 1)
        );
        assert_ne!(
            static_dependency_identity(&tree(), 2),
            static_dependency_identity(&changed, 2)
        );
    }

    #[test]
    fn test_shared_subtree_order_independent() {
        let nested = || {
            Dependency::new("retriever", "v2")
                .with_child(Dependency::new("index", "v5").with_child(Dependency::new("ann", "0.9")))
        };
        let direct = || Dependency::new("index", "v5").with_child(Dependency::new("ann", "0.9"));

        let forward = vec![nested(), direct()];
        let reversed = vec![direct(), nested()];
        assert_eq!(
            static_dependency_identity(&forward, 2),
            static_dependency_identity(&reversed, 2)
        );

        // `index` is declared directly, so its child is inside the depth limit
        let mut bumped = vec![direct(), nested()];
        bumped[0].children[0].fingerprint = "1.0".to_string();
        assert_ne!(
            static_dependency_identity(&reversed, 2),
            static_dependency_identity(&bumped, 2)
        );
    }

    #[test]
    fn test_duplicates_counted_once() {
        let once = vec![Dependency::new("scoring", "v3")];
        let twice = vec![
            Dependency::new("scoring", "v3"),
            Dependency::new("scoring", "v3"),
        ];
        assert_eq!(
            static_dependency_identity(&once, 2),
            static_dependency_identity(&twice, 2)
        );
    }
}
