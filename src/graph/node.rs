/// Node descriptors
///
/// A node is one computation step: a callable, the parameter names it reads
/// from the run environment, and the name its result is bound under.
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::value::{Environment, Resource, Value};

/// Callable behind a node
pub type NodeFn = dyn Fn(&Args) -> Result<Value> + Send + Sync;

/// Declared parameter of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    /// Defaulted parameters never block scheduling; the callable falls back
    /// to its own default when the name is absent from `Args`.
    pub has_default: bool,
}

/// Declared static dependency of a node's logic
///
/// Stands in for the internal modules a node's implementation pulls in. The
/// fingerprint is usually a version string or a build-time content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub fingerprint: String,
    pub children: Vec<Dependency>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fingerprint: fingerprint.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Dependency) -> Self {
        self.children.push(child);
        self
    }
}

/// Arguments gathered for one node invocation
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: BTreeMap<String, Value>,
}

impl Args {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    /// Collect the declared parameters of `node` that are bound in `env`
    pub fn gather(node: &Node, env: &Environment) -> Self {
        let values = node
            .param_names()
            .filter_map(|name| env.get(name).map(|v| (name.to_string(), v.clone())))
            .collect();
        Self { values }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow!("missing argument '{}'", name))
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        let value = self.get(name)?;
        value
            .as_int()
            .ok_or_else(|| anyhow!("argument '{}' is {}, expected int", name, value.kind()))
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64> {
        if self.contains(name) {
            self.int(name)
        } else {
            Ok(default)
        }
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        let value = self.get(name)?;
        value
            .as_float()
            .ok_or_else(|| anyhow!("argument '{}' is {}, expected float", name, value.kind()))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        let value = self.get(name)?;
        value
            .as_str()
            .ok_or_else(|| anyhow!("argument '{}' is {}, expected str", name, value.kind()))
    }

    pub fn handle<T: Resource>(&self, name: &str) -> Result<&T> {
        let value = self.get(name)?;
        value.downcast::<T>().ok_or_else(|| {
            anyhow!(
                "argument '{}' is not a handle to {}",
                name,
                std::any::type_name::<T>()
            )
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An immutable computation step
#[derive(Clone)]
pub struct Node {
    output_name: String,
    callable: Arc<NodeFn>,
    callable_name: String,
    params: Vec<Param>,
    map_axis: Option<String>,
    key_attr: Option<String>,
    cache_enabled: bool,
    cache_version: Option<String>,
    code_version: Option<String>,
    dependencies: Vec<Dependency>,
    side_effecting: bool,
}

impl Node {
    /// Create a node binding `output_name`
    ///
    /// Caching is off until `.cache(true)` is set.
    pub fn new<F>(output_name: impl Into<String>, callable: F) -> Self
    where
        F: Fn(&Args) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            output_name: output_name.into(),
            callable_name: std::any::type_name::<F>().to_string(),
            callable: Arc::new(callable),
            params: Vec::new(),
            map_axis: None,
            key_attr: None,
            cache_enabled: false,
            cache_version: None,
            code_version: None,
            dependencies: Vec::new(),
            side_effecting: false,
        }
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            has_default: false,
        });
        self
    }

    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.param(name);
        }
        self
    }

    pub fn param_with_default(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            has_default: true,
        });
        self
    }

    pub fn map_axis(mut self, name: impl Into<String>) -> Self {
        self.map_axis = Some(name.into());
        self
    }

    pub fn key_attr(mut self, name: impl Into<String>) -> Self {
        self.key_attr = Some(name.into());
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Manual override folded into the signature's `env_hash`
    pub fn cache_version(mut self, tag: impl Into<String>) -> Self {
        self.cache_version = Some(tag.into());
        self
    }

    /// Stable identifier of the node's implementation
    pub fn code_version(mut self, id: impl Into<String>) -> Self {
        self.code_version = Some(id.into());
        self
    }

    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Mark a node whose value lies in its side effects on handle arguments
    pub fn side_effecting(mut self, side_effecting: bool) -> Self {
        self.side_effecting = side_effecting;
        self
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn callable_name(&self) -> &str {
        &self.callable_name
    }

    pub fn param_list(&self) -> &[Param] {
        &self.params
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    /// Parameters that must be bound before the node can run
    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| !p.has_default)
            .map(|p| p.name.as_str())
    }

    pub fn map_axis_name(&self) -> Option<&str> {
        self.map_axis.as_deref()
    }

    pub fn key_attr_name(&self) -> Option<&str> {
        self.key_attr.as_deref()
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn cache_version_tag(&self) -> Option<&str> {
        self.cache_version.as_deref()
    }

    pub fn code_version_id(&self) -> Option<&str> {
        self.code_version.as_deref()
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn is_side_effecting(&self) -> bool {
        self.side_effecting
    }

    pub fn call(&self, args: &Args) -> Result<Value> {
        (self.callable)(args)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("output_name", &self.output_name)
            .field("callable_name", &self.callable_name)
            .field("params", &self.params)
            .field("map_axis", &self.map_axis)
            .field("key_attr", &self.key_attr)
            .field("cache_enabled", &self.cache_enabled)
            .field("cache_version", &self.cache_version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_params_skip_defaults() {
        let node = Node::new("out", |args: &Args| Ok(Value::Int(args.int_or("scale", 2)?)))
            .param("x")
            .param_with_default("scale");

        let required: Vec<_> = node.required_params().collect();
        assert_eq!(required, vec!["x"]);
        assert!(node.has_param("scale"));
    }

    #[test]
    fn test_call_uses_args() {
        let node = Node::new("sum", |args: &Args| {
            Ok(Value::Int(args.int("a")? + args.int("b")?))
        })
        .params(["a", "b"]);

        let mut values = BTreeMap::new();
        values.insert("a".to_string(), Value::Int(1));
        values.insert("b".to_string(), Value::Int(2));

        assert_eq!(node.call(&Args::new(values)).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_gather_takes_only_bound_params() {
        let node = Node::new("out", |_: &Args| Ok(Value::Null))
            .param("a")
            .param_with_default("scale");
        let mut env = Environment::new();
        env.insert("a".to_string(), Value::Int(1));
        env.insert("unrelated".to_string(), Value::Int(2));

        let args = Args::gather(&node, &env);
        assert_eq!(args.len(), 1);
        assert!(args.contains("a"));
        assert!(!args.contains("scale"));
    }

    #[test]
    fn test_args_type_errors_name_the_argument() {
        let mut values = BTreeMap::new();
        values.insert("a".to_string(), Value::from("text"));
        let args = Args::new(values);

        let err = args.int("a").unwrap_err().to_string();
        assert!(err.contains("'a'"));
        assert!(err.contains("str"));
        assert!(args.int("b").is_err());
        assert_eq!(args.int_or("b", 7).unwrap(), 7);
    }

    #[test]
    fn test_callable_name_defaults_to_closure_type() {
        let node = Node::new("out", |_: &Args| Ok(Value::Null));
        assert!(node.callable_name().contains("closure"));
    }
}
