//! Pipeline execution with signature-based caching
//!
//! A [`Runner`] resolves the graph's topological order for the inputs it is
//! given, then executes nodes one at a time. Cache-enabled nodes are
//! fingerprinted first; a stored signature that matches (and whose output is
//! still present) replaces execution entirely. Signatures flow forward from
//! parents to children so any upstream change invalidates everything below
//! it.
//!
//! Runs over a list bound to the map axis either loop over the items
//! locally or hand the mapped part of the graph to a [`BatchExecutor`].

pub mod batch;
pub mod stats;

pub use batch::{partition_mapped, BatchExecutor, BatchRequest, LoopExecutor};
pub use stats::{CacheEvent, CacheOutcome, RunStats};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::graph::{Args, Graph, GraphError, Node};
use crate::logging::{components, operations, status};
use crate::signature::{cache_key, compute_signature, item_key, Signature, SignatureOptions};
use crate::storage::{CacheBackend, MemoryCache};
use crate::value::{Environment, Value};

const DEFAULT_BATCH_THRESHOLD: usize = 2;

/// How a run over a list of items is executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Always loop over items in-process
    Local,
    /// Always hand mapped nodes to the batch executor
    Delegate,
    /// Delegate once the item count reaches the batch threshold
    #[default]
    Auto,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Local => "local",
            ExecutionMode::Delegate => "delegate",
            ExecutionMode::Auto => "auto",
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ExecutionMode::Local),
            "delegate" => Ok(ExecutionMode::Delegate),
            "auto" => Ok(ExecutionMode::Auto),
            other => Err(format!(
                "unknown execution mode '{}' (expected local, delegate or auto)",
                other
            )),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caching behavior of a runner
#[derive(Clone)]
pub struct CacheConfig {
    /// Master switch; when off no signature is computed and the backend is
    /// never touched
    pub enabled: bool,
    pub backend: Arc<dyn CacheBackend>,
    /// Global manual override folded into every signature, unless the node
    /// carries its own `cache_version`
    pub env_hash: Option<String>,
    pub dependency_depth: usize,
    pub serialization_depth: usize,
    /// Key map-axis nodes per item (`output::item`) instead of per output
    pub per_item_caching: bool,
    /// Log a hit/miss summary after every run
    pub verbose: bool,
}

impl CacheConfig {
    /// Caching off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::memory()
        }
    }

    /// Caching on, backed by a fresh in-process store
    pub fn memory() -> Self {
        Self::with_backend(Arc::new(MemoryCache::new()))
    }

    /// Caching on, backed by `backend`
    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        let defaults = SignatureOptions::default();
        Self {
            enabled: true,
            backend,
            env_hash: None,
            dependency_depth: defaults.dependency_depth,
            serialization_depth: defaults.serialization_depth,
            per_item_caching: true,
            verbose: false,
        }
    }

    pub fn env_hash(mut self, env_hash: impl Into<String>) -> Self {
        self.env_hash = Some(env_hash.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn per_item_caching(mut self, per_item: bool) -> Self {
        self.per_item_caching = per_item;
        self
    }

    fn signature_options(&self) -> SignatureOptions {
        SignatureOptions {
            dependency_depth: self.dependency_depth,
            serialization_depth: self.serialization_depth,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("enabled", &self.enabled)
            .field("backend", &self.backend.name())
            .field("env_hash", &self.env_hash)
            .field("dependency_depth", &self.dependency_depth)
            .field("serialization_depth", &self.serialization_depth)
            .field("per_item_caching", &self.per_item_caching)
            .field("verbose", &self.verbose)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A node callable returned an error; `source` is that error as returned
    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Delegated run needs a list bound to map axis '{axis}'")]
    MissingMapAxisItems { axis: String },

    #[error("Batch executor '{executor}' returned {got} outputs for '{node}', expected {expected}")]
    BatchShape {
        executor: &'static str,
        node: String,
        expected: usize,
        got: usize,
    },

    #[error("Batch executor failed: {0}")]
    BatchExecutor(#[source] anyhow::Error),
}

impl RunError {
    /// The node callable's own error, when that is what aborted the run
    pub fn node_error(&self) -> Option<&anyhow::Error> {
        match self {
            RunError::NodeFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Executes a graph against caller inputs
pub struct Runner {
    graph: Arc<Graph>,
    mode: ExecutionMode,
    batch_threshold: usize,
    cache: CacheConfig,
    batch_executor: Option<Arc<dyn BatchExecutor>>,
    last_stats: Mutex<RunStats>,
}

impl Runner {
    pub fn new(graph: impl Into<Arc<Graph>>) -> Self {
        Self {
            graph: graph.into(),
            mode: ExecutionMode::default(),
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            cache: CacheConfig::disabled(),
            batch_executor: None,
            last_stats: Mutex::new(RunStats::new()),
        }
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Minimum item count for `Auto` to delegate
    pub fn batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn batch_executor(mut self, executor: Arc<dyn BatchExecutor>) -> Self {
        self.batch_executor = Some(executor);
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn cache_config(&self) -> &CacheConfig {
        &self.cache
    }

    /// Statistics of the most recent run, including one that failed
    pub fn last_stats(&self) -> RunStats {
        match self.last_stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Execute the graph and return inputs plus every node output
    ///
    /// When the graph has a map axis and `inputs` binds it to a list, the run
    /// is batched: the result binds the final node's output (or, when
    /// delegated, every mapped node's output) to a list aligned with the
    /// items.
    pub fn run(&self, inputs: Environment) -> Result<Environment, RunError> {
        let mut guard = StatsGuard::new(&self.last_stats, self.cache.verbose);

        let axis = self.graph.map_axis().map(str::to_string);
        let item_count = axis
            .as_deref()
            .and_then(|a| inputs.get(a))
            .and_then(Value::as_list)
            .map(<[Value]>::len);

        let Some(axis) = axis else {
            return self.run_single(inputs, &mut guard.stats);
        };

        let delegate = match (self.mode, item_count) {
            (ExecutionMode::Delegate, None) => {
                return Err(RunError::MissingMapAxisItems { axis });
            }
            (ExecutionMode::Delegate, Some(_)) => true,
            (ExecutionMode::Auto, Some(count)) => count >= self.batch_threshold,
            _ => false,
        };

        debug!(
            component = components::RUNNER,
            mode = %self.mode,
            axis = %axis,
            items = ?item_count,
            delegate,
            "selected execution path"
        );

        match item_count {
            Some(_) if delegate => self.run_delegated(inputs, &axis, &mut guard.stats),
            Some(_) => self.run_batch_local(inputs, &axis, &mut guard.stats),
            None => self.run_single(inputs, &mut guard.stats),
        }
    }

    /// One pass over the graph with every input bound to a single value
    fn run_single(&self, inputs: Environment, stats: &mut RunStats) -> Result<Environment, RunError> {
        let order = self
            .graph
            .topological_order(inputs.keys().map(String::as_str))?;

        let item_keys = self.item_keys(&order, &inputs);
        let mut env = inputs;
        let mut signatures = HashMap::new();
        for node in &order {
            let item = item_keys.get(node.output_name()).map(String::as_str);
            let value = self.execute_node(node, &env, item, &mut signatures, stats)?;
            env.insert(node.output_name().to_string(), value);
        }
        Ok(env)
    }

    /// Item keys for every node of a pass that varies with the map axis
    ///
    /// Nodes declaring the axis use their own key attribute; nodes downstream
    /// of them share the key derived with the axis's declared key attribute.
    fn item_keys(&self, order: &[Arc<Node>], env: &Environment) -> HashMap<String, String> {
        let Some(axis) = self.graph.map_axis() else {
            return HashMap::new();
        };
        let Some(item) = env.get(axis).filter(|_| self.cache.per_item_caching) else {
            return HashMap::new();
        };

        let depth = self.cache.serialization_depth;
        let shared = item_key(item, self.graph.map_key_attr(), depth);
        let (mapped, _) = partition_mapped(order, axis);
        mapped
            .iter()
            .map(|node| {
                let key = match node.map_axis_name() {
                    Some(_) => item_key(item, node.key_attr_name(), depth),
                    None => shared.clone(),
                };
                (node.output_name().to_string(), key)
            })
            .collect()
    }

    /// Run every item through `run_single`, collecting the final node's output
    fn run_batch_local(
        &self,
        inputs: Environment,
        axis: &str,
        stats: &mut RunStats,
    ) -> Result<Environment, RunError> {
        let (constants, items) = split_items(inputs, axis);

        let order = self.graph.topological_order(
            constants
                .keys()
                .map(String::as_str)
                .chain(std::iter::once(axis)),
        )?;
        let final_output = order.last().map(|n| n.output_name().to_string());

        let mut collected = Vec::with_capacity(items.len());
        for item in items {
            let mut env = constants.clone();
            env.insert(axis.to_string(), item);
            let mut result = self.run_single(env, stats)?;
            if let Some(name) = &final_output {
                collected.push(result.remove(name).unwrap_or(Value::Null));
            }
        }

        let mut env = constants;
        if let Some(name) = final_output {
            env.insert(name, Value::List(collected));
        }
        Ok(env)
    }

    /// Execute non-mapped nodes locally, then hand the rest to the executor
    fn run_delegated(
        &self,
        inputs: Environment,
        axis: &str,
        stats: &mut RunStats,
    ) -> Result<Environment, RunError> {
        let Some(executor) = self.batch_executor.as_ref() else {
            debug!(
                component = components::BATCH,
                "no batch executor configured, looping over items locally"
            );
            return self.run_batch_local(inputs, axis, stats);
        };

        let (constants, items) = split_items(inputs, axis);
        let order = self.graph.topological_order(
            constants
                .keys()
                .map(String::as_str)
                .chain(std::iter::once(axis)),
        )?;
        let (mapped, unmapped) = partition_mapped(&order, axis);

        let mut env = constants;
        let mut signatures = HashMap::new();
        for node in &unmapped {
            let value = self.execute_node(node, &env, None, &mut signatures, stats)?;
            env.insert(node.output_name().to_string(), value);
        }

        info!(
            component = components::BATCH,
            operation = operations::DELEGATE,
            executor = executor.name(),
            nodes = mapped.len(),
            items = items.len(),
            "delegating mapped nodes"
        );

        let request = BatchRequest {
            nodes: &mapped,
            constants: &env,
            axis,
            items: &items,
        };
        let columns = executor
            .execute(&request)
            .map_err(RunError::BatchExecutor)?;

        if columns.len() != mapped.len() {
            return Err(RunError::BatchShape {
                executor: executor.name(),
                node: "<all mapped nodes>".to_string(),
                expected: mapped.len(),
                got: columns.len(),
            });
        }
        for (node, column) in mapped.iter().zip(&columns) {
            if column.len() != items.len() {
                return Err(RunError::BatchShape {
                    executor: executor.name(),
                    node: node.output_name().to_string(),
                    expected: items.len(),
                    got: column.len(),
                });
            }
        }

        for (node, column) in mapped.iter().zip(columns) {
            env.insert(node.output_name().to_string(), Value::List(column));
        }
        Ok(env)
    }

    /// Resolve one node's output, from the cache when its signature matches
    ///
    /// `item` is the current item's key when the node varies with the map
    /// axis. `signatures` maps output names already resolved in this pass to
    /// their signature digests; the node's own digest is added whether it hit
    /// or missed.
    fn execute_node(
        &self,
        node: &Node,
        env: &Environment,
        item: Option<&str>,
        signatures: &mut HashMap<String, String>,
        stats: &mut RunStats,
    ) -> Result<Value, RunError> {
        let args = Args::gather(node, env);

        if !self.cache.enabled || !node.cache_enabled() {
            let (value, duration) = call_timed(node, &args)?;
            stats.record(CacheEvent {
                node: node.output_name().to_string(),
                cache_key: None,
                outcome: CacheOutcome::Disabled,
                loaded: false,
                duration,
            });
            return Ok(value);
        }

        let key = cache_key(node.output_name(), item);

        let parents: BTreeMap<String, String> = node
            .param_names()
            .filter_map(|p| signatures.get(p).map(|d| (p.to_string(), d.clone())))
            .collect();
        let env_hash = node
            .cache_version_tag()
            .or(self.cache.env_hash.as_deref());
        let signature = compute_signature(
            node,
            &key,
            &args,
            &parents,
            env_hash,
            &self.cache.signature_options(),
        );
        signatures.insert(node.output_name().to_string(), signature.digest());

        if let Some(value) = self.lookup(node, &signature) {
            stats.record(CacheEvent {
                node: node.output_name().to_string(),
                cache_key: Some(key),
                outcome: CacheOutcome::Hit,
                loaded: true,
                duration: Duration::ZERO,
            });
            return Ok(value);
        }

        let (value, duration) = call_timed(node, &args)?;
        self.store(node, &signature, &value);
        stats.record(CacheEvent {
            node: node.output_name().to_string(),
            cache_key: Some(key),
            outcome: CacheOutcome::Miss,
            loaded: false,
            duration,
        });
        Ok(value)
    }

    /// Stored output for a matching signature; backend faults count as misses
    fn lookup(&self, node: &Node, signature: &Signature) -> Option<Value> {
        let key = signature.key.as_str();
        let backend = &self.cache.backend;

        let stored = match backend.get_meta(key) {
            Ok(stored) => stored?,
            Err(e) => {
                warn!(
                    node = node.output_name(),
                    key = key,
                    status = status::ERROR,
                    "cache metadata read failed, treating as miss: {}",
                    e
                );
                return None;
            }
        };

        if !stored.matches(signature) {
            debug!(
                node = node.output_name(),
                key = key,
                status = status::MISS,
                "signature changed"
            );
            return None;
        }

        match backend.get_blob(key) {
            Ok(Some(value)) => {
                debug!(
                    node = node.output_name(),
                    key = key,
                    operation = operations::LOOKUP,
                    status = status::HIT,
                    "cache hit"
                );
                Some(value)
            }
            Ok(None) => {
                debug!(
                    node = node.output_name(),
                    key = key,
                    status = status::MISS,
                    "signature matched but output is missing"
                );
                None
            }
            Err(e) => {
                warn!(
                    node = node.output_name(),
                    key = key,
                    status = status::ERROR,
                    "cache blob read failed, treating as miss: {}",
                    e
                );
                None
            }
        }
    }

    /// Write output then signature; faults are logged and the run goes on
    fn store(&self, node: &Node, signature: &Signature, value: &Value) {
        let backend = &self.cache.backend;
        let result = backend
            .set_blob(&signature.key, value)
            .and_then(|()| backend.set_meta(signature));

        match result {
            Ok(()) => debug!(
                node = node.output_name(),
                key = %signature.key,
                operation = operations::STORE,
                status = status::SUCCESS,
                "cached output"
            ),
            Err(e) => warn!(
                node = node.output_name(),
                key = %signature.key,
                operation = operations::STORE,
                status = status::ERROR,
                backend = backend.name(),
                "cache write failed: {}",
                e
            ),
        }
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("nodes", &self.graph.len())
            .field("mode", &self.mode)
            .field("batch_threshold", &self.batch_threshold)
            .field("cache", &self.cache)
            .field(
                "batch_executor",
                &self.batch_executor.as_ref().map(|e| e.name()),
            )
            .finish()
    }
}

fn call_timed(node: &Node, args: &Args) -> Result<(Value, Duration), RunError> {
    let start = Instant::now();
    let value = node.call(args).map_err(|source| RunError::NodeFailed {
        node: node.output_name().to_string(),
        source,
    })?;
    let duration = start.elapsed();
    debug!(
        node = node.output_name(),
        operation = operations::EXECUTE,
        duration_ms = duration.as_millis() as u64,
        "executed node"
    );
    Ok((value, duration))
}

/// Separate the map-axis list from the constants
fn split_items(mut inputs: Environment, axis: &str) -> (Environment, Vec<Value>) {
    let items = match inputs.remove(axis) {
        Some(Value::List(items)) => items,
        Some(single) => vec![single],
        None => Vec::new(),
    };
    (inputs, items)
}

/// Publishes a run's statistics when the run ends, however it ends
struct StatsGuard<'a> {
    slot: &'a Mutex<RunStats>,
    verbose: bool,
    stats: RunStats,
}

impl<'a> StatsGuard<'a> {
    fn new(slot: &'a Mutex<RunStats>, verbose: bool) -> Self {
        Self {
            slot,
            verbose,
            stats: RunStats::new(),
        }
    }
}

impl Drop for StatsGuard<'_> {
    fn drop(&mut self) {
        let stats = std::mem::take(&mut self.stats);
        if self.verbose {
            stats.log();
        }
        match self.slot.lock() {
            Ok(mut slot) => *slot = stats,
            Err(poisoned) => *poisoned.into_inner() = stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chain(foo_calls: &Arc<AtomicUsize>, bar_calls: &Arc<AtomicUsize>) -> Graph {
        let foo_calls = Arc::clone(foo_calls);
        let bar_calls = Arc::clone(bar_calls);
        let mut graph = Graph::new();
        graph
            .add_node(
                Node::new("foo_out", move |args: &Args| {
                    foo_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Int(args.int("a")? + args.int("b")?))
                })
                .params(["a", "b"])
                .cache(true)
                .code_version("foo-v1"),
            )
            .unwrap();
        graph
            .add_node(
                Node::new("bar_out", move |args: &Args| {
                    bar_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Int(args.int("foo_out")? * args.int("c")?))
                })
                .params(["foo_out", "c"])
                .cache(true)
                .code_version("bar-v1"),
            )
            .unwrap();
        graph
    }

    fn inputs(pairs: &[(&str, i64)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Int(*v)))
            .collect()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("DELEGATE".parse::<ExecutionMode>(), Ok(ExecutionMode::Delegate));
        assert_eq!(ExecutionMode::default(), ExecutionMode::Auto);
        assert!("daft".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_hit_requires_blob() {
        let foo = Arc::new(AtomicUsize::new(0));
        let bar = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(MemoryCache::new());
        let runner = Runner::new(chain(&foo, &bar))
            .cache(CacheConfig::with_backend(backend.clone()));

        runner.run(inputs(&[("a", 1), ("b", 2), ("c", 3)])).unwrap();

        // Signatures survive, outputs do not
        let signatures: Vec<Signature> = ["foo_out", "bar_out"]
            .iter()
            .map(|k| backend.get_meta(k).unwrap().unwrap())
            .collect();
        backend.clear().unwrap();
        for signature in &signatures {
            backend.set_meta(signature).unwrap();
        }

        let out = runner.run(inputs(&[("a", 1), ("b", 2), ("c", 3)])).unwrap();
        assert_eq!(out["bar_out"], Value::Int(9));
        assert_eq!(foo.load(Ordering::SeqCst), 2);
        assert_eq!(bar.load(Ordering::SeqCst), 2);
        assert_eq!(runner.last_stats().misses(), 2);
        assert!(backend.get_blob("bar_out").unwrap().is_some());
    }

    #[test]
    fn test_env_hash_invalidates() {
        let foo = Arc::new(AtomicUsize::new(0));
        let bar = Arc::new(AtomicUsize::new(0));
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());

        let first = Runner::new(chain(&foo, &bar))
            .cache(CacheConfig::with_backend(backend.clone()).env_hash("v1"));
        first.run(inputs(&[("a", 1), ("b", 2), ("c", 3)])).unwrap();

        let second = Runner::new(chain(&foo, &bar))
            .cache(CacheConfig::with_backend(backend).env_hash("v2"));
        second.run(inputs(&[("a", 1), ("b", 2), ("c", 3)])).unwrap();

        assert_eq!(second.last_stats().misses(), 2);
        assert_eq!(foo.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_node_cache_flag() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let graph = Graph::new()
            .with_node(
                Node::new("stamp", move |_: &Args| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                })
                .param("x")
                .cache(false),
            )
            .unwrap();
        let runner = Runner::new(graph).cache(CacheConfig::memory());

        runner.run(inputs(&[("x", 1)])).unwrap();
        runner.run(inputs(&[("x", 1)])).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            runner.last_stats().outcomes_for("stamp"),
            vec![CacheOutcome::Disabled]
        );
    }

    #[test]
    fn test_delegate_without_items_is_rejected() {
        let graph = Graph::new()
            .with_node(
                Node::new("doubled", |args: &Args| Ok(Value::Int(args.int("x")? * 2)))
                    .param("x")
                    .map_axis("x"),
            )
            .unwrap();
        let runner = Runner::new(graph).mode(ExecutionMode::Delegate);

        let err = runner.run(inputs(&[("x", 4)])).unwrap_err();
        assert!(matches!(err, RunError::MissingMapAxisItems { ref axis } if axis == "x"));
    }

    #[test]
    fn test_batch_shape_is_checked() {
        struct Short;
        impl BatchExecutor for Short {
            fn name(&self) -> &'static str {
                "short"
            }
            fn execute(&self, request: &BatchRequest<'_>) -> anyhow::Result<Vec<Vec<Value>>> {
                Ok(vec![vec![Value::Null]; request.nodes.len()])
            }
        }

        let graph = Graph::new()
            .with_node(
                Node::new("doubled", |args: &Args| Ok(Value::Int(args.int("x")? * 2)))
                    .param("x")
                    .map_axis("x"),
            )
            .unwrap();
        let runner = Runner::new(graph)
            .mode(ExecutionMode::Delegate)
            .batch_executor(Arc::new(Short));

        let mut env = Environment::new();
        env.insert(
            "x".to_string(),
            Value::List(vec![Value::Int(1), Value::Int(2)]),
        );
        let err = runner.run(env).unwrap_err();
        assert!(matches!(
            err,
            RunError::BatchShape { expected: 2, got: 1, .. }
        ));
    }
}
