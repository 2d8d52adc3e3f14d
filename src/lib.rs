//! Trellis: dependency-aware pipelines with a content-addressed node cache
//!
//! Register [`Node`]s in a [`Graph`], then execute it with a [`Runner`].
//! Cache-enabled nodes are fingerprinted by code, declared dependencies,
//! parent signatures, inputs, and an optional manual version; a matching
//! fingerprint replaces execution with the stored output.
//!
//! ```rust
//! use trellis::{Args, CacheConfig, Environment, Graph, Node, Runner, Value};
//!
//! let mut graph = Graph::new();
//! graph
//!     .add_node(
//!         Node::new("foo_out", |args: &Args| Ok(Value::Int(args.int("a")? + args.int("b")?)))
//!             .params(["a", "b"])
//!             .cache(true),
//!     )
//!     .unwrap();
//! graph
//!     .add_node(
//!         Node::new("bar_out", |args: &Args| Ok(Value::Int(args.int("foo_out")? * args.int("c")?)))
//!             .params(["foo_out", "c"])
//!             .cache(true),
//!     )
//!     .unwrap();
//!
//! let runner = Runner::new(graph).cache(CacheConfig::memory());
//! let inputs: Environment = [("a", 1), ("b", 2), ("c", 3)]
//!     .into_iter()
//!     .map(|(k, v)| (k.to_string(), Value::Int(v)))
//!     .collect();
//!
//! let out = runner.run(inputs.clone()).unwrap();
//! assert_eq!(out["bar_out"], Value::Int(9));
//!
//! runner.run(inputs).unwrap();
//! assert_eq!(runner.last_stats().hits(), 2);
//! ```

pub mod config;
pub mod graph;
pub mod logging;
pub mod runner;
pub mod signature;
pub mod storage;
pub mod value;

pub use config::{default_cache_dir, TrellisConfig};
pub use graph::{Args, Dependency, Graph, GraphError, Node};
pub use runner::{
    BatchExecutor, BatchRequest, CacheConfig, CacheOutcome, ExecutionMode, LoopExecutor, RunError,
    RunStats, Runner,
};
pub use signature::{Signature, SignatureOptions};
pub use storage::{CacheBackend, CacheError, DiskCache, MemoryCache};
pub use value::{Environment, Handle, IdentityProvider, Resource, Value};
