//! Node signatures for cache invalidation
//!
//! A signature fingerprints everything that determines a node's output: its
//! code, its declared dependencies plus the signatures of its parents, its
//! resolved arguments, and an optional manual override. Because parent
//! signatures feed into `deps_hash`, a change anywhere upstream changes every
//! downstream signature.

pub mod code;
pub mod inputs;

pub use code::{code_identity, static_dependency_identity};
pub use inputs::{canonical_json, input_identity, InputSerializer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::graph::{Args, Node};
use crate::value::Value;

/// Record id fields tried when no key attribute is declared
const COMMON_ID_FIELDS: [&str; 4] = ["id", "uuid", "key", "name"];

/// SHA-256 of `data`, first 16 hex characters
pub fn short_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hash = hex::encode(hasher.finalize());
    hash[..16].to_string()
}

/// Fingerprint of one node invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    /// Cache key this signature is stored under
    pub key: String,
    pub code_hash: String,
    pub env_hash: String,
    pub inputs_hash: String,
    pub deps_hash: String,
    /// Informational only, never compared
    pub timestamp: DateTime<Utc>,
}

impl Signature {
    /// Equivalence over the four hash components
    pub fn matches(&self, other: &Signature) -> bool {
        self.code_hash == other.code_hash
            && self.env_hash == other.env_hash
            && self.inputs_hash == other.inputs_hash
            && self.deps_hash == other.deps_hash
    }

    /// Compact form folded into children's `deps_hash`
    pub fn digest(&self) -> String {
        short_hash(
            format!(
                "{}|{}|{}|{}",
                self.code_hash, self.env_hash, self.inputs_hash, self.deps_hash
            )
            .as_bytes(),
        )
    }
}

pub fn signatures_equal(a: &Signature, b: &Signature) -> bool {
    a.matches(b)
}

/// Tuning for signature computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureOptions {
    /// Levels of declared dependencies folded into `deps_hash`
    pub dependency_depth: usize,
    /// Attribute levels walked on handles before falling back to instance ids
    pub serialization_depth: usize,
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self {
            dependency_depth: 2,
            serialization_depth: 2,
        }
    }
}

/// Compute the signature of `node` invoked with `args`
///
/// `parent_signatures` maps each parameter bound to an upstream node's
/// output to that node's signature digest.
pub fn compute_signature(
    node: &Node,
    key: &str,
    args: &Args,
    parent_signatures: &BTreeMap<String, String>,
    env_hash: Option<&str>,
    options: &SignatureOptions,
) -> Signature {
    let mut parents: Vec<&str> = parent_signatures.values().map(String::as_str).collect();
    parents.sort_unstable();
    let parent_hash = short_hash(parents.concat().as_bytes());

    Signature {
        key: key.to_string(),
        code_hash: code_identity(node),
        env_hash: env_hash.unwrap_or_default().to_string(),
        inputs_hash: input_identity(
            args.as_map(),
            options.serialization_depth,
            node.is_side_effecting(),
        ),
        deps_hash: format!(
            "{}{}",
            parent_hash,
            static_dependency_identity(node.dependencies(), options.dependency_depth)
        ),
        timestamp: Utc::now(),
    }
}

/// Stable identity of one map-axis item
///
/// Prefers `key_attr`, then a record's common id field, then a structural
/// hash of the item.
pub fn item_key(item: &Value, key_attr: Option<&str>, serialization_depth: usize) -> String {
    if let Some(value) = key_attr.and_then(|attr| item.field(attr)) {
        return key_text(&value, serialization_depth);
    }

    if let Value::Record { .. } = item {
        if let Some(value) = COMMON_ID_FIELDS.iter().find_map(|f| item.field(f)) {
            return key_text(&value, serialization_depth);
        }
    }

    short_hash(canonical_json(item, serialization_depth).as_bytes())
}

fn key_text(value: &Value, serialization_depth: usize) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Bool(b) => b.to_string(),
        other => canonical_json(other, serialization_depth),
    }
}

/// `output_name`, or `output_name::item_key` for per-item entries
pub fn cache_key(output_name: &str, item_key: Option<&str>) -> String {
    match item_key {
        Some(item) if !item.is_empty() => format!("{}::{}", output_name, item),
        _ => output_name.to_string(),
    }
}
