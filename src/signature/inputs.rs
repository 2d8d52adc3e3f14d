/// Canonical serialization of node arguments for input fingerprints
///
/// Values are lowered to JSON with deterministic ordering: map keys are
/// sorted (serde_json's default map is ordered), set elements are sorted by
/// their canonical text, and handles are reduced to an identity token, their
/// public attributes, or their run-time instance id.
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;

use super::short_hash;
use crate::value::{Handle, Value};

/// Depth-limited serializer over `Value`
#[derive(Debug, Clone, Copy)]
pub struct InputSerializer {
    max_depth: usize,
    force_instance_ids: bool,
}

impl InputSerializer {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            force_instance_ids: false,
        }
    }

    /// Include every handle's run-time instance id, even when it provides
    /// its own identity
    pub fn with_instance_ids(mut self, force: bool) -> Self {
        self.force_instance_ids = force;
        self
    }

    pub fn serialize(&self, value: &Value) -> JsonValue {
        self.serialize_at(value, 0)
    }

    fn serialize_at(&self, value: &Value, depth: usize) -> JsonValue {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) if f.is_finite() => json!(f),
            Value::Float(f) => json!({ "__float__": non_finite_token(*f) }),
            Value::Str(s) => json!(s),
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.serialize_at(item, depth))
                    .collect(),
            ),
            Value::Set(items) => {
                let mut encoded: Vec<(String, JsonValue)> = items
                    .iter()
                    .map(|item| {
                        let json = self.serialize_at(item, depth);
                        (json.to_string(), json)
                    })
                    .collect();
                encoded.sort_by(|a, b| a.0.cmp(&b.0));
                json!({ "__set__": encoded.into_iter().map(|(_, j)| j).collect::<Vec<_>>() })
            }
            Value::Map(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.serialize_at(v, depth)))
                    .collect(),
            ),
            Value::Record { fields, .. } => JsonValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.serialize_at(v, depth)))
                    .collect(),
            ),
            Value::Handle(handle) => self.serialize_handle(handle, depth),
        }
    }

    fn serialize_handle(&self, handle: &Handle, depth: usize) -> JsonValue {
        let resource = handle.resource();

        if let Some(provider) = resource.identity_provider() {
            let mut token = Map::new();
            token.insert("__cache_key__".to_string(), json!(provider.identity()));
            if self.force_instance_ids {
                token.insert("__id__".to_string(), json!(handle.instance_id()));
            }
            return JsonValue::Object(token);
        }

        if depth < self.max_depth {
            let state: Map<String, JsonValue> = resource
                .attributes()
                .into_iter()
                .filter(|(name, _)| !name.starts_with('_'))
                .map(|(name, v)| (name, self.serialize_at(&v, depth + 1)))
                .collect();

            // Attribute-less objects are told apart by instance
            if !state.is_empty() {
                let mut object = json!({
                    "__class__": resource.type_name(),
                    "__state__": state,
                });
                if self.force_instance_ids {
                    object["__id__"] = json!(handle.instance_id());
                }
                return object;
            }
        }

        json!({
            "__class__": resource.type_name(),
            "__id__": handle.instance_id(),
        })
    }
}

fn non_finite_token(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f > 0.0 {
        "inf"
    } else {
        "-inf"
    }
}

/// Canonical JSON text of a single value
pub fn canonical_json(value: &Value, serialization_depth: usize) -> String {
    InputSerializer::new(serialization_depth)
        .serialize(value)
        .to_string()
}

/// Fingerprint of the resolved arguments of one invocation
pub fn input_identity(
    args: &BTreeMap<String, Value>,
    serialization_depth: usize,
    force_instance_ids: bool,
) -> String {
    let serializer = InputSerializer::new(serialization_depth).with_instance_ids(force_instance_ids);
    let serialized: Map<String, JsonValue> = args
        .iter()
        .map(|(name, value)| (name.clone(), serializer.serialize(value)))
        .collect();
    short_hash(JsonValue::Object(serialized).to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{IdentityProvider, Resource};
    use std::any::Any;

    #[derive(Debug)]
    struct Retriever {
        top_k: i64,
        cached_tokens: i64,
    }

    impl Resource for Retriever {
        fn type_name(&self) -> &str {
            "Retriever"
        }

        fn attributes(&self) -> Vec<(String, Value)> {
            vec![
                ("top_k".to_string(), Value::Int(self.top_k)),
                ("_cached_tokens".to_string(), Value::Int(self.cached_tokens)),
            ]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Opaque;

    impl Resource for Opaque {
        fn type_name(&self) -> &str {
            "Opaque"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct ModelClient {
        model: String,
    }

    impl IdentityProvider for ModelClient {
        fn identity(&self) -> String {
            format!("client:{}", self.model)
        }
    }

    impl Resource for ModelClient {
        fn type_name(&self) -> &str {
            "ModelClient"
        }

        fn identity_provider(&self) -> Option<&dyn IdentityProvider> {
            Some(self)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn args(entries: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_non_finite_floats_keep_distinct_identities() {
        let nan = canonical_json(&Value::Float(f64::NAN), 2);
        let inf = canonical_json(&Value::Float(f64::INFINITY), 2);
        let neg_inf = canonical_json(&Value::Float(f64::NEG_INFINITY), 2);
        let null = canonical_json(&Value::Null, 2);

        assert_eq!(nan, r#"{"__float__":"NaN"}"#);
        assert_ne!(nan, null);
        assert_ne!(inf, null);
        assert_ne!(inf, neg_inf);
        assert_eq!(canonical_json(&Value::Float(1.5), 2), "1.5");
    }

    #[test]
    fn test_set_order_does_not_matter() {
        let a = args(vec![("tags", Value::set(["b".into(), "a".into(), "c".into()]))]);
        let b = args(vec![("tags", Value::set(["c".into(), "b".into(), "a".into()]))]);
        assert_eq!(input_identity(&a, 2, false), input_identity(&b, 2, false));
    }

    #[test]
    fn test_map_insertion_order_does_not_matter() {
        let forward = Value::map([("x", Value::Int(1)), ("y", Value::Int(2))]);
        let backward = Value::map([("y", Value::Int(2)), ("x", Value::Int(1))]);
        assert_eq!(canonical_json(&forward, 2), canonical_json(&backward, 2));
        assert_eq!(
            input_identity(&args(vec![("m", forward)]), 2, false),
            input_identity(&args(vec![("m", backward)]), 2, false)
        );
    }

    #[test]
    fn test_list_order_matters() {
        let a = args(vec![("xs", Value::List(vec![1.into(), 2.into()]))]);
        let b = args(vec![("xs", Value::List(vec![2.into(), 1.into()]))]);
        assert_ne!(input_identity(&a, 2, false), input_identity(&b, 2, false));
    }

    #[test]
    fn test_private_attributes_are_excluded() {
        let a = Value::handle(Retriever {
            top_k: 5,
            cached_tokens: 10,
        });
        let b = Value::handle(Retriever {
            top_k: 5,
            cached_tokens: 9000,
        });
        let c = Value::handle(Retriever {
            top_k: 6,
            cached_tokens: 10,
        });

        let hash = |v: Value| input_identity(&args(vec![("retriever", v)]), 2, false);
        assert_eq!(hash(a.clone()), hash(b));
        assert_ne!(hash(a), hash(c));
    }

    #[test]
    fn test_attributeless_handles_fall_back_to_instance() {
        let a = Value::handle(Opaque);
        let b = Value::handle(Opaque);
        assert_ne!(canonical_json(&a, 2), canonical_json(&b, 2));
        assert_eq!(canonical_json(&a, 2), canonical_json(&a.clone(), 2));
    }

    #[test]
    fn test_depth_limit_falls_back_to_instance() {
        let a = Value::handle(Retriever {
            top_k: 5,
            cached_tokens: 0,
        });
        let b = Value::handle(Retriever {
            top_k: 5,
            cached_tokens: 0,
        });
        assert_eq!(canonical_json(&a, 1), canonical_json(&b, 1));
        assert_ne!(canonical_json(&a, 0), canonical_json(&b, 0));
    }

    #[test]
    fn test_identity_provider_is_used_verbatim() {
        let a = Value::handle(ModelClient {
            model: "small".to_string(),
        });
        let b = Value::handle(ModelClient {
            model: "small".to_string(),
        });
        assert_eq!(canonical_json(&a, 2), r#"{"__cache_key__":"client:small"}"#);
        assert_eq!(canonical_json(&a, 2), canonical_json(&b, 2));

        // Side-effecting nodes still tell instances apart
        let forced = |v: &Value| InputSerializer::new(2).with_instance_ids(true).serialize(v);
        assert_ne!(forced(&a), forced(&b));
    }

    #[test]
    fn test_records_hash_by_fields() {
        let a = Value::record("Query", [("query_uuid", "q1".into()), ("text", "hi".into())]);
        let b = Value::record("Query", [("text", "hi".into()), ("query_uuid", "q1".into())]);
        assert_eq!(canonical_json(&a, 2), canonical_json(&b, 2));
    }
}
