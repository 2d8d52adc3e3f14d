/// Values flowing through a pipeline run
///
/// Every input and node output is a `Value`: a small closed set of shapes the
/// signature engine knows how to fingerprint (primitives, sequences, sets,
/// mappings, records) plus `Handle` for live objects such as model clients or
/// indexes that are shared by reference and never persisted.
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Values bound by name during a run: inputs plus every node output so far
pub type Environment = HashMap<String, Value>;

/// Capability for values that know their own deterministic identity
///
/// When a handle exposes this, the signature engine uses the token verbatim
/// instead of walking the object's attributes.
pub trait IdentityProvider {
    fn identity(&self) -> String;
}

/// A live object passed through the pipeline by reference
pub trait Resource: Any + Send + Sync + fmt::Debug {
    /// Short type name used in fingerprints
    fn type_name(&self) -> &str;

    /// Attributes visible to structural hashing
    ///
    /// Names starting with `_` are treated as private and never hashed.
    fn attributes(&self) -> Vec<(String, Value)> {
        Vec::new()
    }

    fn identity_provider(&self) -> Option<&dyn IdentityProvider> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Shared reference to a `Resource`
#[derive(Clone)]
pub struct Handle(Arc<dyn Resource>);

impl Handle {
    pub fn new<R: Resource>(resource: R) -> Self {
        Self(Arc::new(resource))
    }

    pub fn from_arc(resource: Arc<dyn Resource>) -> Self {
        Self(resource)
    }

    pub fn resource(&self) -> &dyn Resource {
        self.0.as_ref()
    }

    pub fn downcast<T: Resource>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Run-scoped identity of this instance (address of the shared allocation)
    ///
    /// Clones of one handle share the token; distinct instances never do
    /// while both are alive.
    pub fn instance_id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({:?})", self.0.type_name(), self.0)
    }
}

/// A value bound in a run environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Unordered collection; element order never reaches a fingerprint
    Set(Vec<Value>),
    Map(HashMap<String, Value>),
    Record {
        type_name: String,
        fields: Vec<(String, Value)>,
    },
    #[serde(skip)]
    Handle(Handle),
}

impl Value {
    pub fn record<I, K>(type_name: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Record {
            type_name: type_name.to_string(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn handle<R: Resource>(resource: R) -> Self {
        Value::Handle(Handle::new(resource))
    }

    pub fn set<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::Set(items.into_iter().collect())
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Record { .. } => "record",
            Value::Handle(_) => "handle",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, with integers widened
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Value::Handle(h) => Some(h),
            _ => None,
        }
    }

    pub fn downcast<T: Resource>(&self) -> Option<&T> {
        self.as_handle().and_then(Handle::downcast::<T>)
    }

    /// Look up a named field on a record, a map entry, or a handle attribute
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Record { fields, .. } => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone()),
            Value::Map(entries) => entries.get(name).cloned(),
            Value::Handle(h) => h
                .resource()
                .attributes()
                .into_iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// True when this value or anything nested in it is a `Handle`
    pub fn contains_handle(&self) -> bool {
        match self {
            Value::Handle(_) => true,
            Value::List(items) | Value::Set(items) => items.iter().any(Value::contains_handle),
            Value::Map(entries) => entries.values().any(Value::contains_handle),
            Value::Record { fields, .. } => fields.iter().any(|(_, v)| v.contains_handle()),
            _ => false,
        }
    }

    /// True when a NaN or infinite float appears anywhere in the value
    pub fn contains_non_finite(&self) -> bool {
        match self {
            Value::Float(f) => !f.is_finite(),
            Value::List(items) | Value::Set(items) => items.iter().any(Value::contains_non_finite),
            Value::Map(entries) => entries.values().any(Value::contains_non_finite),
            Value::Record { fields, .. } => fields.iter().any(|(_, v)| v.contains_non_finite()),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|item| b.contains(item))
            }
            (Value::Map(a), Value::Map(b)) => a == b,
            (
                Value::Record {
                    type_name: ta,
                    fields: fa,
                },
                Value::Record {
                    type_name: tb,
                    fields: fb,
                },
            ) => ta == tb && fa == fb,
            (Value::Handle(a), Value::Handle(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Handle> for Value {
    fn from(h: Handle) -> Self {
        Value::Handle(h)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Index {
        name: String,
    }

    impl Resource for Index {
        fn type_name(&self) -> &str {
            "Index"
        }

        fn attributes(&self) -> Vec<(String, Value)> {
            vec![("name".to_string(), Value::from(self.name.as_str()))]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_field_lookup() {
        let query = Value::record("Query", [("query_uuid", "q1".into()), ("text", "hi".into())]);
        assert_eq!(query.field("query_uuid"), Some(Value::from("q1")));
        assert_eq!(query.field("missing"), None);

        let index = Value::handle(Index {
            name: "docs".to_string(),
        });
        assert_eq!(index.field("name"), Some(Value::from("docs")));
        assert_eq!(index.downcast::<Index>().unwrap().name, "docs");
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a = Value::set([1.into(), 2.into(), 3.into()]);
        let b = Value::set([3.into(), 1.into(), 2.into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_handles_compare_by_instance() {
        let a = Handle::new(Index {
            name: "docs".to_string(),
        });
        let b = Handle::new(Index {
            name: "docs".to_string(),
        });
        assert_eq!(Value::Handle(a.clone()), Value::Handle(a.clone()));
        assert_ne!(Value::Handle(a.clone()), Value::Handle(b.clone()));
        assert_ne!(a.instance_id(), b.instance_id());
    }

    #[test]
    fn test_serde_rejects_handles() {
        let plain = Value::List(vec![1.into(), "x".into()]);
        let json = serde_json::to_string(&plain).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(plain, back);

        let with_handle = Value::List(vec![Value::handle(Index {
            name: "docs".to_string(),
        })]);
        assert!(with_handle.contains_handle());
        assert!(serde_json::to_string(&with_handle).is_err());
    }
}
