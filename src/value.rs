//! Core value types shared by the rule model, the expression VM, and the
//! repository: [`Data`] (a rule's calculated result), [`Payload`] (a caller's
//! query input), and [`KeyValue`]/[`EventType`] (the driver's wire format).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A rule's calculated result: a mapping from string keys to arbitrary JSON
/// values. Every nested mapping is guaranteed to have string keys -- see
/// [`normalize`].
pub type Data = Map<String, Value>;

/// The caller-supplied query input. Thin wrapper so the expression
/// environment can expose both plain field lookup and the payload helper
/// methods of [`crate::helpers`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload(pub Data);

impl Payload {
    /// Build a payload from an iterator of key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut data = Data::new();
        for (k, v) in pairs {
            data.insert(k.into(), v.into());
        }
        Payload(data)
    }

    /// Look up a field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Stringify a field with the engine's permissive coercion rules
    /// (missing key -> empty string).
    pub fn get_string(&self, key: &str) -> String {
        self.get(key).map(value_to_string).unwrap_or_default()
    }
}

impl From<Data> for Payload {
    fn from(data: Data) -> Self {
        Payload(data)
    }
}

/// Coerce a JSON value to a string the way the embedded `ToString` helper
/// does: strings pass through unchanged, everything else is rendered as its
/// natural textual representation.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Coerce a JSON value to an integer the way the embedded `ToInt` helper
/// does: numbers truncate, strings parse (defaulting to 0 on failure), and
/// booleans map to 0/1.
pub fn value_to_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        Value::Bool(true) => 1,
        Value::Bool(false) => 0,
        _ => 0,
    }
}

/// Truthiness as defined by the advanced rule engine: integer `0` and boolean
/// `false` are false; every other successfully-evaluated value is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map(|i| i != 0).unwrap_or(true),
        _ => true,
    }
}

/// Recursively coerce every nested mapping key to a string. YAML documents
/// may decode mapping keys as arbitrary scalars (ints, bools); every
/// downstream consumer (JSON encoding, schema validation) assumes string
/// keys, so this walk runs once right after parse.
pub fn normalize(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => Value::Array(seq.into_iter().map(normalize).collect()),
        serde_yaml::Value::Mapping(map) => {
            let mut ordered: BTreeMap<String, Value> = BTreeMap::new();
            for (k, v) in map {
                let key = yaml_key_to_string(&k);
                ordered.insert(key, normalize(v));
            }
            let mut out = Data::new();
            for (k, v) in ordered {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => normalize(tagged.value),
    }
}

fn yaml_key_to_string(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

/// Convert a normalized [`Value`] into a top-level [`Data`] map. Non-object
/// values (e.g. a `rule:` block that is a bare scalar) normalize to an empty
/// map rather than erroring, matching the source's permissive conversion.
pub fn into_data(value: Value) -> Data {
    match value {
        Value::Object(map) => map,
        _ => Data::new(),
    }
}

/// The kind of change a [`KeyValue`] event represents on the watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// The key was created or overwritten.
    Put,
    /// The key was removed.
    Delete,
}

/// A single point-in-time observation of a key in the external coordination
/// store, as returned by [`crate::driver::Driver::all`] or streamed by
/// [`crate::driver::Driver::watch`].
#[derive(Debug, Clone)]
pub struct KeyValue {
    /// The store key, e.g. `/rule/payments/discount`.
    pub key: String,
    /// The raw document bytes. Empty for deletes.
    pub value: Vec<u8>,
    /// Whether this is an upsert or a removal.
    pub event_type: EventType,
    /// A fatal stream error. When set, the watch stream is terminating and
    /// `key`/`value` carry no meaningful data.
    pub err: Option<String>,
}

impl KeyValue {
    /// Build a PUT event.
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
            event_type: EventType::Put,
            err: None,
        }
    }

    /// Build a DELETE event.
    pub fn delete(key: impl Into<String>) -> Self {
        KeyValue {
            key: key.into(),
            value: Vec::new(),
            event_type: EventType::Delete,
            err: None,
        }
    }

    /// Build a terminal stream error.
    pub fn fatal(err: impl Into<String>) -> Self {
        KeyValue {
            key: String::new(),
            value: Vec::new(),
            event_type: EventType::Delete,
            err: Some(err.into()),
        }
    }

    /// Whether this event represents a removal (explicit DELETE or an empty
    /// value, per the driver contract).
    pub fn is_delete(&self) -> bool {
        self.event_type == EventType::Delete || self.value.is_empty()
    }
}
