//! A typed, dotted-path view over a rule's calculated [`Data`]. Returned by
//! [`crate::engine::Engine::of`]'s `payload` call, mirroring the way the
//! source's koanf-backed config accessor exposes a calculated map.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::EngineError;
use crate::value::{value_to_int, value_to_string, Data};

/// Read access to a calculated rule result, keyed by dot-delimited paths
/// (`"limits.daily"` reaches `{"limits": {"daily": ...}}`).
#[derive(Debug, Clone)]
pub struct Accessor {
    root: Value,
}

impl Accessor {
    /// Wrap a rule's calculated data for typed access.
    pub fn new(data: Data) -> Self {
        Accessor {
            root: Value::Object(data),
        }
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.root);
        }
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// The raw value at `path`, or `None` if the path does not resolve.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.lookup(path).cloned()
    }

    /// String at `path`, `""` if absent or not coercible.
    pub fn string(&self, path: &str) -> String {
        self.lookup(path).map(value_to_string).unwrap_or_default()
    }

    /// Integer at `path`, `0` if absent or not coercible.
    pub fn int(&self, path: &str) -> i64 {
        self.lookup(path).map(value_to_int).unwrap_or(0)
    }

    /// Boolean at `path`, `false` if absent.
    pub fn bool(&self, path: &str) -> bool {
        matches!(self.lookup(path), Some(Value::Bool(true)))
    }

    /// Float at `path`, `0.0` if absent or not a number.
    pub fn float(&self, path: &str) -> f64 {
        self.lookup(path).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// A string array at `path`. A single scalar is treated as a one-element
    /// list; anything else that isn't an array yields an empty list.
    pub fn strings(&self, path: &str) -> Vec<String> {
        match self.lookup(path) {
            Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
            Some(scalar @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
                vec![value_to_string(scalar)]
            }
            _ => Vec::new(),
        }
    }

    /// Duration at `path`. Accepts a bare number of seconds or a suffixed
    /// string (`"5s"`, `"250ms"`, `"2h"`); unparsable or absent paths yield
    /// [`Duration::ZERO`].
    pub fn duration(&self, path: &str) -> Duration {
        match self.lookup(path) {
            Some(Value::Number(n)) => Duration::from_secs_f64(n.as_f64().unwrap_or(0.0).max(0.0)),
            Some(Value::String(s)) => parse_duration(s).unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    /// Deserialize the value at `path` into a typed struct. A bare number or
    /// a suffixed duration string (`"5s"`, `"250ms"`) coerces directly into a
    /// `std::time::Duration` target, the same way a caller's own
    /// `time.Duration` field is populated in the source's koanf-backed
    /// config accessor.
    pub fn unmarshal<T: DeserializeOwned>(&self, path: &str) -> Result<T, EngineError> {
        let value = self.lookup(path).cloned().unwrap_or(Value::Null);
        T::deserialize(WeakDeserializer(value)).map_err(|e| EngineError::Decode(e.to_string()))
    }

    /// Cut the accessor at `path`, returning a new accessor rooted at that
    /// subtree. An unresolved path yields an accessor over `null`.
    pub fn route(&self, path: &str) -> Accessor {
        Accessor {
            root: self.lookup(path).cloned().unwrap_or(Value::Null),
        }
    }
}

fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split_at = s.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let (number, unit) = s.split_at(split_at);
    let number: f64 = number.parse().ok()?;
    let scale = match unit {
        "ns" => 1e-9,
        "us" | "\u{b5}s" => 1e-6,
        "ms" => 1e-3,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return None,
    };
    Some(Duration::from_secs_f64((number * scale).max(0.0)))
}

/// Wraps a `serde_json::Value` so that `serde`'s built-in `Duration`
/// deserializer (which expects a `{secs, nanos}` struct) also accepts a bare
/// number of seconds or a suffixed duration string. Every other type passes
/// straight through to `serde_json`'s own (self-describing) deserializer.
struct WeakDeserializer(Value);

impl<'de> Deserializer<'de> for WeakDeserializer {
    type Error = serde_json::Error;

    fn deserialize_struct<V>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: serde::de::Visitor<'de>,
    {
        if name == "Duration" {
            let coerced = match &self.0 {
                Value::String(s) => parse_duration(s),
                Value::Number(n) => Some(Duration::from_secs_f64(n.as_f64().unwrap_or(0.0).max(0.0))),
                _ => None,
            };
            if let Some(duration) = coerced {
                let synthetic = serde_json::json!({
                    "secs": duration.as_secs(),
                    "nanos": duration.subsec_nanos(),
                });
                return synthetic.deserialize_struct(name, fields, visitor);
            }
        }
        self.0.deserialize_struct(name, fields, visitor)
    }

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: serde::de::Visitor<'de>,
    {
        self.0.deserialize_any(visitor)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}
