// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Ordered typed attribute dictionary.
//!
//! Every record carries one of these: short string keys mapped to typed
//! values, preserving insertion order. Dictionaries are value-semantic:
//! cloning is a deep copy (cheap: values are small, opaque payloads are
//! refcounted bytes).

use bytes::Bytes;
use indexmap::IndexMap;
use serde::Serialize;

/// An exact rational number (timebases, aspect ratios).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub num: i64,
    pub den: u64,
}

impl Rational {
    #[must_use]
    pub const fn new(num: i64, den: u64) -> Self {
        Self { num, den }
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    String(String),
    Unsigned(u64),
    Signed(i64),
    Rational(Rational),
    /// Presence flag; carries no payload.
    Void,
    /// Small opaque payload.
    #[serde(serialize_with = "serialize_opaque")]
    Opaque(Bytes),
}

/// Custom serializer for opaque bytes: base64 for JSON compatibility.
fn serialize_opaque<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes.as_ref())
        .serialize(serializer)
}

/// Ordered key → typed value map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Dict {
    entries: IndexMap<String, Value>,
}

impl Dict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing any previous value (order position is kept for
    /// replaced keys).
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Removes `key`; true when it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// String value of `key`, if present with that type.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn unsigned(&self, key: &str) -> Option<u64> {
        match self.get(key) {
            Some(Value::Unsigned(v)) => Some(*v),
            _ => None,
        }
    }

    /// Unsigned value with a fallback.
    #[must_use]
    pub fn unsigned_or(&self, key: &str, default: u64) -> u64 {
        self.unsigned(key).unwrap_or(default)
    }

    #[must_use]
    pub fn signed(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(Value::Signed(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn rational(&self, key: &str) -> Option<Rational> {
        match self.get(key) {
            Some(Value::Rational(v)) => Some(*v),
            _ => None,
        }
    }

    /// True when `key` is present as a void (presence flag).
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Void))
    }

    #[must_use]
    pub fn opaque(&self, key: &str) -> Option<&Bytes> {
        match self.get(key) {
            Some(Value::Opaque(b)) => Some(b),
            _ => None,
        }
    }

    /// Iterates entries whose key starts with `prefix`, in insertion order.
    pub fn iter_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// JSON rendering for debug logs.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn typed_access_and_defaults() {
        let mut dict = Dict::new();
        dict.set("flow.def", Value::String("block.".to_string()));
        dict.set("flow.octetrate", Value::Unsigned(8000));
        dict.set("flow.discontinuity", Value::Void);

        assert_eq!(dict.string("flow.def"), Some("block."));
        assert_eq!(dict.unsigned("flow.octetrate"), Some(8000));
        assert_eq!(dict.unsigned_or("missing", 42), 42);
        assert!(dict.has("flow.discontinuity"));
        // Wrong-typed access answers None, not a panic.
        assert_eq!(dict.unsigned("flow.def"), None);
    }

    #[test]
    fn delete_and_clone_are_value_semantic() {
        let mut dict = Dict::new();
        dict.set("a", Value::Signed(-1));
        let copy = dict.clone();
        assert!(dict.delete("a"));
        assert!(!dict.delete("a"));
        assert_eq!(copy.signed("a"), Some(-1));
    }

    #[test]
    fn prefix_iteration_preserves_order() {
        let mut dict = Dict::new();
        dict.set("clock.dts.sys", Value::Unsigned(1));
        dict.set("flow.def", Value::String("block.".to_string()));
        dict.set("clock.dts.prog", Value::Unsigned(2));

        let keys: Vec<&str> = dict.iter_prefix("clock.").map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["clock.dts.sys", "clock.dts.prog"]);
    }

    #[test]
    fn json_rendering() {
        let mut dict = Dict::new();
        dict.set("r", Value::Rational(Rational::new(1, 25)));
        dict.set("o", Value::Opaque(Bytes::from_static(b"\x01\x02")));
        let json = dict.to_json();
        assert_eq!(json["r"]["rational"]["num"], 1);
        assert_eq!(json["o"]["opaque"], "AQI=");
    }
}
