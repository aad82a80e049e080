// SPDX-License-Identifier: MIT OR Apache-2.0

//! Open-ended structured payloads exchanged between peers.
//!
//! A [`Payload`] maps field names to [`Value`]s and always gets encoded as a CBOR map with
//! deterministic (sorted) key order. By convention every payload carries an application-defined
//! message kind in the `K` field and may carry a public-key-shaped routing tag in the `R` field.
use std::collections::BTreeMap;
use std::fmt;

use serde::de::{Error as SerdeError, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::identity::PublicKey;

/// Field carrying the application-defined message kind.
pub const KIND_FIELD: &str = "K";

/// Field carrying the routing tag.
pub const ROUTING_FIELD: &str = "R";

/// Dynamically typed value inside a payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` if this is an integer or a float.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<PublicKey> for Value {
    fn from(value: PublicKey) -> Self {
        Value::Bytes(value.as_bytes().to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Float(value) => serializer.serialize_f64(*value),
            Value::Bytes(value) => serializer.serialize_bytes(value),
            Value::Text(value) => serializer.serialize_str(value),
            Value::Array(values) => serializer.collect_seq(values),
            Value::Map(map) => serializer.collect_map(map),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("number, bytes, string, boolean, null, array or map")
    }

    fn visit_bool<E: SerdeError>(self, value: bool) -> Result<Value, E> {
        Ok(Value::Bool(value))
    }

    fn visit_i64<E: SerdeError>(self, value: i64) -> Result<Value, E> {
        Ok(Value::Integer(value))
    }

    fn visit_u64<E: SerdeError>(self, value: u64) -> Result<Value, E> {
        i64::try_from(value)
            .map(Value::Integer)
            .map_err(|_| E::custom(format!("integer {value} out of range")))
    }

    fn visit_f64<E: SerdeError>(self, value: f64) -> Result<Value, E> {
        Ok(Value::Float(value))
    }

    fn visit_str<E: SerdeError>(self, value: &str) -> Result<Value, E> {
        Ok(Value::Text(value.to_owned()))
    }

    fn visit_string<E: SerdeError>(self, value: String) -> Result<Value, E> {
        Ok(Value::Text(value))
    }

    fn visit_bytes<E: SerdeError>(self, value: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(value.to_vec()))
    }

    fn visit_byte_buf<E: SerdeError>(self, value: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(value))
    }

    fn visit_none<E: SerdeError>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E: SerdeError>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut values = Vec::with_capacity(seq.size_hint().unwrap_or_default().min(1024));
        while let Some(value) = seq.next_element()? {
            values.push(value);
        }
        Ok(Value::Array(values))
    }

    fn visit_map<A>(self, mut access: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }
}

/// Structured payload, a mapping of field names to values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a payload with only the `K` field set.
    pub fn with_kind(kind: i64) -> Self {
        Self::new().with(KIND_FIELD, kind)
    }

    /// Sets a field and returns the payload, for building payloads inline.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_integer)
    }

    pub fn bytes(&self, field: &str) -> Option<&[u8]> {
        self.get(field).and_then(Value::as_bytes)
    }

    /// Application-defined message kind (`K` field).
    pub fn kind(&self) -> Option<i64> {
        self.integer(KIND_FIELD)
    }

    /// Routing tag (`R` field), if present and shaped like a public key.
    pub fn routing(&self) -> Option<PublicKey> {
        self.bytes(ROUTING_FIELD)
            .and_then(|bytes| PublicKey::try_from(bytes).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}

impl From<BTreeMap<String, Value>> for Payload {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self(value)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::cbor::encode_cbor;
    use crate::identity::PublicKey;

    use super::{Payload, Value};

    #[test]
    fn nested_payload_survives_encoding() {
        let mut inner = BTreeMap::new();
        inner.insert("flag".to_string(), Value::Bool(true));

        let payload = Payload::with_kind(20)
            .with("ratio", 0.5)
            .with("data", vec![1u8, 2, 3])
            .with("name", "panda")
            .with("list", vec![Value::Integer(-1), Value::Null])
            .with("inner", Value::Map(inner));

        let bytes = payload.to_bytes().unwrap();
        assert_eq!(Payload::from_bytes(&bytes).unwrap(), payload);
        assert_eq!(payload.kind(), Some(20));
    }

    #[test]
    fn bytes_are_cbor_byte_strings() {
        let bytes = encode_cbor(&Value::Bytes(vec![0xff])).unwrap();
        // Major type 2 (byte string) with length 1.
        assert_eq!(bytes, vec![0x41, 0xff]);
    }

    #[test]
    fn reject_out_of_range_integers() {
        let bytes = encode_cbor(&BTreeMap::from([("K".to_string(), u64::MAX)])).unwrap();
        assert!(Payload::from_bytes(&bytes).is_err());
    }

    #[test]
    fn routing_tag_must_be_key_shaped() {
        let key = PublicKey::from_bytes([5; 32]);
        assert_eq!(Payload::new().with("R", key).routing(), Some(key));
        assert_eq!(Payload::new().with("R", vec![5u8; 31]).routing(), None);
        assert_eq!(Payload::new().with("R", 5).routing(), None);
        assert_eq!(Payload::new().routing(), None);
    }

    #[test]
    fn collect_from_pairs() {
        let payload: Payload = [("K", Value::Integer(2)), ("d", Value::Bytes(vec![1]))]
            .into_iter()
            .collect();
        assert_eq!(payload.kind(), Some(2));
        assert_eq!(payload.bytes("d"), Some(&[1u8][..]));
        assert_eq!(payload.len(), 2);
    }
}
