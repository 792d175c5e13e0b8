//! Value-level codec for a closed set of scalar types.
//!
//! Rust's type system already dispatches `Serialize`/`Deserialize` for a
//! typed event payload at compile time, so the common path — an event
//! struct with a `Uuid`, `Decimal`, or `DateTime<Utc>` field — uses the
//! wrapper newtypes in this module ([`HexUuid`], [`DecimalStr`],
//! [`IsoTimestamp`]) directly; their `Serialize`/`Deserialize` impls
//! already produce and consume the self-describing `{__type__, __data__}`
//! envelope, at zero runtime cost.
//!
//! [`TranscoderRegistry`] exists for the cases Rust's static dispatch
//! cannot cover: a dynamically-typed payload (a [`crate::snapshot::Snapshot`]'s
//! free-form state, or any field typed as `serde_json::Value`) that may
//! contain enveloped scalars discovered only at run time, and third-party
//! extension types a consumer wants to register under the same convention.

use std::any::{Any, TypeId, type_name};
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CodecError;

const TYPE_KEY: &str = "__type__";
const DATA_KEY: &str = "__data__";

/// A bidirectional mapping between one scalar Rust type and its
/// self-describing JSON form.
pub trait Transcoding: Send + Sync {
    /// The concrete Rust type this transcoding handles.
    type Value: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// The short, stable name this type is registered under (the
    /// `__type__` value).
    fn name(&self) -> &'static str;

    /// Encodes a value into its `__data__` form.
    fn encode(&self, value: &Self::Value) -> Value;

    /// Decodes a `__data__` form back into a value.
    ///
    /// # Errors
    /// Returns [`CodecError::Serialization`] if `data` is not in the shape
    /// this transcoding expects.
    fn decode(&self, data: Value) -> Result<Self::Value, CodecError>;
}

/// `UUID` encoded as a lowercase hex string (no hyphens).
#[derive(Debug, Default)]
pub struct UuidAsHex;

impl Transcoding for UuidAsHex {
    type Value = Uuid;

    fn name(&self) -> &'static str {
        "uuid_hex"
    }

    fn encode(&self, value: &Uuid) -> Value {
        Value::String(value.simple().to_string())
    }

    fn decode(&self, data: Value) -> Result<Uuid, CodecError> {
        let s = data
            .as_str()
            .ok_or_else(|| CodecError::Serialization("expected a string for uuid_hex".into()))?;
        Uuid::parse_str(s).map_err(|e| CodecError::Serialization(e.to_string()))
    }
}

/// Arbitrary-precision decimal encoded as its canonical decimal string.
#[derive(Debug, Default)]
pub struct DecimalAsStr;

impl Transcoding for DecimalAsStr {
    type Value = Decimal;

    fn name(&self) -> &'static str {
        "decimal_str"
    }

    fn encode(&self, value: &Decimal) -> Value {
        Value::String(value.to_string())
    }

    fn decode(&self, data: Value) -> Result<Decimal, CodecError> {
        let s = data
            .as_str()
            .ok_or_else(|| CodecError::Serialization("expected a string for decimal_str".into()))?;
        s.parse().map_err(|e: rust_decimal::Error| CodecError::Serialization(e.to_string()))
    }
}

/// Timestamp encoded as ISO-8601 with microsecond precision.
#[derive(Debug, Default)]
pub struct DatetimeAsIso;

impl Transcoding for DatetimeAsIso {
    type Value = DateTime<Utc>;

    fn name(&self) -> &'static str {
        "datetime_iso"
    }

    fn encode(&self, value: &DateTime<Utc>) -> Value {
        Value::String(value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    fn decode(&self, data: Value) -> Result<DateTime<Utc>, CodecError> {
        let s = data
            .as_str()
            .ok_or_else(|| CodecError::Serialization("expected a string for datetime_iso".into()))?;
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CodecError::Serialization(e.to_string()))
    }
}

trait ErasedTranscoding: Send + Sync {
    fn name(&self) -> &'static str;
    fn type_id(&self) -> TypeId;
    fn encode_any(&self, value: &dyn Any) -> Result<Value, CodecError>;
    fn decode_any(&self, data: Value) -> Result<Box<dyn Any + Send>, CodecError>;
    fn decode_to_plain(&self, data: Value) -> Result<Value, CodecError>;
}

struct ErasedImpl<C: Transcoding>(C);

impl<C: Transcoding> ErasedTranscoding for ErasedImpl<C> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<C::Value>()
    }

    fn encode_any(&self, value: &dyn Any) -> Result<Value, CodecError> {
        let value = value
            .downcast_ref::<C::Value>()
            .ok_or_else(|| CodecError::UnregisteredType(type_name::<C::Value>()))?;
        Ok(self.0.encode(value))
    }

    fn decode_any(&self, data: Value) -> Result<Box<dyn Any + Send>, CodecError> {
        Ok(Box::new(self.0.decode(data)?))
    }

    fn decode_to_plain(&self, data: Value) -> Result<Value, CodecError> {
        let value = self.0.decode(data)?;
        serde_json::to_value(&value).map_err(|e| CodecError::Serialization(e.to_string()))
    }
}

/// An open registry of [`Transcoding`]s, keyed by both the concrete Rust
/// type and a short name.
///
/// Registering the same type or name again replaces the prior entry, per
/// the "duplicate registration replaces" rule.
pub struct TranscoderRegistry {
    by_type: DashMap<TypeId, &'static str>,
    by_name: DashMap<&'static str, std::sync::Arc<dyn ErasedTranscoding>>,
}

impl fmt::Debug for TranscoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscoderRegistry")
            .field("registered", &self.by_name.len())
            .finish()
    }
}

impl Default for TranscoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscoderRegistry {
    /// Creates an empty registry with no entries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_type: DashMap::new(),
            by_name: DashMap::new(),
        }
    }

    /// Creates a registry pre-populated with the three built-in entries:
    /// `UUID`, arbitrary-precision decimal, and timestamp.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(UuidAsHex);
        registry.register(DecimalAsStr);
        registry.register(DatetimeAsIso);
        registry
    }

    /// Registers `coding`, replacing any existing entry for the same type
    /// or the same name.
    pub fn register<C: Transcoding + 'static>(&self, coding: C) {
        let type_id = TypeId::of::<C::Value>();
        let name = coding.name();
        let erased = std::sync::Arc::new(ErasedImpl(coding));
        self.by_type.insert(type_id, name);
        self.by_name.insert(name, erased);
    }

    /// Encodes `value` into the self-describing envelope
    /// `{"__type__": <name>, "__data__": <data>}`.
    ///
    /// # Errors
    /// Returns [`CodecError::UnregisteredType`] if no transcoding is
    /// registered for `T`.
    pub fn encode<T: 'static>(&self, value: &T) -> Result<Value, CodecError> {
        let type_id = TypeId::of::<T>();
        let name = *self
            .by_type
            .get(&type_id)
            .ok_or(CodecError::UnregisteredType(type_name::<T>()))?;
        let erased = self.by_name.get(name).expect("by_type and by_name stay in sync");
        let data = erased.encode_any(value)?;
        let mut envelope = Map::with_capacity(2);
        envelope.insert(TYPE_KEY.to_owned(), Value::String(name.to_owned()));
        envelope.insert(DATA_KEY.to_owned(), data);
        Ok(Value::Object(envelope))
    }

    /// Decodes an envelope previously produced by [`Self::encode`] back
    /// into a `T`.
    ///
    /// # Errors
    /// Returns [`CodecError::Serialization`] if `envelope` is not a
    /// well-formed envelope, [`CodecError::UnknownTypeName`] if its
    /// `__type__` has no registered transcoding, or
    /// [`CodecError::Serialization`] if the registered transcoding decodes
    /// to a different type than `T`.
    pub fn decode<T: 'static>(&self, envelope: Value) -> Result<T, CodecError> {
        let (name, data) = split_envelope(envelope)?;
        let erased = self
            .by_name
            .get(name.as_str())
            .ok_or(CodecError::UnknownTypeName(name))?;
        if ErasedTranscoding::type_id(&**erased) != TypeId::of::<T>() {
            return Err(CodecError::Serialization(format!(
                "transcoding `{}` does not produce `{}`",
                erased.name(),
                type_name::<T>()
            )));
        }
        let boxed = erased.decode_any(data)?;
        Ok(*boxed.downcast::<T>().expect("type_id checked above"))
    }

    /// Recursively walks `value`, replacing every self-describing envelope
    /// found anywhere in the tree (object fields, array elements) with its
    /// plain decoded JSON form. Values that are not envelopes are returned
    /// unchanged. Unknown `__type__` names fail with
    /// [`CodecError::UnknownTypeName`].
    pub fn decode_value(&self, value: Value) -> Result<Value, CodecError> {
        match value {
            Value::Object(map) => {
                if let Some((name, data)) = as_envelope(&map) {
                    let erased = self
                        .by_name
                        .get(name.as_str())
                        .ok_or_else(|| CodecError::UnknownTypeName(name.clone()))?;
                    erased.decode_to_plain(data)
                } else {
                    let mut decoded = Map::with_capacity(map.len());
                    for (key, value) in map {
                        decoded.insert(key, self.decode_value(value)?);
                    }
                    Ok(Value::Object(decoded))
                }
            }
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.decode_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }
}

fn as_envelope(map: &Map<String, Value>) -> Option<(String, Value)> {
    if map.len() == 2 {
        if let (Some(Value::String(name)), Some(data)) = (map.get(TYPE_KEY), map.get(DATA_KEY)) {
            return Some((name.clone(), data.clone()));
        }
    }
    None
}

fn split_envelope(value: Value) -> Result<(String, Value), CodecError> {
    match value {
        Value::Object(map) => as_envelope(&map)
            .ok_or_else(|| CodecError::Serialization("expected a {__type__, __data__} envelope".into())),
        _ => Err(CodecError::Serialization("expected a {__type__, __data__} envelope".into())),
    }
}

/// `UUID` wrapper whose `Serialize`/`Deserialize` impls always produce and
/// consume the `uuid_hex` envelope, so typed event payloads need no
/// registry lookup at encode/decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexUuid(pub Uuid);

impl Serialize for HexUuid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        envelope_value(UuidAsHex.name(), UuidAsHex.encode(&self.0)).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HexUuid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let (_, data) = split_envelope(value).map_err(serde::de::Error::custom)?;
        UuidAsHex.decode(data).map(HexUuid).map_err(serde::de::Error::custom)
    }
}

/// Decimal wrapper whose `Serialize`/`Deserialize` impls always produce and
/// consume the `decimal_str` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalStr(pub Decimal);

impl Serialize for DecimalStr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        envelope_value(DecimalAsStr.name(), DecimalAsStr.encode(&self.0)).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DecimalStr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let (_, data) = split_envelope(value).map_err(serde::de::Error::custom)?;
        DecimalAsStr.decode(data).map(DecimalStr).map_err(serde::de::Error::custom)
    }
}

/// Timestamp wrapper whose `Serialize`/`Deserialize` impls always produce
/// and consume the `datetime_iso` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoTimestamp(pub DateTime<Utc>);

impl Serialize for IsoTimestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        envelope_value(DatetimeAsIso.name(), DatetimeAsIso.encode(&self.0)).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IsoTimestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let (_, data) = split_envelope(value).map_err(serde::de::Error::custom)?;
        DatetimeAsIso.decode(data).map(IsoTimestamp).map_err(serde::de::Error::custom)
    }
}

fn envelope_value(name: &'static str, data: Value) -> Value {
    let mut map = Map::with_capacity(2);
    map.insert(TYPE_KEY.to_owned(), Value::String(name.to_owned()));
    map.insert(DATA_KEY.to_owned(), data);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uuid_round_trips_through_the_registry() {
        let registry = TranscoderRegistry::with_defaults();
        let id = Uuid::new_v4();
        let envelope = registry.encode(&id).unwrap();
        assert_eq!(envelope["__type__"], "uuid_hex");
        let decoded: Uuid = registry.decode(envelope).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn unregistered_type_is_a_codec_error() {
        let registry = TranscoderRegistry::new();
        let err = registry.encode(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CodecError::UnregisteredType(_)));
    }

    #[test]
    fn decode_value_unwraps_nested_envelopes() {
        let registry = TranscoderRegistry::with_defaults();
        let id = Uuid::new_v4();
        let tree = json!({
            "account": { "id": registry.encode(&id).unwrap(), "note": "hello" },
            "tags": [registry.encode(&id).unwrap()],
        });
        let decoded = registry.decode_value(tree).unwrap();
        assert_eq!(decoded["account"]["id"], json!(id.simple().to_string()));
        assert_eq!(decoded["account"]["note"], json!("hello"));
        assert_eq!(decoded["tags"][0], json!(id.simple().to_string()));
    }

    #[test]
    fn duplicate_registration_replaces_the_prior_entry() {
        struct AlwaysZero;
        impl Transcoding for AlwaysZero {
            type Value = Decimal;
            fn name(&self) -> &'static str {
                "decimal_str"
            }
            fn encode(&self, _value: &Decimal) -> Value {
                Value::String("0".to_owned())
            }
            fn decode(&self, _data: Value) -> Result<Decimal, CodecError> {
                Ok(Decimal::ZERO)
            }
        }
        let registry = TranscoderRegistry::with_defaults();
        registry.register(AlwaysZero);
        let envelope = registry.encode(&Decimal::new(500, 2)).unwrap();
        assert_eq!(envelope["__data__"], "0");
    }

    #[test]
    fn newtypes_round_trip_via_serde_json() {
        let wrapped = HexUuid(Uuid::new_v4());
        let value = serde_json::to_value(&wrapped).unwrap();
        assert_eq!(value["__type__"], "uuid_hex");
        let back: HexUuid = serde_json::from_value(value).unwrap();
        assert_eq!(back, wrapped);
    }
}
