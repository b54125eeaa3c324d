//! # Parameter Codec
//!
//! Bidirectional mapping between a typed parameter record and the property
//! map carried by a message.
//!
//! The member table of a record is the one serde derives for it, so members
//! are located by name without any runtime reflection:
//!
//! - **Decode** starts from `T::default()` and overwrites every member whose
//!   name appears in the property map. Properties with no matching member
//!   (such as the routing discriminator) are skipped before they are looked
//!   at; members missing from the map keep their default value.
//! - **Encode** emits one property per member. `None` members are omitted,
//!   since the property map has no null type, and decode back to `None`.
//!
//! Floats travel as [`PropertyValue::Float`], infinities and NaN included.
//! Timestamp members encode as RFC 3339 strings; a
//! [`PropertyValue::Timestamp`] property decodes into either a timestamp or a
//! string member.
//!
//! Record types must not use `#[serde(deny_unknown_fields)]`, which would turn
//! the routing discriminator into a decode failure.

use std::fmt;

use serde::de::value::{MapDeserializer, StringDeserializer};
use serde::de::{self, DeserializeOwned, Deserializer, IntoDeserializer, Visitor};
use serde::ser::{self, Impossible, SerializeMap, SerializeStruct, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::messaging::{PropertyMap, PropertyValue};

/// Type name used for errors raised inside serde, replaced by the caller's
const RECORD: &str = "parameter record";

/// Typed parameter record carried in a message's property map
///
/// Implemented for every serde record with a zero-argument constructor
/// (`Default`).
///
/// ```rust
/// use queue_processors::codec;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct ResizeImage {
///     image_id: String,
///     width: u32,
/// }
///
/// let params = ResizeImage { image_id: "img-1".into(), width: 640 };
/// let fields = codec::encode(&params).unwrap();
/// assert_eq!(codec::decode::<ResizeImage>(&fields).unwrap(), params);
/// ```
pub trait MessageParams: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

impl<T> MessageParams for T where T: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("{type_name} is not a record with named members")]
    NotARecord { type_name: &'static str },

    #[error("Member '{member}' holds a {kind} value, which cannot be carried as a message property")]
    Unrepresentable { member: String, kind: &'static str },

    #[error("Failed to decode {type_name}: {message}")]
    Decode {
        type_name: &'static str,
        message: String,
    },

    #[error("Failed to encode {type_name}: {message}")]
    Encode {
        type_name: &'static str,
        message: String,
    },
}

impl CodecError {
    fn not_a_record<T>() -> Self {
        Self::NotARecord {
            type_name: std::any::type_name::<T>(),
        }
    }

    fn unrepresentable(member: impl Into<String>, kind: &'static str) -> Self {
        Self::Unrepresentable {
            member: member.into(),
            kind,
        }
    }

    fn encode<T>(message: impl ToString) -> Self {
        Self::Encode {
            type_name: std::any::type_name::<T>(),
            message: message.to_string(),
        }
    }

    /// Attribute a serde-raised error to the record type `T`
    fn for_type<T>(self) -> Self {
        let type_name = std::any::type_name::<T>();
        match self {
            Self::Decode { message, .. } => Self::Decode { type_name, message },
            Self::Encode { message, .. } => Self::Encode { type_name, message },
            other => other,
        }
    }
}

impl ser::Error for CodecError {
    fn custom<M: fmt::Display>(msg: M) -> Self {
        Self::Encode {
            type_name: RECORD,
            message: msg.to_string(),
        }
    }
}

impl de::Error for CodecError {
    fn custom<M: fmt::Display>(msg: M) -> Self {
        Self::Decode {
            type_name: RECORD,
            message: msg.to_string(),
        }
    }
}

/// Decode a parameter record from a property map
pub fn decode<T: MessageParams>(fields: &PropertyMap) -> Result<T, CodecError> {
    let members = record_members(&T::default())?;
    let mut merged = encode(&T::default())?;

    for (name, value) in fields {
        if members.contains_key(name) {
            merged.insert(name.clone(), value.clone());
        }
    }

    let entries = merged
        .into_iter()
        .map(|(name, value)| (name, PropertyDeserializer(value)));
    let deserializer: MapDeserializer<'_, _, CodecError> = MapDeserializer::new(entries);

    T::deserialize(deserializer).map_err(CodecError::for_type::<T>)
}

/// Encode a parameter record into a property map
pub fn encode<T: MessageParams>(value: &T) -> Result<PropertyMap, CodecError> {
    value
        .serialize(RecordSerializer {
            type_name: std::any::type_name::<T>(),
        })
        .map_err(CodecError::for_type::<T>)
}

/// Names of the members of `T`, sorted by name
pub fn member_names<T: MessageParams>() -> Result<Vec<String>, CodecError> {
    Ok(record_members(&T::default())?.keys().cloned().collect())
}

/// Member table of a record, `None` members included
fn record_members<T: Serialize>(value: &T) -> Result<Map<String, Value>, CodecError> {
    match serde_json::to_value(value).map_err(|e| CodecError::encode::<T>(e))? {
        Value::Object(members) => Ok(members),
        _ => Err(CodecError::not_a_record::<T>()),
    }
}

/// Serializes a whole record into one property per member
struct RecordSerializer {
    type_name: &'static str,
}

impl RecordSerializer {
    fn not_a_record(&self) -> CodecError {
        CodecError::NotARecord {
            type_name: self.type_name,
        }
    }
}

macro_rules! reject_non_record {
    ($($method:ident($($arg:ty),*) -> $ok:ty;)*) => {
        $(
            fn $method(self, $(_: $arg),*) -> Result<$ok, CodecError> {
                Err(self.not_a_record())
            }
        )*
    };
}

impl Serializer for RecordSerializer {
    type Ok = PropertyMap;
    type Error = CodecError;
    type SerializeSeq = Impossible<PropertyMap, CodecError>;
    type SerializeTuple = Impossible<PropertyMap, CodecError>;
    type SerializeTupleStruct = Impossible<PropertyMap, CodecError>;
    type SerializeTupleVariant = Impossible<PropertyMap, CodecError>;
    type SerializeMap = RecordFields;
    type SerializeStruct = RecordFields;
    type SerializeStructVariant = Impossible<PropertyMap, CodecError>;

    reject_non_record! {
        serialize_bool(bool) -> PropertyMap;
        serialize_i8(i8) -> PropertyMap;
        serialize_i16(i16) -> PropertyMap;
        serialize_i32(i32) -> PropertyMap;
        serialize_i64(i64) -> PropertyMap;
        serialize_u8(u8) -> PropertyMap;
        serialize_u16(u16) -> PropertyMap;
        serialize_u32(u32) -> PropertyMap;
        serialize_u64(u64) -> PropertyMap;
        serialize_f32(f32) -> PropertyMap;
        serialize_f64(f64) -> PropertyMap;
        serialize_char(char) -> PropertyMap;
        serialize_str(&str) -> PropertyMap;
        serialize_bytes(&[u8]) -> PropertyMap;
        serialize_none() -> PropertyMap;
        serialize_unit() -> PropertyMap;
        serialize_unit_struct(&'static str) -> PropertyMap;
        serialize_unit_variant(&'static str, u32, &'static str) -> PropertyMap;
        serialize_seq(Option<usize>) -> Self::SerializeSeq;
        serialize_tuple(usize) -> Self::SerializeTuple;
        serialize_tuple_struct(&'static str, usize) -> Self::SerializeTupleStruct;
        serialize_tuple_variant(&'static str, u32, &'static str, usize) -> Self::SerializeTupleVariant;
        serialize_struct_variant(&'static str, u32, &'static str, usize) -> Self::SerializeStructVariant;
    }

    fn serialize_some<V: ?Sized + Serialize>(self, _: &V) -> Result<PropertyMap, CodecError> {
        Err(self.not_a_record())
    }

    fn serialize_newtype_struct<V: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &V,
    ) -> Result<PropertyMap, CodecError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<V: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &V,
    ) -> Result<PropertyMap, CodecError> {
        Err(self.not_a_record())
    }

    fn serialize_map(self, _: Option<usize>) -> Result<RecordFields, CodecError> {
        Ok(RecordFields::default())
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<RecordFields, CodecError> {
        Ok(RecordFields::default())
    }
}

#[derive(Default)]
struct RecordFields {
    fields: PropertyMap,
    pending_key: Option<String>,
}

impl RecordFields {
    fn insert<V: ?Sized + Serialize>(&mut self, name: String, value: &V) -> Result<(), CodecError> {
        if let Some(property) = value.serialize(MemberSerializer { member: &name })? {
            self.fields.insert(name, property);
        }
        Ok(())
    }
}

impl SerializeStruct for RecordFields {
    type Ok = PropertyMap;
    type Error = CodecError;

    fn serialize_field<V: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &V,
    ) -> Result<(), CodecError> {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> Result<PropertyMap, CodecError> {
        Ok(self.fields)
    }
}

impl SerializeMap for RecordFields {
    type Ok = PropertyMap;
    type Error = CodecError;

    fn serialize_key<K: ?Sized + Serialize>(&mut self, key: &K) -> Result<(), CodecError> {
        match key.serialize(MemberSerializer { member: "<key>" })? {
            Some(PropertyValue::String(name)) => {
                self.pending_key = Some(name);
                Ok(())
            }
            _ => Err(CodecError::unrepresentable("<key>", "non-string key")),
        }
    }

    fn serialize_value<V: ?Sized + Serialize>(&mut self, value: &V) -> Result<(), CodecError> {
        let name = self
            .pending_key
            .take()
            .ok_or_else(|| <CodecError as ser::Error>::custom("map value without a key"))?;
        self.insert(name, value)
    }

    fn end(self) -> Result<PropertyMap, CodecError> {
        Ok(self.fields)
    }
}

/// Serializes one member into a property; `None` when it has no representation
struct MemberSerializer<'a> {
    member: &'a str,
}

impl MemberSerializer<'_> {
    fn unrepresentable(&self, kind: &'static str) -> CodecError {
        CodecError::unrepresentable(self.member, kind)
    }
}

type MemberResult = Result<Option<PropertyValue>, CodecError>;

impl Serializer for MemberSerializer<'_> {
    type Ok = Option<PropertyValue>;
    type Error = CodecError;
    type SerializeSeq = Impossible<Option<PropertyValue>, CodecError>;
    type SerializeTuple = Impossible<Option<PropertyValue>, CodecError>;
    type SerializeTupleStruct = Impossible<Option<PropertyValue>, CodecError>;
    type SerializeTupleVariant = Impossible<Option<PropertyValue>, CodecError>;
    type SerializeMap = Impossible<Option<PropertyValue>, CodecError>;
    type SerializeStruct = Impossible<Option<PropertyValue>, CodecError>;
    type SerializeStructVariant = Impossible<Option<PropertyValue>, CodecError>;

    fn serialize_bool(self, v: bool) -> MemberResult {
        Ok(Some(PropertyValue::Boolean(v)))
    }

    fn serialize_i8(self, v: i8) -> MemberResult {
        self.serialize_i64(v.into())
    }

    fn serialize_i16(self, v: i16) -> MemberResult {
        self.serialize_i64(v.into())
    }

    fn serialize_i32(self, v: i32) -> MemberResult {
        self.serialize_i64(v.into())
    }

    fn serialize_i64(self, v: i64) -> MemberResult {
        Ok(Some(PropertyValue::Integer(v)))
    }

    fn serialize_u8(self, v: u8) -> MemberResult {
        self.serialize_i64(v.into())
    }

    fn serialize_u16(self, v: u16) -> MemberResult {
        self.serialize_i64(v.into())
    }

    fn serialize_u32(self, v: u32) -> MemberResult {
        self.serialize_i64(v.into())
    }

    fn serialize_u64(self, v: u64) -> MemberResult {
        match i64::try_from(v) {
            Ok(v) => self.serialize_i64(v),
            Err(_) => Err(self.unrepresentable("unsigned integer above i64::MAX")),
        }
    }

    fn serialize_f32(self, v: f32) -> MemberResult {
        self.serialize_f64(v.into())
    }

    fn serialize_f64(self, v: f64) -> MemberResult {
        Ok(Some(PropertyValue::Float(v)))
    }

    fn serialize_char(self, v: char) -> MemberResult {
        Ok(Some(PropertyValue::String(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> MemberResult {
        Ok(Some(PropertyValue::String(v.to_owned())))
    }

    fn serialize_bytes(self, _: &[u8]) -> MemberResult {
        Err(self.unrepresentable("byte sequence"))
    }

    fn serialize_none(self) -> MemberResult {
        Ok(None)
    }

    fn serialize_some<V: ?Sized + Serialize>(self, value: &V) -> MemberResult {
        value.serialize(self)
    }

    fn serialize_unit(self) -> MemberResult {
        Ok(None)
    }

    fn serialize_unit_struct(self, _: &'static str) -> MemberResult {
        Ok(None)
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, variant: &'static str) -> MemberResult {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<V: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &V,
    ) -> MemberResult {
        value.serialize(self)
    }

    fn serialize_newtype_variant<V: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &V,
    ) -> MemberResult {
        Err(self.unrepresentable("enum variant with data"))
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, CodecError> {
        Err(self.unrepresentable("sequence"))
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, CodecError> {
        Err(self.unrepresentable("sequence"))
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, CodecError> {
        Err(self.unrepresentable("sequence"))
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, CodecError> {
        Err(self.unrepresentable("enum variant with data"))
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, CodecError> {
        Err(self.unrepresentable("nested record"))
    }

    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, CodecError> {
        Err(self.unrepresentable("nested record"))
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, CodecError> {
        Err(self.unrepresentable("enum variant with data"))
    }
}

/// Feeds one property to the member's `Deserialize` impl
struct PropertyDeserializer(PropertyValue);

impl<'de> IntoDeserializer<'de, CodecError> for PropertyDeserializer {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl<'de> Deserializer<'de> for PropertyDeserializer {
    type Error = CodecError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.0 {
            PropertyValue::String(s) => visitor.visit_string(s),
            PropertyValue::Integer(i) => visitor.visit_i64(i),
            PropertyValue::Float(f) => visitor.visit_f64(f),
            PropertyValue::Boolean(b) => visitor.visit_bool(b),
            PropertyValue::Timestamp(ts) => visitor.visit_string(ts.to_rfc3339()),
        }
    }

    // A present property is always `Some`
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        match self.0 {
            PropertyValue::String(variant) => {
                let variant: StringDeserializer<CodecError> = variant.into_deserializer();
                visitor.visit_enum(variant)
            }
            other => PropertyDeserializer(other).deserialize_any(visitor),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}
