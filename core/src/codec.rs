//! Payload serialization and the decode strategy chosen at construction time.
//!
//! Encoding always goes through a [`Codec`]. Decoding is selected by the queue's
//! [`DecodeStrategy`] type parameter: [`RawString`] hands back the stored payload text,
//! [`Typed`] deserializes it into a concrete type.
//!
//! # Text passthrough
//!
//! ```text
//! "hello"            -> hello              (str / String: stored verbatim)
//! Priority::High     -> "High"             (unit variant: JSON)
//! Tag("x".into())    -> "x"                (newtype struct: JSON)
//! SimpleData { .. }  -> {"id":..}          (JSON)
//! ```
//!
//! Only a value whose serialization is a bare `serialize_str` call counts as text.
//! Types that merely render as a JSON string through a newtype, an enum variant,
//! `collect_str` or `char` are JSON-encoded so a typed reader gets them back.

use std::any::type_name;
use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;

use qdelay_types::DecodeError;
use serde::de::DeserializeOwned;
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::ser::{self, Impossible, Serializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{codec} codec failed: {source}")]
pub struct CodecError {
    codec: &'static str,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl CodecError {
    pub fn new(codec: &'static str, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            codec,
            source: source.into(),
        }
    }
}

/// Pluggable payload serialization.
pub trait Codec: Send + Sync {
    /// Produce the stored text for a payload.
    ///
    /// Payloads that serialize to a plain string must come back verbatim so text
    /// payloads are stored without quoting.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CodecError>;

    fn decode<T: DeserializeOwned>(&self, repr: &str) -> Result<T, CodecError>;
}

/// Default codec: JSON via `serde_json`, with string passthrough.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CodecError> {
        if let Ok(text) = value.serialize(PlainText) {
            return Ok(text);
        }
        serde_json::to_string(value).map_err(|e| CodecError::new("json", e))
    }

    fn decode<T: DeserializeOwned>(&self, repr: &str) -> Result<T, CodecError> {
        serde_json::from_str(repr).map_err(|e| CodecError::new("json", e))
    }
}

/// Serializer that only succeeds for plain text values.
struct PlainText;

#[derive(Debug)]
struct NotText;

impl fmt::Display for NotText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("payload is not plain text")
    }
}

impl StdError for NotText {}

impl ser::Error for NotText {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        Self
    }
}

macro_rules! reject {
    ($($method:ident($($arg:ty),*);)*) => {
        $(
            fn $method(self, $(_: $arg),*) -> Result<String, NotText> {
                Err(NotText)
            }
        )*
    };
}

impl Serializer for PlainText {
    type Ok = String;
    type Error = NotText;
    type SerializeSeq = Impossible<String, NotText>;
    type SerializeTuple = Impossible<String, NotText>;
    type SerializeTupleStruct = Impossible<String, NotText>;
    type SerializeTupleVariant = Impossible<String, NotText>;
    type SerializeMap = Impossible<String, NotText>;
    type SerializeStruct = Impossible<String, NotText>;
    type SerializeStructVariant = Impossible<String, NotText>;

    fn serialize_str(self, v: &str) -> Result<String, NotText> {
        Ok(v.to_owned())
    }

    reject! {
        serialize_bool(bool);
        serialize_i8(i8);
        serialize_i16(i16);
        serialize_i32(i32);
        serialize_i64(i64);
        serialize_u8(u8);
        serialize_u16(u16);
        serialize_u32(u32);
        serialize_u64(u64);
        serialize_f32(f32);
        serialize_f64(f64);
        serialize_char(char);
        serialize_bytes(&[u8]);
        serialize_none();
        serialize_unit();
        serialize_unit_struct(&'static str);
        serialize_unit_variant(&'static str, u32, &'static str);
    }

    fn collect_str<T: fmt::Display + ?Sized>(self, _value: &T) -> Result<String, NotText> {
        Err(NotText)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _value: &T) -> Result<String, NotText> {
        Err(NotText)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _value: &T,
    ) -> Result<String, NotText> {
        Err(NotText)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, NotText> {
        Err(NotText)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, NotText> {
        Err(NotText)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, NotText> {
        Err(NotText)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, NotText> {
        Err(NotText)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, NotText> {
        Err(NotText)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, NotText> {
        Err(NotText)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, NotText> {
        Err(NotText)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, NotText> {
        Err(NotText)
    }
}

/// How claimed payload text is turned into the value handed to consumers.
pub trait DecodeStrategy: Send + Sync {
    type Output: Send;

    fn materialize<C: Codec>(&self, codec: &C, payload_repr: String)
    -> Result<Self::Output, DecodeError>;

    /// Whether `payload_repr` would materialize. Used by strict enqueue.
    fn accepts<C: Codec>(&self, codec: &C, payload_repr: &str) -> Result<(), DecodeError>;
}

/// Return payloads exactly as stored.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawString;

impl DecodeStrategy for RawString {
    type Output = String;

    fn materialize<C: Codec>(&self, _codec: &C, payload_repr: String) -> Result<String, DecodeError> {
        Ok(payload_repr)
    }

    fn accepts<C: Codec>(&self, _codec: &C, _payload_repr: &str) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Deserialize payloads into `T` with the queue's codec.
pub struct Typed<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> Typed<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Typed<T> {}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Typed<{}>", type_name::<T>())
    }
}

impl<T: DeserializeOwned + Send> DecodeStrategy for Typed<T> {
    type Output = T;

    fn materialize<C: Codec>(&self, codec: &C, payload_repr: String) -> Result<T, DecodeError> {
        decode_typed(codec, &payload_repr)
    }

    fn accepts<C: Codec>(&self, codec: &C, payload_repr: &str) -> Result<(), DecodeError> {
        decode_typed::<T, C>(codec, payload_repr).map(drop)
    }
}

/// Decode with the codec, falling back to reading the stored text as a string value.
///
/// Text is stored without quoting, so a `String` payload or a type that deserializes
/// from a string (a UUID, a timestamp) only comes back through the fallback.
fn decode_typed<T: DeserializeOwned, C: Codec>(codec: &C, repr: &str) -> Result<T, DecodeError> {
    codec.decode::<T>(repr).or_else(|err| {
        T::deserialize(StrDeserializer::<ValueError>::new(repr))
            .map_err(|_| DecodeError::payload(type_name::<T>(), err))
    })
}
