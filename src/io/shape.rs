//! Value-type shape detection, from the type alone.
//!
//! [`shape_of`] runs `T::deserialize` against a deserializer that holds no data and
//! stops at the first request, reporting what the type asked for. Codecs use it to
//! refuse value types they cannot store before any file is touched.

use serde::de::{self, DeserializeOwned, Visitor};
use std::fmt;

/// What a type's `Deserialize` impl asks for first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Shape {
    /// A struct or a map.
    Record,
    /// `deserialize_any` or `deserialize_ignored_any`: needs a self-describing format.
    SelfDescribing,
    /// Anything else, described for error messages.
    Other(&'static str),
    /// The impl did not reach the deserializer (custom impls, enums).
    Unknown,
}

pub(crate) fn shape_of<T: DeserializeOwned>() -> Shape {
    match T::deserialize(ShapeProbe) {
        Err(Found(shape)) => shape,
        Ok(_) => Shape::Unknown,
    }
}

#[derive(Debug)]
struct Found(Shape);

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value shape {:?}", self.0)
    }
}

impl std::error::Error for Found {}

impl de::Error for Found {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        Self(Shape::Unknown)
    }
}

struct ShapeProbe;

macro_rules! stop_with {
    (<$de:lifetime> $($method:ident => $shape:expr),* $(,)?) => {
        $(
            fn $method<V: Visitor<$de>>(self, _visitor: V) -> Result<V::Value, Found> {
                Err(Found($shape))
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for ShapeProbe {
    type Error = Found;

    stop_with! {
        <'de>
        deserialize_any => Shape::SelfDescribing,
        deserialize_ignored_any => Shape::SelfDescribing,
        deserialize_map => Shape::Record,
        deserialize_bool => Shape::Other("a boolean"),
        deserialize_i8 => Shape::Other("a number"),
        deserialize_i16 => Shape::Other("a number"),
        deserialize_i32 => Shape::Other("a number"),
        deserialize_i64 => Shape::Other("a number"),
        deserialize_u8 => Shape::Other("a number"),
        deserialize_u16 => Shape::Other("a number"),
        deserialize_u32 => Shape::Other("a number"),
        deserialize_u64 => Shape::Other("a number"),
        deserialize_f32 => Shape::Other("a number"),
        deserialize_f64 => Shape::Other("a number"),
        deserialize_char => Shape::Other("a string"),
        deserialize_str => Shape::Other("a string"),
        deserialize_string => Shape::Other("a string"),
        deserialize_identifier => Shape::Other("a string"),
        deserialize_bytes => Shape::Other("bytes"),
        deserialize_byte_buf => Shape::Other("bytes"),
        deserialize_option => Shape::Other("an option"),
        deserialize_unit => Shape::Other("a unit"),
        deserialize_seq => Shape::Other("a sequence"),
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Other("a unit")))
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Found> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Other("a sequence")))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Other("a sequence")))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Record))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Found> {
        Err(Found(Shape::Unknown))
    }
}
