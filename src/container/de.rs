//! serde `Deserializer` over squeezed MAT values
//!
//! Squeezing makes shapes ambiguous: a cell of one word arrives as plain
//! text, a one-sample signal as a scalar. The deserializer absorbs that so
//! target structs can declare the shape they mean:
//! - a non-list value where a sequence is expected is a sequence of one
//! - a one-element list where a single value is expected is unwrapped
//! - integer targets accept integral doubles
//! - `Option` targets read NaN and empty arrays as `None`
//! - enums are read from text

use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer, Unexpected, Visitor};
use serde::forward_to_deserialize_any;

use super::{ContainerError, Result, Value};

impl de::Error for ContainerError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        ContainerError::Decode(msg.to_string())
    }
}

/// Deserialize a typed value out of a [`Value`] tree
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    T::deserialize(value)
}

impl<'de> IntoDeserializer<'de, ContainerError> for Value {
    type Deserializer = Value;

    fn into_deserializer(self) -> Value {
        self
    }
}

impl Value {
    fn unexpected(&self) -> Unexpected<'_> {
        match self {
            Value::Scalar(x) => Unexpected::Float(*x),
            Value::Logical(b) => Unexpected::Bool(*b),
            Value::Text(s) => Unexpected::Str(s),
            Value::Numbers(_) | Value::Flags(_) | Value::List(_) => Unexpected::Seq,
            Value::Record(_) => Unexpected::Map,
        }
    }

    /// The only element of a one-element list or array, or the value itself
    fn unwrap_single(self) -> Value {
        match self {
            Value::List(mut items) if items.len() == 1 => items.remove(0),
            Value::Numbers(v) if v.len() == 1 => Value::Scalar(v[0]),
            Value::Flags(v) if v.len() == 1 => Value::Logical(v[0]),
            other => other,
        }
    }

    fn into_number(self, expected: &dyn de::Expected) -> Result<f64> {
        match self.unwrap_single() {
            Value::Scalar(x) => Ok(x),
            Value::Logical(b) => Ok(if b { 1.0 } else { 0.0 }),
            other => Err(de::Error::invalid_type(other.unexpected(), expected)),
        }
    }

    fn into_integer(self, expected: &dyn de::Expected) -> Result<f64> {
        let x = self.into_number(expected)?;
        if x.is_finite() && x.fract() == 0.0 {
            Ok(x)
        } else {
            Err(de::Error::invalid_value(Unexpected::Float(x), expected))
        }
    }
}

macro_rules! deserialize_unsigned {
    ($($method:ident => $visit:ident : $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                let x = self.into_integer(&visitor)?;
                if x < 0.0 || x > <$ty>::MAX as f64 {
                    return Err(de::Error::invalid_value(Unexpected::Float(x), &visitor));
                }
                visitor.$visit(x as $ty)
            }
        )*
    };
}

macro_rules! deserialize_signed {
    ($($method:ident => $visit:ident : $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                let x = self.into_integer(&visitor)?;
                if x < <$ty>::MIN as f64 || x > <$ty>::MAX as f64 {
                    return Err(de::Error::invalid_value(Unexpected::Float(x), &visitor));
                }
                visitor.$visit(x as $ty)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for Value {
    type Error = ContainerError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Value::Scalar(x) => visitor.visit_f64(x),
            Value::Logical(b) => visitor.visit_bool(b),
            Value::Text(s) => visitor.visit_string(s),
            Value::Numbers(v) => visit_list(v.into_iter().map(Value::Scalar), visitor),
            Value::Flags(v) => visit_list(v.into_iter().map(Value::Logical), visitor),
            Value::List(items) => visit_list(items.into_iter(), visitor),
            Value::Record(fields) => {
                let mut map = MapDeserializer::<_, ContainerError>::new(fields.into_iter());
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.unwrap_single() {
            Value::Logical(b) => visitor.visit_bool(b),
            Value::Scalar(x) => visitor.visit_bool(x != 0.0),
            other => Err(de::Error::invalid_type(other.unexpected(), &visitor)),
        }
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let x = self.into_number(&visitor)?;
        visitor.visit_f64(x)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let x = self.into_number(&visitor)?;
        visitor.visit_f32(x as f32)
    }

    deserialize_unsigned! {
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
    }

    deserialize_signed! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.unwrap_single() {
            Value::Text(s) => visitor.visit_string(s),
            other => Err(de::Error::invalid_type(other.unexpected(), &visitor)),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let missing = match &self {
            Value::Scalar(x) => x.is_nan(),
            Value::Logical(_) | Value::Text(_) => false,
            array => array.is_empty(),
        };
        if missing {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Value::List(items) => visit_list(items.into_iter(), visitor),
            Value::Numbers(v) => visit_list(v.into_iter().map(Value::Scalar), visitor),
            Value::Flags(v) => visit_list(v.into_iter().map(Value::Logical), visitor),
            single => visit_list(std::iter::once(single), visitor),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.unwrap_single() {
            Value::Record(fields) => {
                let mut map = MapDeserializer::<_, ContainerError>::new(fields.into_iter());
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
            other => Err(de::Error::invalid_type(other.unexpected(), &visitor)),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.unwrap_single() {
            Value::Text(s) => visitor.visit_enum(s.into_deserializer()),
            other => Err(de::Error::invalid_type(other.unexpected(), &visitor)),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        char bytes byte_buf unit_struct tuple_struct
    }
}

fn visit_list<'de, I, V>(items: I, visitor: V) -> Result<V::Value>
where
    I: Iterator<Item = Value>,
    V: Visitor<'de>,
{
    let mut seq = SeqDeserializer::<_, ContainerError>::new(items);
    let value = visitor.visit_seq(&mut seq)?;
    seq.end()?;
    Ok(value)
}
