use std::fmt;

use serde::de::value::StrDeserializer;
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Bool,
    Int,
    Uint,
    Float,
}

impl ScalarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the value a decode call must produce.
///
/// Built once per call from the destination type and never mutated. Struct
/// and enum descriptors record names only; nested field shapes are left to
/// serde when the value is materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDescriptor {
    Primitive(ScalarKind),
    Struct {
        name: &'static str,
        fields: Vec<&'static str>,
    },
    Slice(Box<TargetDescriptor>),
    Map(Box<TargetDescriptor>),
    /// `Option<T>` or a newtype wrapper around `T`.
    Pointer(Box<TargetDescriptor>),
    Enum {
        name: &'static str,
        variants: Vec<&'static str>,
    },
    /// Self-describing targets such as `serde_json::Value`.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Scalar(ScalarKind),
    Composite,
}

impl TargetDescriptor {
    pub fn of<T: DeserializeOwned>() -> Self {
        describe::<T>()
    }

    pub fn classify(&self) -> Dispatch {
        match self {
            Self::Primitive(kind) => Dispatch::Scalar(*kind),
            _ => Dispatch::Composite,
        }
    }

    /// Strips any number of `Pointer` layers.
    pub fn peel(&self) -> &Self {
        let mut current = self;
        while let Self::Pointer(inner) = current {
            current = inner;
        }
        current
    }

    pub fn is_object_like(&self) -> bool {
        matches!(
            self.peel(),
            Self::Struct { .. } | Self::Map(_) | Self::Enum { .. }
        )
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.peel(), Self::Slice(_))
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(kind) => write!(f, "{kind}"),
            Self::Struct { name, fields } => write!(f, "struct {name}{{{}}}", fields.join(", ")),
            Self::Slice(elem) => write!(f, "[{elem}]"),
            Self::Map(value) => write!(f, "map<string, {value}>"),
            Self::Pointer(inner) => write!(f, "*{inner}"),
            Self::Enum { name, .. } => write!(f, "enum {name}"),
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// Derives the descriptor for `T` by driving its `Deserialize` impl against a
/// probe that records the first shape `T` asks for.
pub fn describe<T: DeserializeOwned>() -> TargetDescriptor {
    match T::deserialize(Probe) {
        Err(ProbeError::Found(descriptor)) => descriptor,
        Ok(_) | Err(ProbeError::Custom(_)) => TargetDescriptor::Dynamic,
    }
}

#[derive(Debug)]
enum ProbeError {
    Found(TargetDescriptor),
    Custom(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(descriptor) => write!(f, "probe found {descriptor}"),
            Self::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ProbeError {}

impl de::Error for ProbeError {
    fn custom<M: fmt::Display>(msg: M) -> Self {
        Self::Custom(msg.to_string())
    }
}

fn found<V>(descriptor: TargetDescriptor) -> Result<V, ProbeError> {
    Err(ProbeError::Found(descriptor))
}

fn scalar<V>(kind: ScalarKind) -> Result<V, ProbeError> {
    found(TargetDescriptor::Primitive(kind))
}

fn probed<V>(result: Result<V, ProbeError>) -> TargetDescriptor {
    match result {
        Err(ProbeError::Found(descriptor)) => descriptor,
        Ok(_) | Err(ProbeError::Custom(_)) => TargetDescriptor::Dynamic,
    }
}

struct Probe;

impl<'de> de::Deserializer<'de> for Probe {
    type Error = ProbeError;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        found(TargetDescriptor::Dynamic)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Bool)
    }

    fn deserialize_i8<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Int)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Int)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Int)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Int)
    }

    fn deserialize_i128<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Int)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Uint)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Uint)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Uint)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Uint)
    }

    fn deserialize_u128<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Uint)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Float)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::Float)
    }

    fn deserialize_char<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::String)
    }

    fn deserialize_str<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::String)
    }

    fn deserialize_string<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::String)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        found(TargetDescriptor::Slice(Box::new(TargetDescriptor::Primitive(
            ScalarKind::Uint,
        ))))
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let inner = probed(visitor.visit_some(Probe));
        found(TargetDescriptor::Pointer(Box::new(inner)))
    }

    fn deserialize_unit<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        found(TargetDescriptor::Dynamic)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        found(TargetDescriptor::Struct {
            name,
            fields: Vec::new(),
        })
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        // scalar deserializers reject newtype visitors, so keep it composite
        let inner = probed(visitor.visit_newtype_struct(Probe));
        found(TargetDescriptor::Pointer(Box::new(inner)))
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(ProbeSeq)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        found(TargetDescriptor::Slice(Box::new(TargetDescriptor::Dynamic)))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        found(TargetDescriptor::Slice(Box::new(TargetDescriptor::Dynamic)))
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(ProbeMap)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        found(TargetDescriptor::Struct {
            name,
            fields: fields.to_vec(),
        })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        found(TargetDescriptor::Enum {
            name,
            variants: variants.to_vec(),
        })
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        scalar(ScalarKind::String)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        found(TargetDescriptor::Dynamic)
    }
}

struct ProbeSeq;

impl<'de> SeqAccess<'de> for ProbeSeq {
    type Error = ProbeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        let elem = probed(seed.deserialize(Probe));
        found(TargetDescriptor::Slice(Box::new(elem)))
    }
}

struct ProbeMap;

impl<'de> MapAccess<'de> for ProbeMap {
    type Error = ProbeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        let key: StrDeserializer<'static, ProbeError> = "key".into_deserializer();
        match seed.deserialize(key) {
            Ok(key) => Ok(Some(key)),
            // non-string keys: value shape stays unknown
            Err(_) => found(TargetDescriptor::Map(Box::new(TargetDescriptor::Dynamic))),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, Self::Error> {
        let value = probed(seed.deserialize(Probe));
        found(TargetDescriptor::Map(Box::new(value)))
    }
}
