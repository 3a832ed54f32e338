//! Content descriptors: what occupies a single voxel.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::codec::{
    self, read_len, read_string, read_u8, read_var_i64, read_var_u32, write_string, write_u8,
    write_var_i64, write_var_u32, write_var_u64,
};
use crate::core::{Error, Result};

/// Host material identifier. `0` is the empty (air) state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub u32);

impl StateId {
    pub const AIR: StateId = StateId(0);
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single variant property value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl VariantValue {
    const TAG_BOOL: u8 = 0;
    const TAG_INT: u8 = 1;
    const TAG_TEXT: u8 = 2;

    fn to_json(&self) -> Value {
        match self {
            VariantValue::Bool(b) => Value::Bool(*b),
            VariantValue::Int(i) => Value::from(*i),
            VariantValue::Text(s) => Value::String(s.clone()),
        }
    }

    fn write_compact(&self, writer: &mut impl Write) -> io::Result<()> {
        match self {
            VariantValue::Bool(b) => {
                write_u8(writer, Self::TAG_BOOL)?;
                write_u8(writer, *b as u8)
            }
            VariantValue::Int(i) => {
                write_u8(writer, Self::TAG_INT)?;
                write_var_i64(writer, *i)
            }
            VariantValue::Text(s) => {
                write_u8(writer, Self::TAG_TEXT)?;
                write_string(writer, s)
            }
        }
    }

    fn read_compact(reader: &mut impl Read) -> io::Result<Self> {
        match read_u8(reader)? {
            Self::TAG_BOOL => match read_u8(reader)? {
                0 => Ok(VariantValue::Bool(false)),
                1 => Ok(VariantValue::Bool(true)),
                other => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid bool byte: {}", other),
                )),
            },
            Self::TAG_INT => Ok(VariantValue::Int(read_var_i64(reader)?)),
            Self::TAG_TEXT => Ok(VariantValue::Text(read_string(reader)?)),
            tag => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown variant value tag: {}", tag),
            )),
        }
    }
}

impl From<bool> for VariantValue {
    fn from(value: bool) -> Self {
        VariantValue::Bool(value)
    }
}

impl From<i64> for VariantValue {
    fn from(value: i64) -> Self {
        VariantValue::Int(value)
    }
}

impl From<&str> for VariantValue {
    fn from(value: &str) -> Self {
        VariantValue::Text(value.to_string())
    }
}

impl fmt::Display for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantValue::Bool(b) => write!(f, "{}", b),
            VariantValue::Int(i) => write!(f, "{}", i),
            VariantValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Optional per-state payload (fluid level, orientation, ...), keyed by
/// property name. Ordered so equal variants encode identically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateVariant(BTreeMap<String, VariantValue>);

impl StateVariant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<VariantValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&VariantValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariantValue)> {
        self.0.iter()
    }
}

/// Wire record for the tree form. `variant` is absent when there is none.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorRecord {
    state: StateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variant: Option<StateVariant>,
}

/// Opaque value identifying what occupies one voxel: a host state plus an
/// optional variant.
///
/// Equality and hashing are structural. The variant is shared so cloning a
/// descriptor never copies the property map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDescriptor {
    state: StateId,
    variant: Option<Arc<StateVariant>>,
}

impl ContentDescriptor {
    /// The empty (air) descriptor. Every palette starts with it at index 0.
    pub const fn empty() -> Self {
        Self {
            state: StateId::AIR,
            variant: None,
        }
    }

    pub const fn new(state: StateId) -> Self {
        Self {
            state,
            variant: None,
        }
    }

    /// An empty variant is stored as no variant, so both forms compare equal.
    pub fn with_variant(state: StateId, variant: StateVariant) -> Self {
        Self {
            state,
            variant: (!variant.is_empty()).then(|| Arc::new(variant)),
        }
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn variant(&self) -> Option<&StateVariant> {
        self.variant.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.state == StateId::AIR && self.variant.is_none()
    }

    /// Structured tree form: `{"state": n, "variant": {...}}`.
    pub fn to_tree(&self) -> Value {
        let mut map = Map::new();
        map.insert("state".to_string(), Value::from(self.state.0));
        if let Some(variant) = &self.variant {
            let props = variant
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<Map<String, Value>>();
            map.insert("variant".to_string(), Value::Object(props));
        }
        Value::Object(map)
    }

    pub fn from_tree(value: &Value) -> Result<Self> {
        let record = DescriptorRecord::deserialize(value)
            .map_err(|e| Error::corrupt(format!("content descriptor: {}", e)))?;
        Ok(Self::with_variant(record.state, record.variant.unwrap_or_default()))
    }

    /// Compact form: varint state, varint property count, then per property
    /// the key string, a type tag and the value.
    pub fn write_compact(&self, writer: &mut impl Write) -> io::Result<()> {
        write_var_u32(writer, self.state.0)?;
        match &self.variant {
            None => write_var_u64(writer, 0),
            Some(variant) => {
                write_var_u64(writer, variant.len() as u64)?;
                for (key, value) in variant.iter() {
                    write_string(writer, key)?;
                    value.write_compact(writer)?;
                }
                Ok(())
            }
        }
    }

    pub fn read_compact(reader: &mut impl Read) -> io::Result<Self> {
        let state = StateId(read_var_u32(reader)?);
        let count = read_len(reader, codec::MAX_STRING_LEN)?;
        let mut variant = StateVariant::new();
        for _ in 0..count {
            let key = read_string(reader)?;
            let value = VariantValue::read_compact(reader)?;
            variant.insert(key, value);
        }
        Ok(Self::with_variant(state, variant))
    }

    pub fn to_compact(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_compact(&mut buf);
        buf
    }

    pub fn from_compact(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let descriptor = Self::read_compact(&mut cursor)
            .map_err(|e| Error::corrupt(format!("content descriptor: {}", e)))?;
        if cursor.position() as usize != bytes.len() {
            return Err(Error::corrupt("trailing bytes after content descriptor"));
        }
        Ok(descriptor)
    }
}

impl From<StateId> for ContentDescriptor {
    fn from(state: StateId) -> Self {
        Self::new(state)
    }
}

impl fmt::Display for ContentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if let Some(variant) = &self.variant {
            write!(f, "{{")?;
            for (i, (key, value)) in variant.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}={}", key, value)?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}
