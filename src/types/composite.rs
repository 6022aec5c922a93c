//! Structured (record) and array values
//!
//! The Oracle-compatible dialect surfaces object and collection columns;
//! these travel as a self-describing nested encoding: a tag byte per element,
//! length-encoded strings, and recursion for nested composites. Decoding is
//! bounded by an explicit [`DecodePolicy`] (a statically-typed size and
//! recursion limit object) so a hostile or corrupt payload fails fast
//! instead of exhausting memory.

use indexmap::IndexMap;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{Error, Result};
use crate::row::Value;
use crate::types::{DateTimeValue, Decimal, IntervalDayTime, IntervalYearMonth};

/// Limits applied while decoding nested composite values
#[derive(Debug, Clone, Copy)]
pub struct DecodePolicy {
    /// Maximum total elements across the whole composite
    pub max_elements: usize,
    /// Maximum nesting depth
    pub max_depth: usize,
}

impl Default for DecodePolicy {
    fn default() -> Self {
        Self {
            max_elements: 4096,
            max_depth: 16,
        }
    }
}

/// Element tag bytes of the nested encoding
mod tag {
    pub const NULL: u8 = 0;
    pub const INT: u8 = 1;
    pub const UINT: u8 = 2;
    pub const DOUBLE: u8 = 3;
    pub const TEXT: u8 = 4;
    pub const BYTES: u8 = 5;
    pub const DECIMAL: u8 = 6;
    pub const DATETIME: u8 = 7;
    pub const INTERVAL_YM: u8 = 8;
    pub const INTERVAL_DS: u8 = 9;
    pub const STRUCT: u8 = 10;
    pub const ARRAY: u8 = 11;
}

/// A structured (record) value: a named type with ordered named fields
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    /// Declared type name
    pub type_name: String,
    /// Ordered field name → value mapping
    pub fields: IndexMap<String, Value>,
}

impl StructValue {
    /// Create an empty record of the given type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Set a field value (appends or replaces, preserving first-set order)
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Get a field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Encode the nested binary form
    pub fn encode(&self, buf: &mut WriteBuffer) -> Result<()> {
        buf.write_lenenc_string(&self.type_name)?;
        buf.write_lenenc_int(self.fields.len() as u64)?;
        for (name, value) in &self.fields {
            buf.write_lenenc_string(name)?;
            encode_element(buf, value)?;
        }
        Ok(())
    }

    /// Decode the nested binary form under the given policy
    pub fn decode(buf: &mut ReadBuffer, policy: &DecodePolicy) -> Result<Self> {
        let mut budget = policy.max_elements;
        decode_struct(buf, policy, 0, &mut budget)
    }
}

impl std::fmt::Display for StructValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.type_name)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} => {}", name, value)?;
        }
        write!(f, ")")
    }
}

/// An array (collection) value with homogeneously typed elements
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    /// Declared element type name (informational)
    pub element_type: String,
    /// The elements
    pub elements: Vec<Value>,
}

impl ArrayValue {
    /// Create an empty array of the given element type
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            elements: Vec::new(),
        }
    }

    /// Append an element
    pub fn push(&mut self, value: Value) {
        self.elements.push(value);
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the array is empty
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Encode the nested binary form
    pub fn encode(&self, buf: &mut WriteBuffer) -> Result<()> {
        buf.write_lenenc_string(&self.element_type)?;
        buf.write_lenenc_int(self.elements.len() as u64)?;
        for value in &self.elements {
            encode_element(buf, value)?;
        }
        Ok(())
    }

    /// Decode the nested binary form under the given policy
    pub fn decode(buf: &mut ReadBuffer, policy: &DecodePolicy) -> Result<Self> {
        let mut budget = policy.max_elements;
        decode_array(buf, policy, 0, &mut budget)
    }
}

impl std::fmt::Display for ArrayValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[", self.element_type)?;
        for (i, value) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}

fn encode_element(buf: &mut WriteBuffer, value: &Value) -> Result<()> {
    match value {
        Value::Null => buf.write_u8(tag::NULL),
        Value::Int(v) => {
            buf.write_u8(tag::INT)?;
            buf.write_u64_le(*v as u64)
        }
        Value::UInt(v) => {
            buf.write_u8(tag::UINT)?;
            buf.write_u64_le(*v)
        }
        Value::Float(v) => {
            buf.write_u8(tag::DOUBLE)?;
            buf.write_f64_le(*v as f64)
        }
        Value::Double(v) => {
            buf.write_u8(tag::DOUBLE)?;
            buf.write_f64_le(*v)
        }
        Value::Decimal(d) => {
            buf.write_u8(tag::DECIMAL)?;
            buf.write_lenenc_string(&d.to_string())
        }
        Value::Text(s) => {
            buf.write_u8(tag::TEXT)?;
            buf.write_lenenc_string(s)
        }
        Value::Bytes(b) => {
            buf.write_u8(tag::BYTES)?;
            buf.write_lenenc_bytes(b)
        }
        Value::DateTime(dt) => {
            buf.write_u8(tag::DATETIME)?;
            dt.encode(buf)
        }
        Value::IntervalYearMonth(iv) => {
            buf.write_u8(tag::INTERVAL_YM)?;
            iv.encode(buf)
        }
        Value::IntervalDayTime(iv) => {
            buf.write_u8(tag::INTERVAL_DS)?;
            iv.encode(buf)
        }
        Value::Struct(s) => {
            buf.write_u8(tag::STRUCT)?;
            s.encode(buf)
        }
        Value::Array(a) => {
            buf.write_u8(tag::ARRAY)?;
            a.encode(buf)
        }
        Value::Lob(_) => Err(Error::NotSupported(
            "large-object handles cannot nest inside composite values".to_string(),
        )),
    }
}

fn decode_element(
    buf: &mut ReadBuffer,
    policy: &DecodePolicy,
    depth: usize,
    budget: &mut usize,
) -> Result<Value> {
    if *budget == 0 {
        return Err(Error::Protocol(format!(
            "composite value exceeds element limit {}",
            policy.max_elements
        )));
    }
    *budget -= 1;

    let t = buf.read_u8()?;
    Ok(match t {
        tag::NULL => Value::Null,
        tag::INT => Value::Int(buf.read_u64_le()? as i64),
        tag::UINT => Value::UInt(buf.read_u64_le()?),
        tag::DOUBLE => Value::Double(buf.read_f64_le()?),
        tag::TEXT => Value::Text(buf.read_lenenc_string()?),
        tag::BYTES => Value::Bytes(buf.read_lenenc_bytes()?),
        tag::DECIMAL => Value::Decimal(Decimal::parse(&buf.read_lenenc_string()?)?),
        tag::DATETIME => Value::DateTime(DateTimeValue::decode(buf)?),
        tag::INTERVAL_YM => Value::IntervalYearMonth(IntervalYearMonth::decode(buf)?),
        tag::INTERVAL_DS => Value::IntervalDayTime(IntervalDayTime::decode(buf)?),
        tag::STRUCT => Value::Struct(Box::new(decode_struct(buf, policy, depth + 1, budget)?)),
        tag::ARRAY => Value::Array(Box::new(decode_array(buf, policy, depth + 1, budget)?)),
        other => return Err(Error::InvalidTypeTag(other)),
    })
}

fn check_depth(policy: &DecodePolicy, depth: usize) -> Result<()> {
    if depth >= policy.max_depth {
        Err(Error::Protocol(format!(
            "composite value exceeds nesting limit {}",
            policy.max_depth
        )))
    } else {
        Ok(())
    }
}

fn decode_struct(
    buf: &mut ReadBuffer,
    policy: &DecodePolicy,
    depth: usize,
    budget: &mut usize,
) -> Result<StructValue> {
    check_depth(policy, depth)?;
    let type_name = buf.read_lenenc_string()?;
    let count = buf.read_lenenc_int()? as usize;
    let mut fields = IndexMap::with_capacity(count.min(*budget));
    for _ in 0..count {
        let name = buf.read_lenenc_string()?;
        let value = decode_element(buf, policy, depth, budget)?;
        fields.insert(name, value);
    }
    Ok(StructValue { type_name, fields })
}

fn decode_array(
    buf: &mut ReadBuffer,
    policy: &DecodePolicy,
    depth: usize,
    budget: &mut usize,
) -> Result<ArrayValue> {
    check_depth(policy, depth)?;
    let element_type = buf.read_lenenc_string()?;
    let count = buf.read_lenenc_int()? as usize;
    let mut elements = Vec::with_capacity(count.min(*budget));
    for _ in 0..count {
        elements.push(decode_element(buf, policy, depth, budget)?);
    }
    Ok(ArrayValue {
        element_type,
        elements,
    })
}
