//! Typed field conversion: maps named register spans to integers, floats
//! and ASCII strings under configurable word and byte ordering.
//!
//! Everything here is pure: callers fetch word spans from the store (or are
//! about to write them) and convert under no lock of their own.

use modsim_core::RegisterSpace;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Which 16-bit word of a multi-word value is most significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordOrder {
    Big,
    Little,
}

/// Which byte within each word is most significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Big,
    Little,
}

/// Field data types. ASCII strings occupy two bytes per register and are
/// zero padded to the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    Ascii { bytes: usize },
}

impl DataType {
    /// Registers the type occupies. Bit-space booleans count as one point.
    pub fn word_span(self) -> usize {
        match self {
            Self::Bool | Self::Int16 | Self::Uint16 => 1,
            Self::Int32 | Self::Uint32 | Self::Float32 => 2,
            Self::Int64 | Self::Uint64 | Self::Float64 => 4,
            Self::Ascii { bytes } => bytes.div_ceil(2).max(1),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "double64",
            Self::Ascii { .. } => "string",
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bit(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("field spans {expected} words but {got} were supplied")]
    WidthMismatch { expected: usize, got: usize },
    #[error("value does not fit in a {0}")]
    ValueOutOfRange(&'static str),
    #[error("expected a {expected} value")]
    TypeMismatch { expected: &'static str },
    #[error("string of {len} bytes exceeds field capacity of {capacity}")]
    StringTooLong { capacity: usize, len: usize },
    #[error("string fields accept ASCII only")]
    NotAscii,
    #[error("no field named '{0}'")]
    UnknownField(String),
    #[error("field '{0}' is already defined")]
    DuplicateField(String),
    #[error("fields '{0}' and '{1}' overlap")]
    OverlappingFields(String, String),
}

/// Binds a field name to a register span and its interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRule {
    pub name: String,
    pub space: RegisterSpace,
    pub start: u16,
    pub data_type: DataType,
    pub word_order: WordOrder,
    pub byte_order: ByteOrder,
    /// Editing-surface hint carried from configuration; the protocol side
    /// is governed by the address space alone.
    pub writable: bool,
}

impl ConversionRule {
    pub fn word_span(&self) -> usize {
        self.data_type.word_span()
    }

    /// One past the last address the rule touches.
    pub fn end(&self) -> u32 {
        u32::from(self.start) + self.word_span() as u32
    }
}

/// Normalizes a word span into a most-significant-first byte sequence.
fn span_to_bytes(rule: &ConversionRule, words: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    let ordered: Vec<u16> = match rule.word_order {
        WordOrder::Big => words.to_vec(),
        WordOrder::Little => words.iter().rev().copied().collect(),
    };
    for word in ordered {
        let [hi, lo] = word.to_be_bytes();
        match rule.byte_order {
            ByteOrder::Big => bytes.extend_from_slice(&[hi, lo]),
            ByteOrder::Little => bytes.extend_from_slice(&[lo, hi]),
        }
    }
    bytes
}

/// Inverse of [`span_to_bytes`].
fn bytes_to_span(rule: &ConversionRule, bytes: &[u8]) -> Vec<u16> {
    let mut words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| match rule.byte_order {
            ByteOrder::Big => u16::from_be_bytes([pair[0], pair[1]]),
            ByteOrder::Little => u16::from_be_bytes([pair[1], pair[0]]),
        })
        .collect();
    if rule.word_order == WordOrder::Little {
        words.reverse();
    }
    words
}

/// Decodes a word span as the rule's data type.
pub fn decode(rule: &ConversionRule, words: &[u16]) -> Result<Value, ConversionError> {
    let expected = rule.word_span();
    if words.len() != expected {
        return Err(ConversionError::WidthMismatch {
            expected,
            got: words.len(),
        });
    }

    if rule.data_type == DataType::Bool {
        return Ok(Value::Bit(words[0] != 0));
    }

    let bytes = span_to_bytes(rule, words);
    let value = match rule.data_type {
        DataType::Bool => unreachable!("handled above"),
        DataType::Int16 => Value::Int(i16::from_be_bytes([bytes[0], bytes[1]]).into()),
        DataType::Uint16 => Value::Uint(u16::from_be_bytes([bytes[0], bytes[1]]).into()),
        DataType::Int32 => {
            Value::Int(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).into())
        }
        DataType::Uint32 => {
            Value::Uint(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).into())
        }
        DataType::Int64 => Value::Int(i64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])),
        DataType::Uint64 => Value::Uint(u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])),
        DataType::Float32 => Value::Float(
            f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).into(),
        ),
        DataType::Float64 => Value::Float(f64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])),
        DataType::Ascii { bytes: capacity } => {
            let text: Vec<u8> = bytes
                .iter()
                .take(capacity)
                .copied()
                .take_while(|byte| *byte != 0)
                .collect();
            if !text.is_ascii() {
                return Err(ConversionError::NotAscii);
            }
            Value::Text(String::from_utf8(text).map_err(|_| ConversionError::NotAscii)?)
        }
    };
    Ok(value)
}

fn int_for(value: &Value, type_name: &'static str) -> Result<i64, ConversionError> {
    match value {
        Value::Int(v) => Ok(*v),
        Value::Uint(v) => i64::try_from(*v).map_err(|_| ConversionError::ValueOutOfRange(type_name)),
        _ => Err(ConversionError::TypeMismatch { expected: "integer" }),
    }
}

fn uint_for(value: &Value, type_name: &'static str) -> Result<u64, ConversionError> {
    match value {
        Value::Uint(v) => Ok(*v),
        Value::Int(v) => u64::try_from(*v).map_err(|_| ConversionError::ValueOutOfRange(type_name)),
        _ => Err(ConversionError::TypeMismatch { expected: "integer" }),
    }
}

fn float_for(value: &Value) -> Result<f64, ConversionError> {
    match value {
        Value::Float(v) => Ok(*v),
        Value::Int(v) => Ok(*v as f64),
        Value::Uint(v) => Ok(*v as f64),
        _ => Err(ConversionError::TypeMismatch { expected: "float" }),
    }
}

/// Encodes a typed value into the word span for the rule. Fails rather
/// than truncating anything that does not fit.
pub fn encode(rule: &ConversionRule, value: &Value) -> Result<Vec<u16>, ConversionError> {
    let type_name = rule.data_type.name();
    let bytes: Vec<u8> = match rule.data_type {
        DataType::Bool => {
            let Value::Bit(bit) = value else {
                return Err(ConversionError::TypeMismatch { expected: "bool" });
            };
            return Ok(vec![u16::from(*bit)]);
        }
        DataType::Int16 => {
            let v = int_for(value, type_name)?;
            i16::try_from(v)
                .map_err(|_| ConversionError::ValueOutOfRange(type_name))?
                .to_be_bytes()
                .to_vec()
        }
        DataType::Uint16 => {
            let v = uint_for(value, type_name)?;
            u16::try_from(v)
                .map_err(|_| ConversionError::ValueOutOfRange(type_name))?
                .to_be_bytes()
                .to_vec()
        }
        DataType::Int32 => {
            let v = int_for(value, type_name)?;
            i32::try_from(v)
                .map_err(|_| ConversionError::ValueOutOfRange(type_name))?
                .to_be_bytes()
                .to_vec()
        }
        DataType::Uint32 => {
            let v = uint_for(value, type_name)?;
            u32::try_from(v)
                .map_err(|_| ConversionError::ValueOutOfRange(type_name))?
                .to_be_bytes()
                .to_vec()
        }
        DataType::Int64 => int_for(value, type_name)?.to_be_bytes().to_vec(),
        DataType::Uint64 => uint_for(value, type_name)?.to_be_bytes().to_vec(),
        DataType::Float32 => {
            let v = float_for(value)?;
            let narrowed = v as f32;
            if v.is_finite() && !narrowed.is_finite() {
                return Err(ConversionError::ValueOutOfRange(type_name));
            }
            narrowed.to_be_bytes().to_vec()
        }
        DataType::Float64 => float_for(value)?.to_be_bytes().to_vec(),
        DataType::Ascii { bytes: capacity } => {
            let Value::Text(text) = value else {
                return Err(ConversionError::TypeMismatch { expected: "string" });
            };
            if !text.is_ascii() {
                return Err(ConversionError::NotAscii);
            }
            if text.len() > capacity {
                return Err(ConversionError::StringTooLong {
                    capacity,
                    len: text.len(),
                });
            }
            let mut padded = text.as_bytes().to_vec();
            padded.resize(rule.word_span() * 2, 0);
            padded
        }
    };

    let mut padded = bytes;
    padded.resize(rule.word_span() * 2, 0);
    Ok(bytes_to_span(rule, &padded))
}

/// Rule lookup with two explicit indices: by field name and by address
/// range within each space.
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: Vec<ConversionRule>,
    by_name: HashMap<String, usize>,
    by_start: BTreeMap<(RegisterSpace, u16), usize>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rule: ConversionRule) -> Result<(), ConversionError> {
        if self.by_name.contains_key(&rule.name) {
            return Err(ConversionError::DuplicateField(rule.name));
        }
        if let Some(existing) = self.rule_overlapping(&rule) {
            return Err(ConversionError::OverlappingFields(
                existing.name.clone(),
                rule.name,
            ));
        }

        let index = self.rules.len();
        self.by_name.insert(rule.name.clone(), index);
        self.by_start.insert((rule.space, rule.start), index);
        self.rules.push(rule);
        Ok(())
    }

    fn rule_overlapping(&self, rule: &ConversionRule) -> Option<&ConversionRule> {
        // A clash can only come from the nearest rule at or below the new
        // start, or the nearest one above it.
        let below = self
            .by_start
            .range(..=(rule.space, rule.start))
            .next_back()
            .map(|(_, index)| &self.rules[*index])
            .filter(|other| other.space == rule.space && other.end() > u32::from(rule.start));
        if below.is_some() {
            return below;
        }
        self.by_start
            .range((rule.space, rule.start)..)
            .next()
            .map(|(_, index)| &self.rules[*index])
            .filter(|other| other.space == rule.space && u32::from(other.start) < rule.end())
    }

    pub fn get(&self, name: &str) -> Option<&ConversionRule> {
        self.by_name.get(name).map(|index| &self.rules[*index])
    }

    /// The rule whose span covers `address`, if any.
    pub fn rule_at(&self, space: RegisterSpace, address: u16) -> Option<&ConversionRule> {
        self.by_start
            .range(..=(space, address))
            .next_back()
            .map(|(_, index)| &self.rules[*index])
            .filter(|rule| rule.space == space && u32::from(address) < rule.end())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversionRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
