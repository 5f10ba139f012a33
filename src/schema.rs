//! Record schemas and runtime values
//!
//! A `Schema` is an explicit, ordered descriptor of fixed-width fields.
//! Every record stored through a [`Table`](crate::table::Table) is encoded
//! against one schema: little-endian fixed-width numbers, zero-padded UTF-8
//! for fixed strings, and a u64 blob address for `FieldType::Blob`.
//!
//! Schemas are validated at construction; a record that does not match its
//! schema (wrong arity, wrong value type, string wider than its field) is a
//! `Schema` error, never a silent truncation.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Primitive type of one schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    U8,
    U16,
    U32,
    U64,
    I64,
    F64,
    Bool,
    /// Fixed-width UTF-8 string, zero-padded on disk
    Str(usize),
    /// Address of a separately stored blob (u64 file offset)
    Blob,
}

impl FieldType {
    /// On-disk width of this field in bytes
    pub fn width(&self) -> usize {
        match self {
            FieldType::U8 | FieldType::Bool => 1,
            FieldType::U16 => 2,
            FieldType::U32 => 4,
            FieldType::U64 | FieldType::I64 | FieldType::F64 | FieldType::Blob => 8,
            FieldType::Str(n) => *n,
        }
    }
}

/// One named field in a schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
}

/// Ordered, fixed-layout record descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldDef>,
    offsets: Vec<usize>,
    record_size: usize,
}

impl Schema {
    /// Create a schema builder
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    fn new(fields: Vec<FieldDef>) -> Result<Self> {
        if fields.is_empty() {
            return Err(StrataError::Schema("schema has no fields".into()));
        }
        let mut offsets = Vec::with_capacity(fields.len());
        let mut record_size = 0usize;
        for (i, field) in fields.iter().enumerate() {
            if let FieldType::Str(0) = field.ty {
                return Err(StrataError::Schema(format!(
                    "field '{}' has zero-width string type",
                    field.name
                )));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(StrataError::Schema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
            offsets.push(record_size);
            record_size += field.ty.width();
        }
        Ok(Self {
            fields,
            offsets,
            record_size,
        })
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Total record payload size in bytes (excluding the status byte)
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Field definition by position
    pub fn field(&self, index: usize) -> &FieldDef {
        &self.fields[index]
    }

    /// Resolve a field name to its position
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Byte offset of a field inside the record payload
    pub(crate) fn field_offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    /// Encode a whole record into `buf`, validating it against the schema
    pub(crate) fn encode_record(&self, record: &Record, buf: &mut BytesMut) -> Result<()> {
        if record.values().len() != self.fields.len() {
            return Err(StrataError::Schema(format!(
                "record has {} values, schema has {} fields",
                record.values().len(),
                self.fields.len()
            )));
        }
        for (i, value) in record.values().iter().enumerate() {
            self.encode_value(i, value, buf)?;
        }
        Ok(())
    }

    /// Encode one field value into `buf`
    pub(crate) fn encode_value(&self, index: usize, value: &Value, buf: &mut BytesMut) -> Result<()> {
        let field = &self.fields[index];
        match (&field.ty, value) {
            (FieldType::U8, Value::U8(v)) => buf.put_u8(*v),
            (FieldType::U16, Value::U16(v)) => buf.put_u16_le(*v),
            (FieldType::U32, Value::U32(v)) => buf.put_u32_le(*v),
            (FieldType::U64, Value::U64(v)) => buf.put_u64_le(*v),
            (FieldType::I64, Value::I64(v)) => buf.put_i64_le(*v),
            (FieldType::F64, Value::F64(v)) => buf.put_f64_le(*v),
            (FieldType::Bool, Value::Bool(v)) => buf.put_u8(*v as u8),
            (FieldType::Blob, Value::Blob(v)) => buf.put_u64_le(*v),
            (FieldType::Str(n), Value::Str(s)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *n {
                    return Err(StrataError::Schema(format!(
                        "string of {} bytes does not fit field '{}' of width {}",
                        bytes.len(),
                        field.name,
                        n
                    )));
                }
                buf.put_slice(bytes);
                buf.put_bytes(0, n - bytes.len());
            }
            (ty, value) => {
                return Err(StrataError::Schema(format!(
                    "value {:?} does not match field '{}' of type {:?}",
                    value, field.name, ty
                )));
            }
        }
        Ok(())
    }

    /// Decode a whole record payload
    pub(crate) fn decode_record(&self, bytes: &[u8]) -> Result<Record> {
        if bytes.len() < self.record_size {
            return Err(StrataError::Corruption(format!(
                "record payload of {} bytes, schema needs {}",
                bytes.len(),
                self.record_size
            )));
        }
        let mut values = Vec::with_capacity(self.fields.len());
        for i in 0..self.fields.len() {
            let offset = self.offsets[i];
            let width = self.fields[i].ty.width();
            values.push(self.decode_value(i, &bytes[offset..offset + width])?);
        }
        Ok(Record::new(values))
    }

    /// Decode one field from its raw bytes
    pub(crate) fn decode_value(&self, index: usize, mut bytes: &[u8]) -> Result<Value> {
        let field = &self.fields[index];
        let value = match field.ty {
            FieldType::U8 => Value::U8(bytes.get_u8()),
            FieldType::U16 => Value::U16(bytes.get_u16_le()),
            FieldType::U32 => Value::U32(bytes.get_u32_le()),
            FieldType::U64 => Value::U64(bytes.get_u64_le()),
            FieldType::I64 => Value::I64(bytes.get_i64_le()),
            FieldType::F64 => Value::F64(bytes.get_f64_le()),
            FieldType::Bool => Value::Bool(bytes.get_u8() != 0),
            FieldType::Blob => Value::Blob(bytes.get_u64_le()),
            FieldType::Str(n) => {
                let raw = &bytes[..n];
                let end = raw
                    .iter()
                    .rposition(|&b| b != 0)
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let s = std::str::from_utf8(&raw[..end]).map_err(|_| {
                    StrataError::Corruption(format!(
                        "field '{}' holds invalid UTF-8",
                        field.name
                    ))
                })?;
                Value::Str(s.to_string())
            }
        };
        Ok(value)
    }
}

/// Builder for [`Schema`]
#[derive(Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDef>,
}

impl SchemaBuilder {
    /// Append a field
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn build(self) -> Result<Schema> {
        Schema::new(self.fields)
    }
}

/// Runtime value of one record field
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(String),
    Blob(u64),
}

impl Value {
    /// Canonical string form of a value, used for key hashing
    pub fn canonical(&self) -> String {
        match self {
            Value::U8(v) => v.to_string(),
            Value::U16(v) => v.to_string(),
            Value::U32(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Str(s) => s.clone(),
            Value::Blob(v) => v.to_string(),
        }
    }

    /// Extract an unsigned 64-bit payload, if this value carries one
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(*v as u64),
            Value::U16(v) => Some(*v as u64),
            Value::U32(v) => Some(*v as u64),
            Value::U64(v) | Value::Blob(v) => Some(*v),
            _ => None,
        }
    }
}

/// One record: an ordered list of values matching a schema
#[derive(Debug, Clone, PartialEq)]
pub struct Record(Vec<Value>);

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn value(&self, index: usize) -> &Value {
        &self.0[index]
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}
