//! Fixed-layout record table
//!
//! A `Table` encodes records of one schema into fixed-size slots inside
//! blocks allocated from the file store. Each slot is one status byte
//! followed by the record payload:
//!
//! ```text
//! ┌────────────┬───────────────────────────────┐
//! │ Status (1) │ Record payload (record_size)  │
//! └────────────┴───────────────────────────────┘
//!   0 = empty, 1 = occupied, 2 = tombstone
//! ```
//!
//! Freshly extended file space reads as zero, so a new block is all-empty
//! without any initialization pass. A block is identified by the file
//! offset of its first slot.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, StrataError};
use crate::schema::{Record, Schema, Value};
use crate::store::FileStore;

/// Per-slot state inside a backing block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Empty,
    Occupied,
    Tombstone,
}

impl SlotStatus {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(SlotStatus::Empty),
            1 => Ok(SlotStatus::Occupied),
            2 => Ok(SlotStatus::Tombstone),
            other => Err(StrataError::Corruption(format!(
                "invalid slot status byte {}",
                other
            ))),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            SlotStatus::Empty => 0,
            SlotStatus::Occupied => 1,
            SlotStatus::Tombstone => 2,
        }
    }
}

/// Fixed-record codec over file-store blocks
#[derive(Debug, Clone)]
pub struct Table {
    schema: Schema,
    slot_size: usize,
}

impl Table {
    pub fn new(schema: Schema) -> Self {
        let slot_size = 1 + schema.record_size();
        Self { schema, slot_size }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// On-disk size of one slot (status byte + payload)
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Allocate a block of `capacity` empty slots; returns the block id
    /// (file offset of the block start)
    pub fn new_block(&self, store: &mut FileStore, capacity: u64) -> Result<u64> {
        store.allocate(capacity * self.slot_size as u64)
    }

    fn slot_offset(&self, block: u64, offset: u64) -> u64 {
        block + offset * self.slot_size as u64
    }

    /// Write a full record, marking the slot occupied
    pub fn set(&self, store: &mut FileStore, block: u64, offset: u64, record: &Record) -> Result<()> {
        let mut buf = BytesMut::with_capacity(self.slot_size);
        buf.put_u8(SlotStatus::Occupied.as_byte());
        self.schema.encode_record(record, &mut buf)?;
        store.write_at(self.slot_offset(block, offset), &buf)
    }

    /// Read a full record; the slot must be occupied
    pub fn get(&self, store: &mut FileStore, block: u64, offset: u64) -> Result<Record> {
        let bytes = store.read_at(self.slot_offset(block, offset), self.slot_size)?;
        match SlotStatus::from_byte(bytes[0])? {
            SlotStatus::Occupied => self.schema.decode_record(&bytes[1..]),
            _ => Err(StrataError::KeyNotFound),
        }
    }

    /// Read the status byte of a slot
    pub fn status(&self, store: &mut FileStore, block: u64, offset: u64) -> Result<SlotStatus> {
        let bytes = store.read_at(self.slot_offset(block, offset), 1)?;
        SlotStatus::from_byte(bytes[0])
    }

    pub fn exists(&self, store: &mut FileStore, block: u64, offset: u64) -> Result<bool> {
        Ok(self.status(store, block, offset)? == SlotStatus::Occupied)
    }

    /// Mark a slot as a tombstone; the payload is left in place
    pub fn delete(&self, store: &mut FileStore, block: u64, offset: u64) -> Result<()> {
        store.write_at(
            self.slot_offset(block, offset),
            &[SlotStatus::Tombstone.as_byte()],
        )
    }

    /// Write one field of a slot, marking the slot occupied. Other fields
    /// keep whatever bytes they held (zero on a fresh block).
    pub fn set_value(
        &self,
        store: &mut FileStore,
        block: u64,
        offset: u64,
        field: usize,
        value: &Value,
    ) -> Result<()> {
        let mut buf = BytesMut::with_capacity(self.schema.field(field).ty.width());
        self.schema.encode_value(field, value, &mut buf)?;
        let slot = self.slot_offset(block, offset);
        store.write_at(slot, &[SlotStatus::Occupied.as_byte()])?;
        store.write_at(slot + 1 + self.schema.field_offset(field) as u64, &buf)
    }

    /// Read one field of a slot, regardless of slot status. Empty slots
    /// decode as zero values.
    pub fn get_value(
        &self,
        store: &mut FileStore,
        block: u64,
        offset: u64,
        field: usize,
    ) -> Result<Value> {
        let width = self.schema.field(field).ty.width();
        let at = self.slot_offset(block, offset) + 1 + self.schema.field_offset(field) as u64;
        let bytes = store.read_at(at, width)?;
        self.schema.decode_value(field, &bytes)
    }

    /// Read one field from `count` consecutive slots with a single I/O
    pub fn get_values(
        &self,
        store: &mut FileStore,
        block: u64,
        start: u64,
        count: u64,
        field: usize,
    ) -> Result<Vec<Value>> {
        let bytes = self.get_slice_as_bytes(store, block, start, start + count)?;
        let field_offset = 1 + self.schema.field_offset(field);
        let width = self.schema.field(field).ty.width();
        let mut values = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let at = i * self.slot_size + field_offset;
            values.push(self.schema.decode_value(field, &bytes[at..at + width])?);
        }
        Ok(values)
    }

    /// Raw bytes of the slot range `[start, stop)`
    pub fn get_slice_as_bytes(
        &self,
        store: &mut FileStore,
        block: u64,
        start: u64,
        stop: u64,
    ) -> Result<Vec<u8>> {
        if stop < start {
            return Err(StrataError::IndexOutOfRange {
                position: stop,
                len: start,
            });
        }
        store.read_at(
            self.slot_offset(block, start),
            ((stop - start) as usize) * self.slot_size,
        )
    }
}
