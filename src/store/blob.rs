//! Blob allocator
//!
//! Variable-length values are packed into fixed-size slots inside blob
//! blocks. Each blob is framed as:
//!
//! ```text
//! ┌────────────┬───────────────┬──────────────┐
//! │ Marker (1) │ Length u32 LE │ Payload      │
//! └────────────┴───────────────┴──────────────┘
//! ```
//!
//! Placement is first-fit over existing blocks; block `i` has a slot
//! budget of `n_slots_per_block + i`, so later blocks grow slightly,
//! mirroring the geometric growth of the structures above. When nothing
//! fits, a new block sized exactly to its budget is appended. Space from
//! overwritten blobs is never reclaimed.

use bytes::{BufMut, BytesMut};

use crate::array::GrowableArray;
use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::schema::{FieldType, Record, Schema, Value};
use crate::store::FileStore;

/// Kind marker identifying a blob frame
pub(crate) const BLOB_MARKER: u8 = 1;

/// Frame overhead: marker byte + u32 length
const FRAME_HEADER: u64 = 5;

/// Schema of one block-list entry
pub(crate) fn block_list_schema() -> Schema {
    Schema::builder()
        .field("position", FieldType::U64)
        .field("slots_taken", FieldType::U32)
        .build()
        .expect("static schema")
}

#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    position: u64,
    slots_taken: u64,
}

impl BlockEntry {
    fn to_record(self) -> Record {
        Record::new(vec![
            Value::U64(self.position),
            Value::U32(self.slots_taken as u32),
        ])
    }

    fn from_record(record: &Record) -> Result<Self> {
        match (record.value(0), record.value(1)) {
            (Value::U64(position), Value::U32(slots_taken)) => Ok(Self {
                position: *position,
                slots_taken: *slots_taken as u64,
            }),
            _ => Err(StrataError::Corruption(
                "malformed block list entry".into(),
            )),
        }
    }
}

/// Slot-quantized allocator for variable-length blobs
pub struct BlobStore {
    block_size: u64,
    slot_size: u64,
    n_slots_per_block: u64,
    /// Persisted append-only list of (position, slots_taken) entries
    list: GrowableArray,
    /// In-memory mirror of the block list
    blocks: Vec<BlockEntry>,
}

impl BlobStore {
    pub(crate) fn new(config: &Config, list: GrowableArray) -> Self {
        Self {
            block_size: config.block_size,
            slot_size: config.slot_size,
            n_slots_per_block: config.block_size / config.slot_size,
            list,
            blocks: Vec::new(),
        }
    }

    /// Mirror the persisted block list into memory
    pub(crate) fn load(&mut self, store: &mut FileStore) -> Result<()> {
        self.blocks.clear();
        for i in 0..self.list.len() {
            let record = self.list.get(store, i)?;
            self.blocks.push(BlockEntry::from_record(&record)?);
        }
        Ok(())
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Append a blob and return its permanent byte offset
    ///
    /// The framed blob must fit inside one block; exceeding `block_size`
    /// is a precondition violation, not a recoverable condition.
    pub fn append(&mut self, store: &mut FileStore, payload: &[u8]) -> Result<u64> {
        let framed_size = FRAME_HEADER + payload.len() as u64;
        if framed_size > self.block_size {
            return Err(StrataError::BlobTooLarge {
                size: framed_size,
                limit: self.block_size,
            });
        }
        let n_slots = framed_size.div_ceil(self.slot_size);

        let mut frame = BytesMut::with_capacity(framed_size as usize);
        frame.put_u8(BLOB_MARKER);
        frame.put_u32_le(payload.len() as u32);
        frame.put_slice(payload);

        // First fit: block i has a budget of n_slots_per_block + i slots
        let fit = self.blocks.iter().enumerate().find_map(|(i, entry)| {
            let budget = self.n_slots_per_block + i as u64;
            (budget.saturating_sub(entry.slots_taken) >= n_slots).then_some(i)
        });

        if let Some(i) = fit {
            let entry = self.blocks[i];
            let at = entry.position + self.slot_size * entry.slots_taken;
            store.write_at(at, &frame)?;
            self.blocks[i].slots_taken += n_slots;
            self.list
                .set(store, i as u64, &self.blocks[i].to_record())?;
            return Ok(at);
        }

        // No room anywhere: append a block sized to its budget
        let slots_in_block = self.n_slots_per_block + self.blocks.len() as u64;
        let size = if self.blocks.is_empty() {
            self.block_size
        } else {
            self.slot_size * slots_in_block
        };
        let position = store.allocate(size)?;
        store.write_at(position, &frame)?;

        let entry = BlockEntry {
            position,
            slots_taken: n_slots,
        };
        self.blocks.push(entry);
        self.list.append(store, &entry.to_record())?;
        tracing::debug!(
            position,
            slots = slots_in_block,
            total_blocks = self.blocks.len(),
            "blob block allocated"
        );
        Ok(position)
    }

    /// Read back the payload of a blob written at `offset`
    pub fn get(&self, store: &mut FileStore, offset: u64) -> Result<Vec<u8>> {
        let header = store.read_at(offset, FRAME_HEADER as usize)?;
        if header[0] != BLOB_MARKER {
            return Err(StrataError::Corruption(format!(
                "no blob frame at offset {}",
                offset
            )));
        }
        let mut le = [0u8; 4];
        le.copy_from_slice(&header[1..5]);
        let len = u32::from_le_bytes(le) as usize;
        store.read_at(offset + FRAME_HEADER, len)
    }
}
