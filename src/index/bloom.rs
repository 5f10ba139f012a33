//! Bloom counter segments
//!
//! Each hash-index generation owns one bloom segment: a block of u8
//! counters sized `generation capacity * n_bloom_filters`. Inserting a key
//! increments one counter chosen by a seeded hash; lookup skips a whole
//! generation when that counter is zero. Counters are never decremented,
//! so the filter can report false positives but never false negatives for
//! keys actually inserted into the generation.

use crate::error::Result;
use crate::index::hash_key;
use crate::schema::{FieldType, Schema, Value};
use crate::store::FileStore;
use crate::table::Table;

fn counter_schema() -> Schema {
    Schema::builder()
        .field("count", FieldType::U8)
        .build()
        .expect("static schema")
}

/// Per-generation approximate-membership counters
pub struct BloomSegments {
    counters: Table,
    fan_out: u64,
    seed: u32,
}

impl BloomSegments {
    pub(crate) fn new(fan_out: u64, seed: u32) -> Self {
        Self {
            counters: Table::new(counter_schema()),
            fan_out,
            seed,
        }
    }

    /// Allocate a zeroed segment for a generation of `capacity` buckets
    pub(crate) fn new_segment(&self, store: &mut FileStore, capacity: u64) -> Result<u64> {
        self.counters.new_block(store, capacity * self.fan_out)
    }

    fn bucket(&self, capacity: u64, key: &str) -> u64 {
        hash_key(key, self.seed) as u64 % (capacity * self.fan_out)
    }

    /// True unless the segment proves the key absent from this generation
    pub(crate) fn might_contain(
        &self,
        store: &mut FileStore,
        segment: u64,
        capacity: u64,
        key: &str,
    ) -> Result<bool> {
        let bucket = self.bucket(capacity, key);
        let value = self.counters.get_value(store, segment, bucket, 0)?;
        Ok(value.as_u64().unwrap_or(0) != 0)
    }

    /// Record one insertion of `key` into this generation
    pub(crate) fn record(
        &self,
        store: &mut FileStore,
        segment: u64,
        capacity: u64,
        key: &str,
    ) -> Result<()> {
        let bucket = self.bucket(capacity, key);
        let current = self
            .counters
            .get_value(store, segment, bucket, 0)?
            .as_u64()
            .unwrap_or(0) as u8;
        self.counters.set_value(
            store,
            segment,
            bucket,
            0,
            &Value::U8(current.saturating_add(1)),
        )
    }
}
