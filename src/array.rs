//! Growable array
//!
//! Presents an unbounded, append-only indexed sequence with O(1) amortized
//! append and O(1) random access. Storage is partitioned into successive
//! generations of geometrically increasing capacity, each backed by one
//! record-table block; a logical index resolves to a (generation, offset)
//! pair by binary search over precomputed cumulative capacity thresholds.
//!
//! Persisted bookkeeping is two header slots: the block id of the
//! generation-id table and the element count. The generation-id table is
//! itself one record block of [`MAX_GENERATIONS`] u64 slots.

use crate::config::ArrayConfig;
use crate::error::{Result, StrataError};
use crate::schema::{FieldType, Record, Schema, Value};
use crate::store::FileStore;
use crate::table::Table;

/// Capacity of the generation-id table
pub const MAX_GENERATIONS: usize = 64;

fn ids_schema() -> Schema {
    Schema::builder()
        .field("id", FieldType::U64)
        .build()
        .expect("static schema")
}

/// Unbounded indexed sequence over geometric generations
pub struct GrowableArray {
    table: Table,
    ids: Table,
    addr_slot: usize,
    len_slot: usize,
    config: ArrayConfig,
    /// Cumulative capacity after each generation; strictly increasing
    thresholds: Vec<u64>,
    /// Block id of the generation-id table (0 = not yet initialized)
    tables_addr: u64,
    /// Cached generation block ids, zero where unallocated
    tables_id: Vec<u64>,
    /// Element count, write-through to the header
    len: u64,
}

impl GrowableArray {
    pub(crate) fn new(
        schema: Schema,
        addr_slot: usize,
        len_slot: usize,
        config: ArrayConfig,
    ) -> Result<Self> {
        config.validate()?;
        let thresholds = Self::build_thresholds(&config)?;
        Ok(Self {
            table: Table::new(schema),
            ids: Table::new(ids_schema()),
            addr_slot,
            len_slot,
            config,
            thresholds,
            tables_addr: 0,
            tables_id: Vec::new(),
            len: 0,
        })
    }

    /// Precompute cumulative thresholds: thresholds[0] = start_size - 1,
    /// thresholds[g] = floor(thresholds[g-1] * growth_factor) - 1.
    /// Stops early once growth saturates or stops being strictly monotonic.
    fn build_thresholds(config: &ArrayConfig) -> Result<Vec<u64>> {
        let mut thresholds = Vec::with_capacity(MAX_GENERATIONS);
        thresholds.push(config.start_size - 1);
        for g in 1..MAX_GENERATIONS {
            let prev = thresholds[g - 1];
            let next = (prev as f64 * config.growth_factor).floor();
            if !next.is_finite() || next >= u64::MAX as f64 {
                break;
            }
            let next = next as u64 - 1;
            if next <= prev {
                // growth_factor > 1 is validated, so a non-increase only
                // happens for degenerate tiny start sizes
                return Err(StrataError::Config(format!(
                    "growth parameters (start_size {}, growth_factor {}) do not grow",
                    config.start_size, config.growth_factor
                )));
            }
            thresholds.push(next);
        }
        Ok(thresholds)
    }

    /// Initialize on first use or reload persisted state
    pub(crate) fn load(&mut self, store: &mut FileStore) -> Result<()> {
        self.tables_addr = store.header_get(self.addr_slot)?;
        if self.tables_addr == 0 {
            let addr = self.ids.new_block(store, MAX_GENERATIONS as u64)?;
            store.header_set(self.addr_slot, addr)?;
            store.header_set(self.len_slot, 0)?;
            self.tables_addr = addr;

            let first = self.table.new_block(store, self.config.start_size)?;
            self.ids
                .set_value(store, addr, 0, 0, &Value::U64(first))?;
        }
        self.len = store.header_get(self.len_slot)?;
        self.refresh_tables_id(store)
    }

    fn refresh_tables_id(&mut self, store: &mut FileStore) -> Result<()> {
        let values =
            self.ids
                .get_values(store, self.tables_addr, 0, MAX_GENERATIONS as u64, 0)?;
        self.tables_id = values
            .iter()
            .map(|v| v.as_u64().unwrap_or(0))
            .collect();
        Ok(())
    }

    /// Number of elements appended so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn schema(&self) -> &Schema {
        self.table.schema()
    }

    /// Resolve a logical index to (generation, in-generation offset)
    fn locate(&self, position: u64) -> Result<(usize, u64)> {
        let generation = self.thresholds.partition_point(|&t| t < position);
        if generation == self.thresholds.len() {
            return Err(StrataError::Config(format!(
                "array position {} beyond final generation threshold",
                position
            )));
        }
        let offset = if generation == 0 {
            position
        } else {
            position - self.thresholds[generation - 1] - 1
        };
        Ok((generation, offset))
    }

    /// Append one element, growing into a new generation when the current
    /// one is exhausted. Returns the element's logical index.
    pub fn append(&mut self, store: &mut FileStore, record: &Record) -> Result<u64> {
        let index = self.len;
        let (generation, offset) = self.locate(index)?;

        // The last slot of a generation triggers allocation of the next one
        if self.thresholds[generation] == index {
            if generation + 1 >= self.thresholds.len() {
                return Err(StrataError::Config(
                    "array generation table exhausted".into(),
                ));
            }
            let new_capacity = self.thresholds[generation + 1] - self.thresholds[generation];
            let block = self.table.new_block(store, new_capacity)?;
            self.ids.set_value(
                store,
                self.tables_addr,
                (generation + 1) as u64,
                0,
                &Value::U64(block),
            )?;
            self.tables_id[generation + 1] = block;
            tracing::debug!(
                generation = generation + 1,
                capacity = new_capacity,
                "array generation allocated"
            );
        }

        self.table
            .set(store, self.tables_id[generation], offset, record)?;
        self.len = store.header_set(self.len_slot, index + 1)?;
        Ok(index)
    }

    /// Overwrite an existing element in place
    pub fn set(&mut self, store: &mut FileStore, position: u64, record: &Record) -> Result<()> {
        self.check_bounds(position)?;
        let (generation, offset) = self.locate(position)?;
        self.table
            .set(store, self.tables_id[generation], offset, record)
    }

    /// Read one element
    pub fn get(&mut self, store: &mut FileStore, position: u64) -> Result<Record> {
        self.check_bounds(position)?;
        let (generation, offset) = self.locate(position)?;
        self.table
            .get(store, self.tables_id[generation], offset)
    }

    /// Materialize `[start, stop)` at `step` as an ordered sequence
    pub fn get_range(
        &mut self,
        store: &mut FileStore,
        start: u64,
        stop: u64,
        step: u64,
    ) -> Result<Vec<Record>> {
        if step == 0 {
            return Err(StrataError::Config("range step must be non-zero".into()));
        }
        if stop > self.len {
            return Err(StrataError::IndexOutOfRange {
                position: stop,
                len: self.len,
            });
        }
        let mut out = Vec::new();
        let mut position = start;
        while position < stop {
            out.push(self.get(store, position)?);
            position += step;
        }
        Ok(out)
    }

    fn check_bounds(&self, position: u64) -> Result<()> {
        if position >= self.len {
            return Err(StrataError::IndexOutOfRange {
                position,
                len: self.len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_table_is_strictly_increasing() {
        let thresholds = GrowableArray::build_thresholds(&ArrayConfig::default()).unwrap();
        assert_eq!(thresholds[0], 511);
        assert!(thresholds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_threshold_table_saturates_before_overflow() {
        let config = ArrayConfig {
            start_size: 512,
            growth_factor: 2.0,
        };
        let thresholds = GrowableArray::build_thresholds(&config).unwrap();
        assert!(thresholds.len() <= MAX_GENERATIONS);
        assert!(thresholds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_degenerate_start_size_is_config_error() {
        let config = ArrayConfig {
            start_size: 2,
            growth_factor: 1.01,
        };
        assert!(GrowableArray::build_thresholds(&config).is_err());
    }
}
