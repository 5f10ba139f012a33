//! Compact hash index
//!
//! A self-contained variant for large or variable-length values: the hash
//! table itself stores `{hash, key, address}` triples and the value lives
//! in a backing growable array reached through `address`. Updating an
//! existing key overwrites the backing record in place, so the triple
//! never moves.
//!
//! Probing deliberately differs from [`GrowableHashIndex`]: the scan range
//! is `bucket .. min(bucket + limit, capacity)` with no wraparound, and
//! insert remembers the first vacant slot while continuing to scan all
//! generations for an exact match.

use crate::array::GrowableArray;
use crate::config::{ArrayConfig, HashIndexConfig};
use crate::error::{Result, StrataError};
use crate::index::{hash_key, MAX_GENERATIONS};
use crate::schema::{FieldType, Record, Schema, Value};
use crate::store::FileStore;
use crate::table::{SlotStatus, Table};

fn ids_schema() -> Schema {
    Schema::builder()
        .field("id", FieldType::U64)
        .build()
        .expect("static schema")
}

/// Schema of one `{hash, key, address}` triple
pub(crate) fn triple_schema(key_len: usize) -> Result<Schema> {
    Schema::builder()
        .field("hash", FieldType::U64)
        .field("key", FieldType::Str(key_len))
        .field("address", FieldType::U64)
        .build()
}

enum ScanOutcome {
    /// Exact key+hash match; carries the value's address in the backing array
    Match { address: u64 },
    /// No match; first vacant slot seen while scanning
    Vacant { p: u32, position: u64 },
    /// No match and no vacant slot in any generation's probe range
    Exhausted,
}

/// Hash index storing key/address triples, values redirected to an array
pub struct CompactHashIndex {
    triples: Table,
    ids: Table,
    tables_slot: usize,
    config: HashIndexConfig,
    tables_addr: u64,
    tables_id: Vec<u64>,
    p_last: u32,
    values: GrowableArray,
}

impl CompactHashIndex {
    pub(crate) fn new(
        key_len: usize,
        value_schema: Schema,
        tables_slot: usize,
        values_addr_slot: usize,
        values_len_slot: usize,
        config: HashIndexConfig,
        values_config: ArrayConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            triples: Table::new(triple_schema(key_len)?),
            ids: Table::new(ids_schema()),
            tables_slot,
            p_last: config.p_init,
            config,
            tables_addr: 0,
            tables_id: Vec::new(),
            values: GrowableArray::new(
                value_schema,
                values_addr_slot,
                values_len_slot,
                values_config,
            )?,
        })
    }

    pub(crate) fn load(&mut self, store: &mut FileStore) -> Result<()> {
        self.values.load(store)?;

        self.tables_addr = store.header_get(self.tables_slot)?;
        if self.tables_addr == 0 {
            let addr = self.ids.new_block(store, MAX_GENERATIONS as u64)?;
            store.header_set(self.tables_slot, addr)?;
            self.tables_addr = addr;

            let capacity = self.capacity(self.config.p_init);
            let first = self.triples.new_block(store, capacity)?;
            self.ids.set_value(store, addr, 0, 0, &Value::U64(first))?;
            self.p_last = self.config.p_init;
            self.refresh_generation_ids(store)?;
            return Ok(());
        }

        self.refresh_generation_ids(store)?;
        let last = self
            .tables_id
            .iter()
            .rposition(|&id| id != 0)
            .ok_or_else(|| {
                StrataError::Corruption("compact index has no allocated generations".into())
            })?;
        self.p_last = self.config.p_init + last as u32;
        Ok(())
    }

    fn refresh_generation_ids(&mut self, store: &mut FileStore) -> Result<()> {
        let values =
            self.ids
                .get_values(store, self.tables_addr, 0, MAX_GENERATIONS as u64, 0)?;
        self.tables_id = values.iter().map(|v| v.as_u64().unwrap_or(0)).collect();
        Ok(())
    }

    pub fn p_last(&self) -> u32 {
        self.p_last
    }

    pub fn p_init(&self) -> u32 {
        self.config.p_init
    }

    /// Number of live values in the backing array
    pub fn value_count(&self) -> u64 {
        self.values.len()
    }

    fn capacity(&self, p: u32) -> u64 {
        self.config.growth_factor.pow(p)
    }

    fn probe_limit(&self, p: u32) -> u64 {
        (p as f64 * self.config.probe_factor * self.config.growth_factor as f64).round() as u64
    }

    fn generation_block(&self, p: u32) -> u64 {
        self.tables_id[(p - self.config.p_init) as usize]
    }

    /// Insert or update a value for `key`
    pub fn insert(&mut self, store: &mut FileStore, key: &str, record: &Record) -> Result<()> {
        let key_hash = hash_key(key, self.config.key_seed) as u64;
        match self.scan(store, key, key_hash)? {
            ScanOutcome::Match { address, .. } => {
                // Triple stays put; only the backing record changes
                self.values.set(store, address, record)
            }
            ScanOutcome::Vacant { p, position } => {
                self.write_triple(store, p, position, key, key_hash, record)
            }
            ScanOutcome::Exhausted => {
                self.grow(store)?;
                let p = self.p_last;
                let position = key_hash % self.capacity(p);
                self.write_triple(store, p, position, key, key_hash, record)
            }
        }
    }

    /// Read the value stored for `key`
    pub fn lookup(&mut self, store: &mut FileStore, key: &str) -> Result<Record> {
        let key_hash = hash_key(key, self.config.key_seed) as u64;
        match self.scan(store, key, key_hash)? {
            ScanOutcome::Match { address, .. } => self.values.get(store, address),
            _ => Err(StrataError::KeyNotFound),
        }
    }

    pub fn contains(&mut self, store: &mut FileStore, key: &str) -> Result<bool> {
        let key_hash = hash_key(key, self.config.key_seed) as u64;
        Ok(matches!(
            self.scan(store, key, key_hash)?,
            ScanOutcome::Match { .. }
        ))
    }

    fn write_triple(
        &mut self,
        store: &mut FileStore,
        p: u32,
        position: u64,
        key: &str,
        key_hash: u64,
        record: &Record,
    ) -> Result<()> {
        let address = self.values.append(store, record)?;
        let triple = Record::new(vec![
            Value::U64(key_hash),
            Value::Str(key.to_string()),
            Value::U64(address),
        ]);
        self.triples
            .set(store, self.generation_block(p), position, &triple)
    }

    /// One pass for both insert and lookup: scan newest to oldest for an
    /// exact hash+key match, remembering the first vacant slot seen
    fn scan(&mut self, store: &mut FileStore, key: &str, key_hash: u64) -> Result<ScanOutcome> {
        let mut vacant: Option<(u32, u64)> = None;
        for p in (self.config.p_init..=self.p_last).rev() {
            let capacity = self.capacity(p);
            let bucket = key_hash % capacity;
            let stop = (bucket + self.probe_limit(p)).min(capacity);
            let block = self.generation_block(p);
            for position in bucket..stop {
                match self.triples.status(store, block, position)? {
                    SlotStatus::Occupied => {
                        let triple = self.triples.get(store, block, position)?;
                        if triple.value(0).as_u64() != Some(key_hash) {
                            continue;
                        }
                        if triple.value(1) != &Value::Str(key.to_string()) {
                            continue;
                        }
                        let address = triple.value(2).as_u64().ok_or_else(|| {
                            StrataError::Corruption("triple address is not a u64".into())
                        })?;
                        return Ok(ScanOutcome::Match { address });
                    }
                    _ => {
                        if vacant.is_none() {
                            vacant = Some((p, position));
                        }
                    }
                }
            }
        }
        Ok(match vacant {
            Some((p, position)) => ScanOutcome::Vacant { p, position },
            None => ScanOutcome::Exhausted,
        })
    }

    fn grow(&mut self, store: &mut FileStore) -> Result<()> {
        let next = self.p_last + 1;
        let index = (next - self.config.p_init) as usize;
        if index >= MAX_GENERATIONS {
            return Err(StrataError::Config(format!(
                "compact index exhausted its {} generation slots",
                MAX_GENERATIONS
            )));
        }
        let capacity = self.capacity(next);
        let block = self.triples.new_block(store, capacity)?;
        self.ids.set_value(
            store,
            self.tables_addr,
            index as u64,
            0,
            &Value::U64(block),
        )?;
        self.tables_id[index] = block;
        self.p_last = next;
        tracing::debug!(p = next, capacity, "compact index generation created");
        Ok(())
    }
}
