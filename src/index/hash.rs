//! Growable hash index
//!
//! Open-addressing key -> record mapping over generations `p_init..=p_last`
//! where generation `p` has capacity `growth_factor ^ p` and a probe limit
//! of `round(p * probe_factor * growth_factor)` buckets. Probing wraps
//! modulo the generation capacity.
//!
//! Scan rules inside one generation:
//! - lookup: occupied + matching key is a hit; occupied + other key and
//!   tombstones keep scanning; empty stops the generation with a miss.
//! - insert: the first empty or tombstone slot (or the key's own slot) is
//!   claimed; exhausting the probe budget is a miss for the generation.
//!
//! Exhausting every generation during insert is not an error: a new, larger
//! generation is created and the insert retried there (growth escalation).
//!
//! Two accelerators sit in front of the table scans: one bloom counter
//! segment per generation for negative lookups, and an LRU cache mapping a
//! key to its last known (generation, position). Cache entries are trusted
//! and are removed on delete.

use crate::cache::LruCache;
use crate::config::HashIndexConfig;
use crate::error::{Result, StrataError};
use crate::index::{hash_key, BloomSegments, ProbeStrategy, MAX_GENERATIONS};
use crate::schema::{FieldType, Record, Schema, Value};
use crate::store::FileStore;
use crate::table::{SlotStatus, Table};

fn ids_schema() -> Schema {
    Schema::builder()
        .field("id", FieldType::U64)
        .build()
        .expect("static schema")
}

/// Open-addressing hash index with multi-generation growth
pub struct GrowableHashIndex {
    dataset: Table,
    key_field: usize,
    ids: Table,
    tables_slot: usize,
    bloom_slot: usize,
    config: HashIndexConfig,
    strategy: ProbeStrategy,
    /// Block id of the generation-id table (0 = not yet initialized)
    tables_addr: u64,
    bloom_addr: u64,
    tables_id: Vec<u64>,
    bloom_id: Vec<u64>,
    p_last: u32,
    bloom: Option<BloomSegments>,
    cache: Option<LruCache<String, (u32, u64)>>,
}

impl GrowableHashIndex {
    pub(crate) fn new(
        schema: Schema,
        key_field_name: &str,
        tables_slot: usize,
        bloom_slot: usize,
        config: HashIndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        let key_field = schema.field_index(key_field_name).ok_or_else(|| {
            StrataError::Schema(format!(
                "key field '{}' not present in dataset schema",
                key_field_name
            ))
        })?;
        let strategy = if config.n_bloom_filters > 0 {
            ProbeStrategy::BloomFilteredProbe
        } else {
            ProbeStrategy::PlainProbe
        };
        let bloom = (config.n_bloom_filters > 0)
            .then(|| BloomSegments::new(config.n_bloom_filters, config.bloom_seed));
        let cache = (config.cache_capacity > 0).then(|| LruCache::new(config.cache_capacity));
        Ok(Self {
            dataset: Table::new(schema),
            key_field,
            ids: Table::new(ids_schema()),
            tables_slot,
            bloom_slot,
            p_last: config.p_init,
            config,
            strategy,
            tables_addr: 0,
            bloom_addr: 0,
            tables_id: Vec::new(),
            bloom_id: Vec::new(),
            bloom,
            cache,
        })
    }

    /// Initialize on first use or reload persisted generation state
    pub(crate) fn load(&mut self, store: &mut FileStore) -> Result<()> {
        self.tables_addr = store.header_get(self.tables_slot)?;
        if self.tables_addr == 0 {
            let addr = self.ids.new_block(store, MAX_GENERATIONS as u64)?;
            store.header_set(self.tables_slot, addr)?;
            self.tables_addr = addr;

            let capacity = self.capacity(self.config.p_init);
            let first = self.dataset.new_block(store, capacity)?;
            self.ids.set_value(store, addr, 0, 0, &Value::U64(first))?;
            self.p_last = self.config.p_init;

            if let Some(bloom) = &self.bloom {
                let bloom_addr = self.ids.new_block(store, MAX_GENERATIONS as u64)?;
                store.header_set(self.bloom_slot, bloom_addr)?;
                self.bloom_addr = bloom_addr;
                let segment = bloom.new_segment(store, capacity)?;
                self.ids
                    .set_value(store, bloom_addr, 0, 0, &Value::U64(segment))?;
            }
            self.refresh_generation_ids(store)?;
            return Ok(());
        }

        self.bloom_addr = store.header_get(self.bloom_slot)?;
        self.refresh_generation_ids(store)?;
        let last = self
            .tables_id
            .iter()
            .rposition(|&id| id != 0)
            .ok_or_else(|| {
                StrataError::Corruption("hash index has no allocated generations".into())
            })?;
        self.p_last = self.config.p_init + last as u32;
        Ok(())
    }

    fn refresh_generation_ids(&mut self, store: &mut FileStore) -> Result<()> {
        let values =
            self.ids
                .get_values(store, self.tables_addr, 0, MAX_GENERATIONS as u64, 0)?;
        self.tables_id = values.iter().map(|v| v.as_u64().unwrap_or(0)).collect();
        if self.bloom_addr != 0 {
            let values =
                self.ids
                    .get_values(store, self.bloom_addr, 0, MAX_GENERATIONS as u64, 0)?;
            self.bloom_id = values.iter().map(|v| v.as_u64().unwrap_or(0)).collect();
        }
        Ok(())
    }

    pub fn strategy(&self) -> ProbeStrategy {
        self.strategy
    }

    /// Newest generation exponent
    pub fn p_last(&self) -> u32 {
        self.p_last
    }

    /// Oldest generation exponent
    pub fn p_init(&self) -> u32 {
        self.config.p_init
    }

    pub fn generation_count(&self) -> u32 {
        self.p_last - self.config.p_init + 1
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

    /// Insert or update a record by its key field.
    ///
    /// Returns true when a new slot was claimed, false when an existing
    /// entry for the key was overwritten in place.
    pub fn insert(&mut self, store: &mut FileStore, record: &Record) -> Result<bool> {
        let key = record.value(self.key_field).clone();
        let canonical = key.canonical();
        let key_hash = hash_key(&canonical, self.config.key_seed) as u64;

        let (p, position, claimed) =
            match self.lookup_position(store, &key, &canonical, key_hash)? {
                Some((p, position)) => (p, position, false),
                None => {
                    let (p, position) = self.insert_position(store, &key, key_hash)?;
                    (p, position, true)
                }
            };

        self.dataset
            .set(store, self.generation_block(p), position, record)?;

        if let Some(bloom) = &self.bloom {
            let segment = self.bloom_id[(p - self.config.p_init) as usize];
            bloom.record(store, segment, self.capacity(p), &canonical)?;
        }
        if let Some(cache) = &mut self.cache {
            cache.insert(canonical, (p, position));
        }
        Ok(claimed)
    }

    /// Read the record stored for `key`
    pub fn lookup(&mut self, store: &mut FileStore, key: &Value) -> Result<Record> {
        let canonical = key.canonical();
        let key_hash = hash_key(&canonical, self.config.key_seed) as u64;
        let (p, position) = self
            .lookup_position(store, key, &canonical, key_hash)?
            .ok_or(StrataError::KeyNotFound)?;
        self.dataset
            .get(store, self.generation_block(p), position)
    }

    pub fn contains(&mut self, store: &mut FileStore, key: &Value) -> Result<bool> {
        let canonical = key.canonical();
        let key_hash = hash_key(&canonical, self.config.key_seed) as u64;
        Ok(self
            .lookup_position(store, key, &canonical, key_hash)?
            .is_some())
    }

    /// Tombstone the slot holding `key` and drop it from the cache
    pub fn delete(&mut self, store: &mut FileStore, key: &Value) -> Result<()> {
        let canonical = key.canonical();
        let key_hash = hash_key(&canonical, self.config.key_seed) as u64;
        let (p, position) = self
            .lookup_position(store, key, &canonical, key_hash)?
            .ok_or(StrataError::KeyNotFound)?;
        self.dataset
            .delete(store, self.generation_block(p), position)?;
        if let Some(cache) = &mut self.cache {
            cache.remove(&canonical);
        }
        Ok(())
    }

    /// Collect every live record, newest generation first
    pub fn scan(&mut self, store: &mut FileStore) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        for p in (self.config.p_init..=self.p_last).rev() {
            let block = self.generation_block(p);
            for offset in 0..self.capacity(p) {
                if self.dataset.exists(store, block, offset)? {
                    out.push(self.dataset.get(store, block, offset)?);
                }
            }
        }
        Ok(out)
    }

    /// Resolve a key to its (generation, position), or None when absent.
    /// Cached positions are trusted without re-probing.
    fn lookup_position(
        &mut self,
        store: &mut FileStore,
        key: &Value,
        canonical: &str,
        key_hash: u64,
    ) -> Result<Option<(u32, u64)>> {
        if let Some(cache) = &mut self.cache {
            if let Some(&(p, position)) = cache.get(&canonical.to_string()) {
                return Ok(Some((p, position)));
            }
        }

        for p in (self.config.p_init..=self.p_last).rev() {
            if let Some(bloom) = &self.bloom {
                let segment = self.bloom_id[(p - self.config.p_init) as usize];
                if !bloom.might_contain(store, segment, self.capacity(p), canonical)? {
                    continue;
                }
            }
            if let Some(position) = self.probe_lookup(store, p, key, key_hash)? {
                return Ok(Some((p, position)));
            }
        }
        Ok(None)
    }

    /// Linear probe of one generation under the lookup scan rule
    fn probe_lookup(
        &mut self,
        store: &mut FileStore,
        p: u32,
        key: &Value,
        key_hash: u64,
    ) -> Result<Option<u64>> {
        let capacity = self.capacity(p);
        let bucket = key_hash % capacity;
        let block = self.generation_block(p);
        for i in 0..self.probe_limit(p) {
            let position = (bucket + i) % capacity;
            match self.dataset.status(store, block, position)? {
                SlotStatus::Occupied => {
                    if &self.dataset.get_value(store, block, position, self.key_field)? == key {
                        return Ok(Some(position));
                    }
                }
                SlotStatus::Tombstone => continue,
                SlotStatus::Empty => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Find a claimable slot for a new key, growing when every generation's
    /// probe budget is exhausted
    fn insert_position(
        &mut self,
        store: &mut FileStore,
        key: &Value,
        key_hash: u64,
    ) -> Result<(u32, u64)> {
        for p in (self.config.p_init..=self.p_last).rev() {
            if let Some(position) = self.probe_claim(store, p, key, key_hash)? {
                return Ok((p, position));
            }
        }

        self.grow(store)?;
        let p = self.p_last;
        let position = self.probe_claim(store, p, key, key_hash)?.ok_or_else(|| {
            StrataError::Corruption("fresh generation rejected an insert probe".into())
        })?;
        Ok((p, position))
    }

    /// Linear probe of one generation under the insert scan rule: any
    /// empty or tombstone slot (or the key's own slot) is claimable
    fn probe_claim(
        &mut self,
        store: &mut FileStore,
        p: u32,
        key: &Value,
        key_hash: u64,
    ) -> Result<Option<u64>> {
        let capacity = self.capacity(p);
        let bucket = key_hash % capacity;
        let block = self.generation_block(p);
        for i in 0..self.probe_limit(p) {
            let position = (bucket + i) % capacity;
            match self.dataset.status(store, block, position)? {
                SlotStatus::Occupied => {
                    if &self.dataset.get_value(store, block, position, self.key_field)? == key {
                        return Ok(Some(position));
                    }
                }
                _ => return Ok(Some(position)),
            }
        }
        Ok(None)
    }

    /// Growth escalation: allocate the next generation and, when enabled,
    /// its bloom segment
    fn grow(&mut self, store: &mut FileStore) -> Result<()> {
        let next = self.p_last + 1;
        let index = (next - self.config.p_init) as usize;
        if index >= MAX_GENERATIONS {
            return Err(StrataError::Config(format!(
                "hash index exhausted its {} generation slots",
                MAX_GENERATIONS
            )));
        }

        let capacity = self.capacity(next);
        let block = self.dataset.new_block(store, capacity)?;
        self.ids.set_value(
            store,
            self.tables_addr,
            index as u64,
            0,
            &Value::U64(block),
        )?;
        self.tables_id[index] = block;

        if let Some(bloom) = &self.bloom {
            let segment = bloom.new_segment(store, capacity)?;
            self.ids.set_value(
                store,
                self.bloom_addr,
                index as u64,
                0,
                &Value::U64(segment),
            )?;
            self.bloom_id[index] = segment;
        }

        self.p_last = next;
        tracing::debug!(p = next, capacity, "hash index generation created");
        Ok(())
    }
}
