//! Persistent string-keyed map
//!
//! `StrataMap` is the batteries-included surface of the engine: a
//! `HashMap`-like store for any serde-serializable value type, backed by a
//! [`Database`] with one dataset, one hash index over it and the blob
//! allocator for the encoded values.
//!
//! Keys are stored either as their 64-bit hash (compact, but a hash
//! collision conflates two keys) or as literal fixed-width strings, chosen
//! at creation time via [`MapConfig::hashed_keys`]. A small LRU cache keeps
//! recently decoded values in memory; it is invalidated on remove.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

use crate::cache::LruCache;
use crate::config::MapConfig;
use crate::db::Database;
use crate::error::Result;
use crate::schema::{FieldType, Record, Schema, Value};

const DATA_DATASET: &str = "data";
const KEY_INDEX: &str = "keys";
const COUNT_FIELD: &str = "count";
const HASHED_FIELD: &str = "hashed";

/// Persistent map from string keys to serde-encoded values
pub struct StrataMap<V> {
    db: Database,
    hashed_keys: bool,
    cache: Option<LruCache<String, V>>,
}

impl<V> StrataMap<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Create a fresh map file, truncating any existing one
    pub fn create(path: &Path, config: MapConfig) -> Result<Self> {
        config.validate()?;

        let key_type = if config.hashed_keys {
            FieldType::U64
        } else {
            FieldType::Str(config.max_key_len)
        };
        let schema = Schema::builder()
            .field("key", key_type)
            .field("value", FieldType::Blob)
            .build()?;

        let mut db = Database::create(path, config.database.clone())?;
        db.create_dataset(DATA_DATASET, schema)?;
        db.create_hash_index(KEY_INDEX, DATA_DATASET, "key", config.index.clone())?;
        db.create_header_field(COUNT_FIELD)?;
        db.create_header_field(HASHED_FIELD)?;
        db.commit()?;
        db.header_set(HASHED_FIELD, config.hashed_keys as u64)?;

        let cache = (config.value_cache > 0).then(|| LruCache::new(config.value_cache));
        Ok(Self {
            db,
            hashed_keys: config.hashed_keys,
            cache,
        })
    }

    /// Open an existing map file
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_cache(path, MapConfig::default().value_cache)
    }

    /// Open an existing map file with an explicit value cache capacity
    /// (zero disables the cache)
    pub fn open_with_cache(path: &Path, value_cache: usize) -> Result<Self> {
        let mut db = Database::open(path)?;
        let hashed_keys = db.header_get(HASHED_FIELD)? != 0;
        let cache = (value_cache > 0).then(|| LruCache::new(value_cache));
        Ok(Self {
            db,
            hashed_keys,
            cache,
        })
    }

    fn key_value(&self, key: &str) -> Value {
        if self.hashed_keys {
            Value::U64(xxh3_64(key.as_bytes()))
        } else {
            Value::Str(key.to_string())
        }
    }

    /// Insert or overwrite the value stored under `key`
    pub fn set(&mut self, key: &str, value: &V) -> Result<()> {
        let encoded = self.db.codec().encode(value)?;
        let address = self.db.append_blob(&encoded)?;
        let record = Record::new(vec![self.key_value(key), Value::Blob(address)]);

        let claimed = self.db.hash_index(KEY_INDEX)?.insert(&record)?;
        if claimed {
            let count = self.db.header_get(COUNT_FIELD)?;
            self.db.header_set(COUNT_FIELD, count + 1)?;
        }
        if let Some(cache) = &mut self.cache {
            cache.insert(key.to_string(), value.clone());
        }
        Ok(())
    }

    /// Read the value stored under `key`
    pub fn get(&mut self, key: &str) -> Result<V> {
        if let Some(cache) = &mut self.cache {
            if let Some(value) = cache.get(&key.to_string()) {
                return Ok(value.clone());
            }
        }

        let key_value = self.key_value(key);
        let record = self.db.hash_index(KEY_INDEX)?.lookup(&key_value)?;
        let address = match record.value(1) {
            Value::Blob(address) => *address,
            _ => {
                return Err(crate::error::StrataError::Corruption(
                    "map record holds no blob address".into(),
                ))
            }
        };
        let encoded = self.db.get_blob(address)?;
        let value: V = self.db.codec().decode(&encoded)?;
        if let Some(cache) = &mut self.cache {
            cache.insert(key.to_string(), value.clone());
        }
        Ok(value)
    }

    pub fn contains(&mut self, key: &str) -> Result<bool> {
        if let Some(cache) = &mut self.cache {
            if cache.peek(&key.to_string()).is_some() {
                return Ok(true);
            }
        }
        let key_value = self.key_value(key);
        self.db.hash_index(KEY_INDEX)?.contains(&key_value)
    }

    /// Remove `key`; errors with `KeyNotFound` when absent.
    /// The blob holding the old value is not reclaimed.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        let key_value = self.key_value(key);
        self.db.hash_index(KEY_INDEX)?.delete(&key_value)?;
        let count = self.db.header_get(COUNT_FIELD)?;
        self.db.header_set(COUNT_FIELD, count.saturating_sub(1))?;
        if let Some(cache) = &mut self.cache {
            cache.remove(&key.to_string());
        }
        Ok(())
    }

    /// Number of live entries
    pub fn len(&mut self) -> Result<u64> {
        self.db.header_get(COUNT_FIELD)
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Decode every live value, newest insertions first
    pub fn values(&mut self) -> Result<Vec<V>> {
        let records = self.db.hash_index(KEY_INDEX)?.scan()?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            if let Value::Blob(address) = record.value(1) {
                let encoded = self.db.get_blob(*address)?;
                out.push(self.db.codec().decode(&encoded)?);
            }
        }
        Ok(out)
    }

    /// Defer durability syncing for a bulk load
    pub fn begin_transaction(&mut self) {
        self.db.begin_transaction();
    }

    /// Sync buffered writes and restore per-write durability
    pub fn end_transaction(&mut self) -> Result<()> {
        self.db.end_transaction()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.db.sync()
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    /// The database underneath, for direct structure access
    pub fn database(&mut self) -> &mut Database {
        &mut self.db
    }
}
