//! Database
//!
//! Ties the single file, the blob allocator and the catalog of named
//! structures together.
//!
//! ## Lifecycle
//! 1. `Database::create` opens a fresh file; datasets, header fields and
//!    structures are then declared against the in-memory catalog.
//! 2. `commit()` freezes the catalog: the metadata blob (bincode, CRC32
//!    checksummed) and the zeroed header record are written, the write
//!    cursor is initialized, and every declared structure allocates its
//!    first generation.
//! 3. `Database::open` reads the metadata blob back, validates the
//!    checksum, and reloads every structure from its header bookkeeping.
//!
//! Only the catalog and each structure's configuration are persisted in
//! the metadata blob; open file handles and in-memory caches are
//! reconstructed on load and never serialized.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::array::GrowableArray;
use crate::codec::BlobCodec;
use crate::config::{ArrayConfig, Config, HashIndexConfig};
use crate::error::{Result, StrataError};
use crate::index::{CompactHashIndex, GrowableHashIndex, ProbeStrategy};
use crate::schema::{Record, Schema, Value};
use crate::store::{block_list_schema, BlobStore, FileStore};

/// On-disk format version, bumped on incompatible layout changes
const FORMAT_VERSION: u32 = 1;

/// Reserved name of the blob block list structure
const BLOCK_LIST_NAME: &str = "_blocks";

/// Header field name of the write cursor
const CURSOR_FIELD: &str = "_index";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatasetDef {
    name: String,
    schema: Schema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum StructureDef {
    Array {
        name: String,
        dataset: String,
        config: ArrayConfig,
    },
    HashIndex {
        name: String,
        dataset: String,
        key_field: String,
        config: HashIndexConfig,
    },
    CompactIndex {
        name: String,
        key_len: usize,
        value_schema: Schema,
        config: HashIndexConfig,
        values_config: ArrayConfig,
    },
}

impl StructureDef {
    fn name(&self) -> &str {
        match self {
            StructureDef::Array { name, .. } => name,
            StructureDef::HashIndex { name, .. } => name,
            StructureDef::CompactIndex { name, .. } => name,
        }
    }

    /// Header bookkeeping fields owned by this structure, in slot order
    fn header_fields(&self) -> Vec<String> {
        let name = self.name();
        match self {
            StructureDef::Array { .. } => {
                vec![format!("{name}.tables"), format!("{name}.len")]
            }
            StructureDef::HashIndex { .. } => {
                vec![format!("{name}.tables"), format!("{name}.bloom")]
            }
            StructureDef::CompactIndex { .. } => vec![
                format!("{name}.tables"),
                format!("{name}.values.tables"),
                format!("{name}.values.len"),
            ],
        }
    }
}

/// Everything persisted in the metadata blob
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Metadata {
    version: u32,
    config: Config,
    header_fields: Vec<String>,
    datasets: Vec<DatasetDef>,
    structures: Vec<StructureDef>,
}

/// An embedded single-file database
pub struct Database {
    path: PathBuf,
    config: Config,
    codec: BlobCodec,
    store: FileStore,
    datasets: Vec<DatasetDef>,
    structures: Vec<StructureDef>,
    header_fields: Vec<String>,
    user_header_fields: Vec<String>,
    arrays: HashMap<String, GrowableArray>,
    indexes: HashMap<String, GrowableHashIndex>,
    compacts: HashMap<String, CompactHashIndex>,
    blobs: Option<BlobStore>,
    committed: bool,
}

impl Database {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a fresh database file (truncating any existing one).
    /// Declare datasets and structures, then call [`commit`](Self::commit).
    pub fn create(path: &Path, config: Config) -> Result<Self> {
        config.validate()?;
        let store = FileStore::create(path)?;
        let codec = BlobCodec::new(config.compression);
        Ok(Self {
            path: path.to_path_buf(),
            config,
            codec,
            store,
            datasets: Vec::new(),
            structures: Vec::new(),
            header_fields: Vec::new(),
            user_header_fields: Vec::new(),
            arrays: HashMap::new(),
            indexes: HashMap::new(),
            compacts: HashMap::new(),
            blobs: None,
            committed: false,
        })
    }

    /// Open an existing database file
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = FileStore::open(path)?;

        let len_bytes = store.read_at(0, 4)?;
        let mut le = [0u8; 4];
        le.copy_from_slice(&len_bytes);
        let blob_len = u32::from_le_bytes(le) as usize;
        if blob_len < 4 {
            return Err(StrataError::Corruption(
                "metadata blob too short to hold its checksum".into(),
            ));
        }
        let blob = store.read_at(4, blob_len)?;
        le.copy_from_slice(&blob[..4]);
        let expected = u32::from_le_bytes(le);
        if crc32fast::hash(&blob[4..]) != expected {
            return Err(StrataError::Corruption(
                "metadata checksum mismatch".into(),
            ));
        }

        let metadata: Metadata = bincode::deserialize(&blob[4..])?;
        if metadata.version != FORMAT_VERSION {
            return Err(StrataError::Corruption(format!(
                "unsupported format version {}",
                metadata.version
            )));
        }
        metadata.config.validate()?;

        let header_offset = 4 + blob_len as u64;
        store.attach_header(header_offset, metadata.header_fields.len())?;

        let codec = BlobCodec::new(metadata.config.compression);
        let mut db = Self {
            path: path.to_path_buf(),
            config: metadata.config,
            codec,
            store,
            datasets: metadata.datasets,
            structures: metadata.structures,
            header_fields: metadata.header_fields,
            user_header_fields: Vec::new(),
            arrays: HashMap::new(),
            indexes: HashMap::new(),
            compacts: HashMap::new(),
            blobs: None,
            committed: true,
        };
        db.load_runtime()?;
        tracing::info!(path = %db.path.display(), "database opened");
        Ok(db)
    }

    /// Freeze the catalog and write the metadata blob, header and initial
    /// generations. The database becomes operational after this call.
    pub fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Err(StrataError::Catalog("database already committed".into()));
        }

        // The blob block list is itself a growable array over a reserved
        // dataset, registered last so user structures keep their slots
        self.datasets.push(DatasetDef {
            name: BLOCK_LIST_NAME.to_string(),
            schema: block_list_schema(),
        });
        self.structures.push(StructureDef::Array {
            name: BLOCK_LIST_NAME.to_string(),
            dataset: BLOCK_LIST_NAME.to_string(),
            config: ArrayConfig::default(),
        });

        let mut header_fields = vec![CURSOR_FIELD.to_string()];
        header_fields.extend(self.user_header_fields.iter().cloned());
        for def in &self.structures {
            header_fields.extend(def.header_fields());
        }
        self.header_fields = header_fields;

        let metadata = Metadata {
            version: FORMAT_VERSION,
            config: self.config.clone(),
            header_fields: self.header_fields.clone(),
            datasets: self.datasets.clone(),
            structures: self.structures.clone(),
        };
        let encoded = bincode::serialize(&metadata)?;
        let mut blob = crc32fast::hash(&encoded).to_le_bytes().to_vec();
        blob.extend_from_slice(&encoded);

        let header_offset = 4 + blob.len() as u64;
        let header_size = 8 * self.header_fields.len() as u64;
        let table_start = header_offset + header_size;

        self.store.extend(table_start)?;
        self.store
            .write_at(0, &(blob.len() as u32).to_le_bytes())?;
        self.store.write_at(4, &blob)?;
        self.store
            .attach_header(header_offset, self.header_fields.len())?;
        self.store.set_cursor(table_start)?;

        self.committed = true;
        self.load_runtime()?;
        tracing::info!(
            path = %self.path.display(),
            structures = self.structures.len(),
            table_start,
            "database committed"
        );
        Ok(())
    }

    /// Build runtime structures from the frozen catalog and initialize or
    /// reload their persisted bookkeeping
    fn load_runtime(&mut self) -> Result<()> {
        self.arrays.clear();
        self.indexes.clear();
        self.compacts.clear();

        let structures = self.structures.clone();
        for def in &structures {
            match def {
                StructureDef::Array {
                    name,
                    dataset,
                    config,
                } => {
                    let schema = self.dataset_schema(dataset)?.clone();
                    let addr_slot = self.slot(&format!("{name}.tables"))?;
                    let len_slot = self.slot(&format!("{name}.len"))?;
                    let mut array =
                        GrowableArray::new(schema, addr_slot, len_slot, config.clone())?;
                    array.load(&mut self.store)?;
                    self.arrays.insert(name.clone(), array);
                }
                StructureDef::HashIndex {
                    name,
                    dataset,
                    key_field,
                    config,
                } => {
                    let schema = self.dataset_schema(dataset)?.clone();
                    let tables_slot = self.slot(&format!("{name}.tables"))?;
                    let bloom_slot = self.slot(&format!("{name}.bloom"))?;
                    let mut index = GrowableHashIndex::new(
                        schema,
                        key_field,
                        tables_slot,
                        bloom_slot,
                        config.clone(),
                    )?;
                    index.load(&mut self.store)?;
                    self.indexes.insert(name.clone(), index);
                }
                StructureDef::CompactIndex {
                    name,
                    key_len,
                    value_schema,
                    config,
                    values_config,
                } => {
                    let tables_slot = self.slot(&format!("{name}.tables"))?;
                    let values_addr_slot = self.slot(&format!("{name}.values.tables"))?;
                    let values_len_slot = self.slot(&format!("{name}.values.len"))?;
                    let mut index = CompactHashIndex::new(
                        *key_len,
                        value_schema.clone(),
                        tables_slot,
                        values_addr_slot,
                        values_len_slot,
                        config.clone(),
                        values_config.clone(),
                    )?;
                    index.load(&mut self.store)?;
                    self.compacts.insert(name.clone(), index);
                }
            }
        }

        let block_list = self.arrays.remove(BLOCK_LIST_NAME).ok_or_else(|| {
            StrataError::Corruption("catalog is missing the blob block list".into())
        })?;
        let mut blobs = BlobStore::new(&self.config, block_list);
        blobs.load(&mut self.store)?;
        self.blobs = Some(blobs);
        Ok(())
    }

    // =========================================================================
    // Catalog Registration (pre-commit)
    // =========================================================================

    /// Register a dataset schema under a unique name
    pub fn create_dataset(&mut self, name: &str, schema: Schema) -> Result<()> {
        self.check_mutable()?;
        self.check_name(name)?;
        if self.datasets.iter().any(|d| d.name == name) {
            return Err(StrataError::AlreadyExists(name.to_string()));
        }
        self.datasets.push(DatasetDef {
            name: name.to_string(),
            schema,
        });
        Ok(())
    }

    /// Register an extra u64 header field
    pub fn create_header_field(&mut self, name: &str) -> Result<()> {
        self.check_mutable()?;
        self.check_name(name)?;
        if self.user_header_fields.iter().any(|f| f == name) {
            return Err(StrataError::AlreadyExists(name.to_string()));
        }
        self.user_header_fields.push(name.to_string());
        Ok(())
    }

    /// Register a growable array over a registered dataset
    pub fn create_array(&mut self, name: &str, dataset: &str, config: ArrayConfig) -> Result<()> {
        self.check_mutable()?;
        self.check_name(name)?;
        config.validate()?;
        self.dataset_schema(dataset)?;
        self.check_structure_name(name)?;
        self.structures.push(StructureDef::Array {
            name: name.to_string(),
            dataset: dataset.to_string(),
            config,
        });
        Ok(())
    }

    /// Register a growable hash index keyed on `key_field` of a dataset
    pub fn create_hash_index(
        &mut self,
        name: &str,
        dataset: &str,
        key_field: &str,
        config: HashIndexConfig,
    ) -> Result<()> {
        self.check_mutable()?;
        self.check_name(name)?;
        config.validate()?;
        let schema = self.dataset_schema(dataset)?;
        if schema.field_index(key_field).is_none() {
            return Err(StrataError::Schema(format!(
                "dataset '{}' has no field '{}'",
                dataset, key_field
            )));
        }
        self.check_structure_name(name)?;
        self.structures.push(StructureDef::HashIndex {
            name: name.to_string(),
            dataset: dataset.to_string(),
            key_field: key_field.to_string(),
            config,
        });
        Ok(())
    }

    /// Register a compact hash index with its own value store
    pub fn create_compact_index(
        &mut self,
        name: &str,
        key_len: usize,
        value_schema: Schema,
        config: HashIndexConfig,
    ) -> Result<()> {
        self.check_mutable()?;
        self.check_name(name)?;
        config.validate()?;
        self.check_structure_name(name)?;
        self.structures.push(StructureDef::CompactIndex {
            name: name.to_string(),
            key_len,
            value_schema,
            config,
            values_config: ArrayConfig::default(),
        });
        Ok(())
    }

    fn check_mutable(&self) -> Result<()> {
        if self.committed {
            return Err(StrataError::Catalog(
                "catalog is frozen after commit".into(),
            ));
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.starts_with('_') {
            return Err(StrataError::Catalog(format!(
                "name '{}' is reserved or empty",
                name
            )));
        }
        Ok(())
    }

    fn check_structure_name(&self, name: &str) -> Result<()> {
        if self.structures.iter().any(|s| s.name() == name) {
            return Err(StrataError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    fn dataset_schema(&self, name: &str) -> Result<&Schema> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .map(|d| &d.schema)
            .ok_or_else(|| StrataError::Catalog(format!("unknown dataset '{}'", name)))
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.header_fields
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| {
                StrataError::Corruption(format!("header field '{}' not in layout", name))
            })
    }

    // =========================================================================
    // Structure Access (post-commit)
    // =========================================================================

    /// Borrow a growable array together with the file store
    pub fn array(&mut self, name: &str) -> Result<ArrayHandle<'_>> {
        let array = self
            .arrays
            .get_mut(name)
            .ok_or_else(|| StrataError::Catalog(format!("unknown array '{}'", name)))?;
        Ok(ArrayHandle {
            store: &mut self.store,
            array,
        })
    }

    /// Borrow a hash index together with the file store
    pub fn hash_index(&mut self, name: &str) -> Result<HashIndexHandle<'_>> {
        let index = self
            .indexes
            .get_mut(name)
            .ok_or_else(|| StrataError::Catalog(format!("unknown hash index '{}'", name)))?;
        Ok(HashIndexHandle {
            store: &mut self.store,
            index,
        })
    }

    /// Borrow a compact index together with the file store
    pub fn compact_index(&mut self, name: &str) -> Result<CompactIndexHandle<'_>> {
        let index = self
            .compacts
            .get_mut(name)
            .ok_or_else(|| StrataError::Catalog(format!("unknown compact index '{}'", name)))?;
        Ok(CompactIndexHandle {
            store: &mut self.store,
            index,
        })
    }

    // =========================================================================
    // Blob and Header Access
    // =========================================================================

    /// Store raw bytes through the blob allocator; returns their address
    pub fn append_blob(&mut self, payload: &[u8]) -> Result<u64> {
        let blobs = self
            .blobs
            .as_mut()
            .ok_or_else(|| StrataError::Catalog("database not committed".into()))?;
        blobs.append(&mut self.store, payload)
    }

    /// Read raw bytes back from a blob address
    pub fn get_blob(&mut self, address: u64) -> Result<Vec<u8>> {
        let blobs = self
            .blobs
            .as_ref()
            .ok_or_else(|| StrataError::Catalog("database not committed".into()))?;
        blobs.get(&mut self.store, address)
    }

    /// The value codec configured for this database
    pub fn codec(&self) -> &BlobCodec {
        &self.codec
    }

    /// Read a u64 header field by name
    pub fn header_get(&mut self, name: &str) -> Result<u64> {
        let slot = self.slot(name)?;
        self.store.header_get(slot)
    }

    /// Write a u64 header field by name
    pub fn header_set(&mut self, name: &str, value: u64) -> Result<()> {
        let slot = self.slot(name)?;
        self.store.header_set(slot, value)?;
        Ok(())
    }

    // =========================================================================
    // Transactions and Introspection
    // =========================================================================

    /// Defer durability syncing until `end_transaction`
    pub fn begin_transaction(&mut self) {
        self.store.begin_transaction();
    }

    /// Sync buffered writes and restore per-write durability
    pub fn end_transaction(&mut self) -> Result<()> {
        self.store.end_transaction()
    }

    pub fn in_transaction(&self) -> bool {
        self.store.in_transaction()
    }

    /// Force a sync of all written data
    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn file_size(&self) -> Result<u64> {
        self.store.file_size()
    }

    /// Number of allocated blob blocks
    pub fn blob_block_count(&self) -> usize {
        self.blobs.as_ref().map(|b| b.block_count()).unwrap_or(0)
    }
}

// =============================================================================
// Structure Handles
// =============================================================================

/// Mutable view of one growable array and the file store behind it
pub struct ArrayHandle<'a> {
    store: &'a mut FileStore,
    array: &'a mut GrowableArray,
}

impl ArrayHandle<'_> {
    pub fn append(&mut self, record: &Record) -> Result<u64> {
        self.array.append(self.store, record)
    }

    pub fn get(&mut self, position: u64) -> Result<Record> {
        self.array.get(self.store, position)
    }

    pub fn set(&mut self, position: u64, record: &Record) -> Result<()> {
        self.array.set(self.store, position, record)
    }

    pub fn get_range(&mut self, start: u64, stop: u64, step: u64) -> Result<Vec<Record>> {
        self.array.get_range(self.store, start, stop, step)
    }

    pub fn len(&self) -> u64 {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }
}

/// Mutable view of one hash index and the file store behind it
pub struct HashIndexHandle<'a> {
    store: &'a mut FileStore,
    index: &'a mut GrowableHashIndex,
}

impl HashIndexHandle<'_> {
    /// Insert or update; returns true when a new slot was claimed
    pub fn insert(&mut self, record: &Record) -> Result<bool> {
        self.index.insert(self.store, record)
    }

    pub fn lookup(&mut self, key: &Value) -> Result<Record> {
        self.index.lookup(self.store, key)
    }

    pub fn contains(&mut self, key: &Value) -> Result<bool> {
        self.index.contains(self.store, key)
    }

    pub fn delete(&mut self, key: &Value) -> Result<()> {
        self.index.delete(self.store, key)
    }

    pub fn scan(&mut self) -> Result<Vec<Record>> {
        self.index.scan(self.store)
    }

    pub fn p_init(&self) -> u32 {
        self.index.p_init()
    }

    pub fn p_last(&self) -> u32 {
        self.index.p_last()
    }

    pub fn generation_count(&self) -> u32 {
        self.index.generation_count()
    }

    pub fn strategy(&self) -> ProbeStrategy {
        self.index.strategy()
    }
}

/// Mutable view of one compact index and the file store behind it
pub struct CompactIndexHandle<'a> {
    store: &'a mut FileStore,
    index: &'a mut CompactHashIndex,
}

impl CompactIndexHandle<'_> {
    pub fn insert(&mut self, key: &str, record: &Record) -> Result<()> {
        self.index.insert(self.store, key, record)
    }

    pub fn lookup(&mut self, key: &str) -> Result<Record> {
        self.index.lookup(self.store, key)
    }

    pub fn contains(&mut self, key: &str) -> Result<bool> {
        self.index.contains(self.store, key)
    }

    pub fn value_count(&self) -> u64 {
        self.index.value_count()
    }

    pub fn p_init(&self) -> u32 {
        self.index.p_init()
    }

    pub fn p_last(&self) -> u32 {
        self.index.p_last()
    }
}
