//! # StrataDB
//!
//! An embedded, single-file storage engine built around growable on-disk
//! data structures: append-friendly arrays, bloom-filtered hash indexes
//! and a slot-quantized blob allocator, all sharing one database file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      StrataMap<V>                       │
//! │        (persistent map over serde-encoded values)       │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │
//! ┌───────────────────────────▼─────────────────────────────┐
//! │                        Database                         │
//! │      (catalog, metadata blob, header bookkeeping)       │
//! └──────┬──────────────┬──────────────┬────────────────────┘
//!        │              │              │
//! ┌──────▼─────┐ ┌──────▼─────────┐ ┌──▼──────────────────┐
//! │ Growable   │ │ GrowableHash   │ │ CompactHashIndex    │
//! │ Array      │ │ Index + Bloom  │ │ ({hash,key,addr})   │
//! └──────┬─────┘ └──────┬─────────┘ └──┬──────────────────┘
//!        │              │              │
//! ┌──────▼──────────────▼──────────────▼───────────────────┐
//! │                 FileStore + BlobStore                  │
//! │        (single file, write cursor, blob blocks)        │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use stratadb::{MapConfig, StrataMap};
//! use std::path::Path;
//!
//! # fn main() -> stratadb::Result<()> {
//! let mut map: StrataMap<String> =
//!     StrataMap::create(Path::new("data.strata"), MapConfig::default())?;
//! map.set("greeting", &"hello".to_string())?;
//! assert_eq!(map.get("greeting")?, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! Structures grow by generations rather than rehashing: a full hash index
//! allocates a strictly larger generation and keeps the old ones, so no
//! insert ever rewrites existing data. All writes are synced per call
//! unless wrapped in a transaction.

pub mod array;
pub mod cache;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod map;
pub mod schema;
pub mod store;
pub mod table;

pub use codec::Compression;
pub use config::{ArrayConfig, Config, ConfigBuilder, HashIndexConfig, MapConfig};
pub use db::Database;
pub use error::{Result, StrataError};
pub use map::StrataMap;
pub use schema::{FieldType, Record, Schema, Value};

/// Current version of stratadb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
