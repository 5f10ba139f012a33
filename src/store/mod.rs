//! Single-file storage layer
//!
//! One binary file backs the whole engine.
//!
//! ## File Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Metadata Length: u32 LE (4 bytes)                        │
//! ├──────────────────────────────────────────────────────────┤
//! │ Metadata Blob (L bytes)                                  │
//! │   CRC32: u32 LE (4) | bincode-encoded catalog            │
//! ├──────────────────────────────────────────────────────────┤
//! │ Header Record (8 bytes per slot)                         │
//! │   Slot 0: write cursor | one u64 per bookkeeping field   │
//! ├──────────────────────────────────────────────────────────┤
//! │ Table Region (grows by extension)                        │
//! │   Record blocks and blob blocks, allocated at the cursor │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The `FileStore` owns the file handle and the write cursor; the
//! `BlobStore` layers slot-quantized variable-length blob allocation on
//! top of it.

mod blob;
mod file;

pub use blob::BlobStore;
pub use file::FileStore;

pub(crate) use blob::block_list_schema;
