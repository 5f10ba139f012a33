//! File store
//!
//! Owns the single database file, the persisted write cursor, and the
//! fixed-slot header record. Everything above this layer addresses the
//! file through positioned reads and writes; space is only ever created
//! by extending the file at the cursor.
//!
//! Durability model: outside a transaction every positioned write is
//! synced to disk immediately. `begin_transaction` defers syncing to the
//! matching `end_transaction`, trading durability for throughput on bulk
//! loads.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};

/// Slot index of the write cursor in the header record
pub(crate) const CURSOR_SLOT: usize = 0;

/// Raw positioned I/O over the single database file
pub struct FileStore {
    path: PathBuf,
    file: File,
    /// Byte offset of the header record; zero until the layout is committed
    header_offset: u64,
    /// Number of u64 slots in the header record
    header_slots: usize,
    /// Cached write cursor, persisted in header slot 0
    cursor: u64,
    /// When set, every write syncs to disk; cleared inside transactions
    sync_writes: bool,
}

impl FileStore {
    /// Create a fresh (truncated) database file
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            header_offset: 0,
            header_slots: 0,
            cursor: 0,
            sync_writes: true,
        })
    }

    /// Open an existing database file for read/write
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            header_offset: 0,
            header_slots: 0,
            cursor: 0,
            sync_writes: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Bind the header location once the metadata layout is known, and
    /// load the persisted cursor
    pub(crate) fn attach_header(&mut self, offset: u64, slots: usize) -> Result<()> {
        self.header_offset = offset;
        self.header_slots = slots;
        self.cursor = self.header_get(CURSOR_SLOT)?;
        Ok(())
    }

    /// End of committed data; new allocations start here
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub(crate) fn set_cursor(&mut self, value: u64) -> Result<()> {
        self.header_set(CURSOR_SLOT, value)?;
        self.cursor = value;
        Ok(())
    }

    /// Extend the file by `size` bytes at the cursor and return the offset
    /// of the newly claimed range
    pub fn allocate(&mut self, size: u64) -> Result<u64> {
        self.extend(size)?;
        let start = self.cursor;
        self.set_cursor(start + size)?;
        Ok(start)
    }

    /// Grow the file by `size` zero-filled bytes
    pub(crate) fn extend(&mut self, size: u64) -> Result<()> {
        let current = self.file_size()?;
        self.file.set_len(current + size)?;
        Ok(())
    }

    /// Write bytes at an absolute offset
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Read exactly `len` bytes at an absolute offset
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read one u64 header slot
    pub(crate) fn header_get(&mut self, slot: usize) -> Result<u64> {
        self.check_slot(slot)?;
        let bytes = self.read_at(self.header_offset + 8 * slot as u64, 8)?;
        let mut le = [0u8; 8];
        le.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(le))
    }

    /// Write one u64 header slot
    pub(crate) fn header_set(&mut self, slot: usize, value: u64) -> Result<u64> {
        self.check_slot(slot)?;
        self.write_at(self.header_offset + 8 * slot as u64, &value.to_le_bytes())?;
        Ok(value)
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if self.header_offset == 0 || slot >= self.header_slots {
            return Err(StrataError::Corruption(format!(
                "header slot {} outside attached header ({} slots)",
                slot, self.header_slots
            )));
        }
        Ok(())
    }

    /// Defer per-write syncing until `end_transaction`
    pub fn begin_transaction(&mut self) {
        self.sync_writes = false;
    }

    /// Re-enable per-write syncing and sync buffered writes now
    pub fn end_transaction(&mut self) -> Result<()> {
        self.sync_writes = true;
        self.file.sync_data()?;
        Ok(())
    }

    pub(crate) fn in_transaction(&self) -> bool {
        !self.sync_writes
    }

    /// Force a sync of all written data
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
