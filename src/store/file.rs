//! File-backed store
//!
//! Keeps the region in memory and persists it as a whole on `flush`.
//! `reload` re-reads the file, picking up changes made by another process
//! (e.g. a replicated snapshot written next to the running index).

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

use super::memory::checked_range;
use super::BlockStore;

/// File name of the index table inside a data directory
pub const INDEX_FILENAME: &str = "index.tbl";

/// File name of the block region inside a data directory
pub const BLOCKS_FILENAME: &str = "blocks.dat";

/// Magic bytes identifying a store file
const MAGIC: [u8; 4] = *b"XHST";

/// Current store file format version
const VERSION: u16 = 1;

/// Fixed-size file header, encoded with bincode
#[derive(Debug, Serialize, Deserialize)]
struct StoreHeader {
    magic: [u8; 4],
    version: u16,
    length: u64,
    crc: u32,
}

/// Region persisted to a single file
#[derive(Debug)]
pub struct FileStore {
    /// Store file path
    path: PathBuf,
    /// In-memory copy of the region
    data: Vec<u8>,
    /// fsync on every flush
    sync: bool,
}

impl FileStore {
    /// Open a store file, loading its region if the file exists
    pub fn open(path: &Path, sync: bool) -> Result<Self> {
        let data = Self::read_region(path)?;

        tracing::debug!(
            path = %path.display(),
            bytes = data.len(),
            "Opened file store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            data,
            sync,
        })
    }

    /// Open the index table and block region stores of a data directory,
    /// creating the directory if needed
    pub fn open_pair(dir: &Path, sync: bool) -> Result<(Self, Self)> {
        fs::create_dir_all(dir)?;
        let table = Self::open(&dir.join(INDEX_FILENAME), sync)?;
        let blocks = Self::open(&dir.join(BLOCKS_FILENAME), sync)?;
        Ok((table, blocks))
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read_region(path: &Path) -> Result<Vec<u8>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = BufReader::new(File::open(path)?);

        let header: StoreHeader = bincode::deserialize_from(&mut reader).map_err(|e| {
            IndexError::CorruptFormat(format!(
                "Unreadable store header in {}: {}",
                path.display(),
                e
            ))
        })?;

        if header.magic != MAGIC {
            return Err(IndexError::CorruptFormat(format!(
                "Invalid store magic in {}: expected {:?}, got {:?}",
                path.display(),
                MAGIC,
                header.magic
            )));
        }
        if header.version != VERSION {
            return Err(IndexError::CorruptFormat(format!(
                "Unsupported store version {} in {} (expected {})",
                header.version,
                path.display(),
                VERSION
            )));
        }

        let length = usize::try_from(header.length).map_err(|_| {
            IndexError::CorruptFormat(format!("Store length {} is not addressable", header.length))
        })?;

        let mut data = vec![0u8; length];
        reader.read_exact(&mut data).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => IndexError::CorruptFormat(format!(
                "Store file {} is truncated: expected {} region bytes",
                path.display(),
                length
            )),
            _ => IndexError::Io(e),
        })?;

        let crc = crc32fast::hash(&data);
        if crc != header.crc {
            return Err(IndexError::CorruptFormat(format!(
                "Store checksum mismatch in {}: expected {:08x}, got {:08x}",
                path.display(),
                header.crc,
                crc
            )));
        }

        Ok(data)
    }

    /// Write header + region to a temporary file, then rename it into place
    fn write_region(&self) -> Result<()> {
        let mut tmp_name = OsString::from(self.path.as_os_str());
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);

        let header = StoreHeader {
            magic: MAGIC,
            version: VERSION,
            length: self.data.len() as u64,
            crc: crc32fast::hash(&self.data),
        };
        bincode::serialize_into(&mut writer, &header)?;
        writer.write_all(&self.data)?;
        writer.flush()?;

        let file = writer.into_inner().map_err(|e| {
            IndexError::Storage(format!("Failed to flush store file: {}", e))
        })?;
        if self.sync {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl BlockStore for FileStore {
    fn allocate(&mut self, size: usize) -> Result<u64> {
        let offset = self.data.len();
        self.data.resize(offset + size, 0);
        Ok(offset as u64)
    }

    fn load(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let range = checked_range(self.data.len(), offset, len)?;
        Ok(&self.data[range])
    }

    fn load_mut(&mut self, offset: u64, len: usize) -> Result<&mut [u8]> {
        let range = checked_range(self.data.len(), offset, len)?;
        Ok(&mut self.data[range])
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn region(&self) -> &[u8] {
        &self.data
    }

    fn restore(&mut self, region: Vec<u8>) -> Result<()> {
        self.data = region;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.write_region()?;
        tracing::debug!(
            path = %self.path.display(),
            bytes = self.data.len(),
            "Flushed file store"
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.data.clear();
        Ok(())
    }

    fn read_persisted(&self) -> Result<Vec<u8>> {
        Self::read_region(&self.path)
    }
}
