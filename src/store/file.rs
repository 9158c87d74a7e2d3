//! Index file format (`.bf`)
//!
//! One append-only file per index. Every accepted (key, txId) pair is
//! appended as a checksummed frame; opening the file replays all frames
//! into the in-memory ordered tree.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (32 bytes)                       │
//! │   magic: [u8; 4] = "IDXB"               │
//! │   version: u16                          │
//! │   key_size: u32                         │
//! │   reserved: [u8; 18]                    │
//! │   checksum: u32 (CRC32 of bytes 0..28)  │
//! ├─────────────────────────────────────────┤
//! │ FRAMES (variable)                       │
//! │   length: u32                           │
//! │   data: [u8; length] (IndexRecord)      │
//! │   crc: u32 (CRC32 of length + data)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! A frame cut short at the end of the file is a torn write: it is
//! truncated away on open. A checksum mismatch is corruption.

use crate::store::error::{StoreError, StoreResult};
use crate::store::types::IndexRecord;
use serde::Deserialize;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for index file identification
const FILE_MAGIC: [u8; 4] = *b"IDXB";

/// Current file format version
const FILE_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Upper bound on a single frame
const MAX_FRAME_LEN: usize = 1 << 20;

/// Sync strategy for index file writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Fsync after every record (safest, slowest)
    EveryWrite,
    /// Fsync once per committed batch
    #[default]
    Batched,
    /// No fsync, rely on OS
    None,
}

/// Index file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub key_size: u32,
}

impl FileHeader {
    pub fn new(key_size: u32) -> Self {
        Self {
            version: FILE_VERSION,
            key_size,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&FILE_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..10].copy_from_slice(&self.key_size.to_le_bytes());
        // bytes 10..28 reserved
        let checksum = crc32fast::hash(&buf[0..28]);
        buf[28..32].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(path: &Path, buf: &[u8; HEADER_SIZE]) -> StoreResult<Self> {
        let stored = u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]);
        let computed = crc32fast::hash(&buf[0..28]);
        if stored != computed {
            return Err(StoreError::corruption(
                path,
                format!("header checksum mismatch: stored={}, computed={}", stored, computed),
            ));
        }

        if buf[0..4] != FILE_MAGIC {
            return Err(StoreError::corruption(
                path,
                format!("invalid magic: {:?}", &buf[0..4]),
            ));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > FILE_VERSION {
            return Err(StoreError::corruption(
                path,
                format!("unsupported version: {}", version),
            ));
        }

        let key_size = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]);
        Ok(Self { version, key_size })
    }
}

/// Result of reading one frame
enum Frame {
    Record { record: IndexRecord, len: u64 },
    /// Clean end of file
    End,
    /// Incomplete trailing frame
    Torn,
}

/// Append-only index file
pub struct IndexFile {
    file: File,
    path: PathBuf,
    header: FileHeader,
    record_count: u64,
    sync_mode: SyncMode,
    dirty: bool,
}

impl IndexFile {
    /// Create a new index file. Fails if the file already exists.
    pub fn create(path: impl AsRef<Path>, key_size: u32, sync_mode: SyncMode) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)?;

        let header = FileHeader::new(key_size);
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        Ok(Self {
            file,
            path,
            header,
            record_count: 0,
            sync_mode,
            dirty: false,
        })
    }

    /// Open an existing index file and replay its records
    pub fn open(
        path: impl AsRef<Path>,
        sync_mode: SyncMode,
    ) -> StoreResult<(Self, Vec<IndexRecord>)> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(StoreError::FileNotFound(path));
        }

        let mut reader = BufReader::new(File::open(&path)?);

        let mut header_buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                StoreError::corruption(&path, "file shorter than header")
            } else {
                StoreError::Io(e)
            }
        })?;
        let header = FileHeader::from_bytes(&path, &header_buf)?;

        let mut records = Vec::new();
        let mut good_offset = HEADER_SIZE as u64;
        let mut torn = false;

        loop {
            match Self::read_frame(&path, &mut reader)? {
                Frame::Record { record, len } => {
                    records.push(record);
                    good_offset += len;
                }
                Frame::End => break,
                Frame::Torn => {
                    torn = true;
                    break;
                }
            }
        }
        drop(reader);

        let file = OpenOptions::new().append(true).open(&path)?;
        if torn {
            tracing::warn!(
                path = ?path,
                offset = good_offset,
                records = records.len(),
                "Truncating torn trailing frame"
            );
            file.set_len(good_offset)?;
            file.sync_all()?;
        }

        let index_file = Self {
            file,
            path,
            header,
            record_count: records.len() as u64,
            sync_mode,
            dirty: false,
        };

        Ok((index_file, records))
    }

    fn read_frame<R: Read>(path: &Path, reader: &mut R) -> StoreResult<Frame> {
        let mut len_buf = [0u8; 4];
        match read_full(reader, &mut len_buf)? {
            0 => return Ok(Frame::End),
            n if n < len_buf.len() => return Ok(Frame::Torn),
            _ => {}
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_FRAME_LEN {
            return Err(StoreError::corruption(
                path,
                format!("frame length too large: {}", len),
            ));
        }

        let mut data = vec![0u8; len];
        if read_full(reader, &mut data)? < len {
            return Ok(Frame::Torn);
        }

        let mut crc_buf = [0u8; 4];
        if read_full(reader, &mut crc_buf)? < crc_buf.len() {
            return Ok(Frame::Torn);
        }
        let stored_crc = u32::from_le_bytes(crc_buf);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len_buf);
        hasher.update(&data);
        let computed_crc = hasher.finalize();

        if stored_crc != computed_crc {
            return Err(StoreError::corruption(
                path,
                format!(
                    "frame CRC mismatch: stored={}, computed={}",
                    stored_crc, computed_crc
                ),
            ));
        }

        let record: IndexRecord = bincode::deserialize(&data)
            .map_err(|e| StoreError::corruption(path, format!("undecodable frame: {}", e)))?;

        Ok(Frame::Record {
            record,
            len: (len + 8) as u64,
        })
    }

    /// Encode a record as a complete frame
    fn encode_frame(record: &IndexRecord) -> StoreResult<Vec<u8>> {
        let data = bincode::serialize(record)?;
        let len = (data.len() as u32).to_le_bytes();

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len);
        hasher.update(&data);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(data.len() + 8);
        frame.extend_from_slice(&len);
        frame.extend_from_slice(&data);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Append one record as a single write
    pub fn append(&mut self, record: &IndexRecord) -> StoreResult<()> {
        let frame = Self::encode_frame(record)?;
        self.file.write_all(&frame)?;
        self.record_count += 1;
        self.dirty = true;

        if self.sync_mode == SyncMode::EveryWrite {
            self.sync()?;
        }
        Ok(())
    }

    /// Make everything appended so far durable according to the sync mode
    pub fn commit(&mut self) -> StoreResult<()> {
        match self.sync_mode {
            SyncMode::EveryWrite | SyncMode::Batched => {
                if self.dirty {
                    self.sync()?;
                }
            }
            SyncMode::None => {
                self.file.flush()?;
                self.dirty = false;
            }
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> StoreResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        self.dirty = false;
        Ok(())
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn key_size(&self) -> u32 {
        self.header.key_size
    }

    /// Number of records in the file
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the file size
    pub fn file_size(&self) -> StoreResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

/// Read until `buf` is full or EOF; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
