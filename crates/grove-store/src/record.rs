//! Flat-file store of fixed-size records.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use grove_common::{GroveError, Result};

/// Header slot (1-based) holding the persisted record count.
pub const RECORD_COUNT_SLOT: usize = 1;

/// A flat file holding a bank of header integers followed by an append-only
/// sequence of fixed-size records.
///
/// Records are addressed by their 0-based append ordinal, which is permanent
/// and never reused. Header slots are 1-based little-endian `u32` values; slot
/// 1 is reserved for the record count and rewritten by [`RecordFile::flush`].
///
/// All I/O is synchronous; there is no write buffering beyond the platform's.
pub struct RecordFile {
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    #[allow(dead_code)]
    path: PathBuf,
    header_slots: usize,
    record_size: usize,
    record_count: u32,
    fsync_enabled: bool,
}

impl Inner {
    fn header_bytes(&self) -> u64 {
        (self.header_slots * 4) as u64
    }

    fn record_offset(&self, ordinal: u32) -> u64 {
        self.header_bytes() + ordinal as u64 * self.record_size as u64
    }

    fn read_slot(&mut self, slot: usize) -> Result<u32> {
        self.file.seek(SeekFrom::Start(((slot - 1) * 4) as u64))?;
        let mut buf = [0u8; 4];
        self.file.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_slot(&mut self, slot: usize, value: u32) -> Result<()> {
        self.file.seek(SeekFrom::Start(((slot - 1) * 4) as u64))?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }
}

impl RecordFile {
    /// Opens or creates a record file.
    ///
    /// A new file starts with a zeroed header. An existing file restores its
    /// record count from header slot 1, so it must have been created with the
    /// same `header_slots` and `record_size`.
    pub fn open(
        path: impl AsRef<Path>,
        header_slots: usize,
        record_size: usize,
        fsync_enabled: bool,
    ) -> Result<Self> {
        if header_slots == 0 {
            return Err(GroveError::ConfigError(
                "record file needs at least one header slot".to_string(),
            ));
        }
        if record_size == 0 {
            return Err(GroveError::ConfigError(
                "record size must be non-zero".to_string(),
            ));
        }

        let path = path.as_ref().to_path_buf();
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut inner = Inner {
            file,
            path,
            header_slots,
            record_size,
            record_count: 0,
            fsync_enabled,
        };

        if existed {
            inner.record_count = inner.read_slot(RECORD_COUNT_SLOT)?;
        } else {
            inner.file.write_all(&vec![0u8; header_slots * 4])?;
        }

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Returns the fixed record size in bytes.
    pub fn record_size(&self) -> usize {
        self.inner.lock().record_size
    }

    /// Returns the number of records in the store.
    pub fn record_count(&self) -> u32 {
        self.inner.lock().record_count
    }

    /// Returns the number of header slots.
    pub fn header_slots(&self) -> usize {
        self.inner.lock().header_slots
    }

    /// Reads a header slot (1-based).
    pub fn header_slot(&self, slot: usize) -> Result<u32> {
        let mut inner = self.inner.lock();
        if slot == 0 || slot > inner.header_slots {
            return Err(GroveError::HeaderSlotOutOfRange {
                slot,
                slots: inner.header_slots,
            });
        }
        inner.read_slot(slot)
    }

    /// Writes a header slot (1-based).
    pub fn set_header_slot(&self, slot: usize, value: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if slot == 0 || slot > inner.header_slots {
            return Err(GroveError::HeaderSlotOutOfRange {
                slot,
                slots: inner.header_slots,
            });
        }
        inner.write_slot(slot, value)
    }

    /// Appends a record after all existing ones and returns its ordinal.
    pub fn append(&self, record: &[u8]) -> Result<u32> {
        let mut inner = self.inner.lock();
        if record.len() != inner.record_size {
            return Err(GroveError::RecordSizeMismatch {
                expected: inner.record_size,
                actual: record.len(),
            });
        }

        let ordinal = inner.record_count;
        let offset = inner.record_offset(ordinal);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(record)?;
        inner.record_count = ordinal + 1;

        Ok(ordinal)
    }

    /// Overwrites the record at `ordinal` in place.
    pub fn update(&self, ordinal: u32, record: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if record.len() != inner.record_size {
            return Err(GroveError::RecordSizeMismatch {
                expected: inner.record_size,
                actual: record.len(),
            });
        }
        if ordinal >= inner.record_count {
            return Err(GroveError::RecordOutOfBounds {
                ordinal,
                count: inner.record_count,
            });
        }

        let offset = inner.record_offset(ordinal);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(record)?;

        Ok(())
    }

    /// Reads the record at `ordinal`.
    pub fn read(&self, ordinal: u32) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        if ordinal >= inner.record_count {
            return Err(GroveError::RecordOutOfBounds {
                ordinal,
                count: inner.record_count,
            });
        }

        let offset = inner.record_offset(ordinal);
        inner.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; inner.record_size];
        inner.file.read_exact(&mut buf)?;

        Ok(buf)
    }

    /// Truncates the store back to a zeroed header with no records.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.set_len(0)?;
        inner.file.seek(SeekFrom::Start(0))?;
        let header = vec![0u8; inner.header_slots * 4];
        inner.file.write_all(&header)?;
        inner.record_count = 0;
        Ok(())
    }

    /// Persists the record count to header slot 1 and syncs if enabled.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let count = inner.record_count;
        inner.write_slot(RECORD_COUNT_SLOT, count)?;
        if inner.fsync_enabled {
            inner.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for RecordFile {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
