//! Backing Medium
//!
//! The random-access byte store a braid lives on.
//!
//! Only the I/O worker ever touches a medium; everything else talks to it
//! through queued tasks.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// A seekable, resizable byte store
pub trait Medium: Read + Write + Seek + Send {
    /// Current length in bytes
    fn len(&mut self) -> io::Result<u64>;

    fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Grow (zero-filled) or truncate to exactly `len` bytes
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Make written bytes durable
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl Medium for File {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

impl Medium for Cursor<Vec<u8>> {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds memory"))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

// =============================================================================
// Shared In-Memory Medium
// =============================================================================

/// In-memory medium whose clones share the same bytes.
///
/// Each clone keeps its own cursor, so a braid can be closed and reopened
/// over the same contents without touching the filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    data: Arc<Mutex<Vec<u8>>>,
    position: u64,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
            position: 0,
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Current length in bytes
    pub fn size(&self) -> u64 {
        self.data.lock().len() as u64
    }
}

impl Read for MemoryMedium {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.lock();
        let len = data.len() as u64;

        if self.position >= len {
            return Ok(0);
        }

        let start = self.position as usize;
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        self.position += count as u64;

        Ok(count)
    }
}

impl Write for MemoryMedium {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.lock();
        let start = self.position as usize;
        let end = start + buf.len();

        if data.len() < end {
            data.resize(end, 0);
        }

        data[start..end].copy_from_slice(buf);
        self.position = end as u64;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryMedium {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.lock().len() as i128;

        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => len + delta as i128,
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of medium",
            ));
        }

        self.position = target as u64;
        Ok(self.position)
    }
}

impl Medium for MemoryMedium {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.size())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds memory"))?;
        self.data.lock().resize(len, 0);
        Ok(())
    }
}
