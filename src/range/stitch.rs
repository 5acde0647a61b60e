//! Stitch
//!
//! A contiguous physical byte range `[start, start + length)`.

use std::io::SeekFrom;

use serde::{Deserialize, Serialize};

use crate::error::{BraidError, Result, StitchErrorReason};
use crate::stream::StreamHandle;

/// A half-open physical interval in the backing medium
///
/// Stitches are immutable; every slicing operation returns a new value.
/// Non-negativity of start and length is carried by the unsigned types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Stitch {
    start: u64,
    length: u32,
}

impl Stitch {
    /// The empty stitch at offset 0
    pub const NULL: Stitch = Stitch::new(0, 0);

    pub const fn new(start: u64, length: u32) -> Self {
        Self { start, length }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// First offset past the range
    pub fn end(&self) -> u64 {
        self.start + self.length as u64
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Sub-range `[offset, offset + count)` relative to this stitch
    pub fn slice(&self, offset: u32, count: u32) -> Result<Stitch> {
        if offset > self.length {
            return Err(StitchErrorReason::OffsetOutOfBounds.into());
        }

        if offset as u64 + count as u64 > self.length as u64 {
            return Err(StitchErrorReason::CountTooLong.into());
        }

        Ok(Stitch::new(self.start + offset as u64, count))
    }

    /// The first `count` bytes
    pub fn take(&self, count: u32) -> Result<Stitch> {
        self.slice(0, count)
    }

    /// The last `count` bytes
    pub fn take_end(&self, count: u32) -> Result<Stitch> {
        if count > self.length {
            return Err(StitchErrorReason::CountTooLong.into());
        }

        if count == self.length {
            return Ok(*self);
        }

        self.slice(self.length - count, count)
    }

    /// Same length, start moved by `amount` bytes
    pub fn shove(&self, amount: i64) -> Result<Stitch> {
        let start = (self.start as i64).checked_add(amount).filter(|s| *s >= 0);

        match start {
            Some(start) => Ok(Stitch::new(start as u64, self.length)),
            None => Err(BraidError::InvalidArgument(format!(
                "cannot shove stitch at {} by {}",
                self.start, amount
            ))),
        }
    }

    /// Interval overlap test; symmetric, and empty stitches never collide
    pub fn collides_with(&self, other: &Stitch) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start < other.end()
            && other.start < self.end()
    }

    /// Queue a write of as much of `buffer` as fits into this stitch.
    ///
    /// Returns the number of bytes queued; failures surface when the
    /// handle's tasks are awaited.
    pub fn write(&self, buffer: &[u8], handle: &mut StreamHandle<'_>) -> Result<usize> {
        if self.is_empty() || buffer.is_empty() {
            return Ok(0);
        }

        let count = buffer.len().min(self.length as usize);

        handle.seek(SeekFrom::Start(self.start))?;
        handle.write(&buffer[..count])?;

        Ok(count)
    }
}
