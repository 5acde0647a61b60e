//! Strand
//!
//! A seekable byte stream over the ordered knots of one strand id.
//!
//! ## Capacity vs In-Use
//! ```text
//!  knots:     [ knot 0 (full) ][ knot 1 (full) ][ knot 2 (partial)    ]
//!  capacity:  |<------------------------------------------------------>|
//!  in_use:    |<----------------------------------------->|
//!                                                     length
//! ```
//!
//! `in_use` is always a prefix of `capacity`. Reads and writes slice it to
//! the requested logical range and let the seam fan out the physical I/O.
//!
//! Every view of one strand id shares a single `StrandState`; only the
//! position is per view. Payload I/O runs under the braid's index read lock,
//! so a destroy or clear cannot free knots while bytes move through them.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{BraidError, Result};
use crate::range::Seam;
use crate::record::{Encodable, EncodedValue};

use super::{Braid, KnotSlot};

pub(super) struct StrandState {
    /// Ordered by ordinal
    knots: Vec<KnotSlot>,
    capacity: Seam,
    in_use: Seam,
}

impl StrandState {
    pub(super) fn build(knots: Vec<KnotSlot>) -> Result<Self> {
        let capacity = Seam::build(knots.iter().map(|k| k.header.stitch))?;

        // Every knot but the last is full; only the last one's count is trusted
        let length = match knots.split_last() {
            Some((last, leading)) => {
                leading
                    .iter()
                    .map(|k| k.header.stitch.length() as u64)
                    .sum::<u64>()
                    + last.header.used_bytes as u64
            }
            None => 0,
        };

        let in_use = capacity.slice(0, length)?;

        Ok(Self {
            knots,
            capacity,
            in_use,
        })
    }

    /// Recompute both seams after the knot list changed
    fn rebuild(&mut self, length: u64) -> Result<()> {
        self.capacity = Seam::build(self.knots.iter().map(|k| k.header.stitch))?;
        self.in_use = self.capacity.slice(0, length)?;
        Ok(())
    }

    fn next_ordinal(&self) -> u32 {
        self.knots.last().map_or(0, |k| k.header.ordinal + 1)
    }
}

/// One view of a strand, with its own position
///
/// Views of the same id see each other's growth and shrinkage at once.
pub struct Strand<'b> {
    braid: &'b Braid,
    id: u32,
    state: Arc<RwLock<StrandState>>,
    position: AtomicU64,
}

impl<'b> Strand<'b> {
    pub(super) fn new(braid: &'b Braid, id: u32, state: Arc<RwLock<StrandState>>) -> Self {
        Self {
            braid,
            id,
            state,
            position: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn braid(&self) -> &'b Braid {
        self.braid
    }

    /// Logical length in bytes
    pub fn length(&self) -> u64 {
        self.state.read().in_use.byte_length()
    }

    /// Bytes available before another knot is needed
    pub fn capacity(&self) -> u64 {
        self.state.read().capacity.byte_length()
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn knot_count(&self) -> usize {
        self.state.read().knots.len()
    }

    // =========================================================================
    // Stream Operations
    // =========================================================================

    /// Move the position, clamped into `[0, length]`. Never fails.
    pub fn seek(&self, position: SeekFrom) -> u64 {
        let length = self.length() as i128;

        let target = match position {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position() as i128 + delta as i128,
            SeekFrom::End(delta) => length + delta as i128,
        };

        let clamped = target.clamp(0, length) as u64;
        self.position.store(clamped, Ordering::Release);
        clamped
    }

    /// Read from the current position; returns 0 at the end of the strand
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let state = self.state.read();
        let live = self.braid.pin_live(self.id)?;

        let position = self.position();
        let length = state.in_use.byte_length();

        if position >= length {
            return Ok(0);
        }

        let count = (buf.len() as u64).min(length - position);
        let seam = state.in_use.slice(position, count)?;

        let mut handle = self.braid.engine().handle();
        let bytes = seam.read(&mut handle)?;
        handle.finish()?;
        drop(live);

        buf[..bytes.len()].copy_from_slice(&bytes);
        self.position
            .store(position + bytes.len() as u64, Ordering::Release);

        Ok(bytes.len())
    }

    /// Write at the current position, growing the strand as needed
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.write();
        self.ensure_live()?;

        let position = self.position();
        let end = position + buf.len() as u64;

        if end > state.in_use.byte_length() {
            self.resize_locked(&mut state, end)?;
        }

        // Growth takes the index lock itself, so pin only for the transfer
        let live = self.braid.pin_live(self.id)?;
        let seam = state.in_use.slice(position, buf.len() as u64)?;

        let mut handle = self.braid.engine().handle();
        let written = seam.write(buf, &mut handle)?;
        handle.finish()?;
        drop(live);

        if written < buf.len() {
            return Err(BraidError::Internal(format!(
                "strand {} placed {} of {} bytes",
                self.id,
                written,
                buf.len()
            )));
        }

        self.position.store(end, Ordering::Release);
        Ok(written)
    }

    /// Grow or shrink to exactly `length` bytes.
    ///
    /// Shrinking frees surplus trailing knots; growing claims knots until
    /// the capacity covers `length`. The position is clamped to the new
    /// length.
    pub fn set_length(&self, length: u64) -> Result<()> {
        let mut state = self.state.write();
        self.ensure_live()?;

        self.resize_locked(&mut state, length)?;

        let _ = self
            .position
            .fetch_min(state.in_use.byte_length(), Ordering::AcqRel);
        Ok(())
    }

    // =========================================================================
    // Encoded Values
    // =========================================================================

    /// Decode one framed value at the current position
    pub fn read_value<T: Encodable>(&self) -> Result<T> {
        let mut reader = self;
        EncodedValue::read_from(&mut reader)?.decode()
    }

    /// Encode `value` at the current position
    pub fn write_value<T: Encodable>(&self, value: &T) -> Result<()> {
        let bytes = value.encode()?.to_bytes();
        self.write(&bytes)?;
        Ok(())
    }

    // =========================================================================
    // Resizing (state lock held)
    // =========================================================================

    fn ensure_live(&self) -> Result<()> {
        self.braid.pin_live(self.id).map(drop)
    }

    fn resize_locked(&self, state: &mut StrandState, length: u64) -> Result<()> {
        let current = state.in_use.byte_length();

        if length == current {
            return Ok(());
        }

        if length <= state.capacity.byte_length() {
            let kept = state.capacity.slice(0, length)?.len();

            if kept < state.knots.len() {
                let surplus: Vec<usize> = state.knots[kept..].iter().map(|k| k.slot).collect();
                self.braid.release_knots(self.id, &surplus)?;
                state.knots.truncate(kept);

                debug!(id = self.id, released = surplus.len(), "strand shrunk");
            }

            state.rebuild(length)?;
        } else {
            let mut capacity = state.capacity.byte_length();
            let mut failure = None;

            while capacity < length {
                let ordinal = state.next_ordinal();

                match self.braid.claim_knot(length - capacity, self.id, ordinal) {
                    Ok(knot) => {
                        capacity += knot.header.stitch.length() as u64;
                        state.knots.push(knot);
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            // Knots claimed before a failure still belong to this strand
            if let Some(e) = failure {
                state.rebuild(current)?;
                return Err(e);
            }

            state.rebuild(length)?;
            debug!(id = self.id, knots = state.knots.len(), capacity, "strand grown");
        }

        self.sync_used_bytes(state)
    }

    /// Rewrite `used_bytes` on every knot whose count no longer matches
    fn sync_used_bytes(&self, state: &mut StrandState) -> Result<()> {
        let mut remaining = state.in_use.byte_length();
        let mut updates = Vec::new();

        for (i, knot) in state.knots.iter().enumerate() {
            let length = knot.header.stitch.length() as u64;
            let used = remaining.min(length) as u32;
            remaining -= used as u64;

            if knot.header.used_bytes != used {
                updates.push((i, used));
            }
        }

        let slots: Vec<(usize, u32)> = updates
            .iter()
            .map(|&(i, used)| (state.knots[i].slot, used))
            .collect();

        self.braid.update_used_bytes(self.id, &slots)?;

        for (i, used) in updates {
            state.knots[i].header.set_used_bytes(used);
        }

        Ok(())
    }
}

impl std::fmt::Debug for Strand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Strand")
            .field("id", &self.id)
            .field("length", &state.in_use.byte_length())
            .field("capacity", &state.capacity.byte_length())
            .field("knots", &state.knots.len())
            .field("position", &self.position())
            .finish()
    }
}

// =============================================================================
// std::io Adapters
// =============================================================================

impl Read for &Strand<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Strand::read(*self, buf)?)
    }
}

impl Write for &Strand<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Strand::write(*self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for &Strand<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(Strand::seek(*self, pos))
    }
}

impl Read for Strand<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Strand::read(self, buf)?)
    }
}

impl Write for Strand<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Strand::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Strand<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(Strand::seek(self, pos))
    }
}
