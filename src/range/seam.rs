//! Seam
//!
//! An ordered composition of non-colliding stitches read and written as
//! one logical byte sequence.

use std::io::SeekFrom;
use std::ops::Index;

use crate::error::{BraidError, Result, StitchErrorReason};
use crate::stream::{IoTask, StreamHandle};

use super::Stitch;

/// One logical byte sequence spread over disjoint physical ranges
///
/// ## Invariants
/// - At least one stitch (a zero-length seam holds one empty stitch)
/// - No two stitches collide (checked on build/append)
/// - `byte_length` is the sum of the stitch lengths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seam {
    stitches: Vec<Stitch>,
    byte_length: u64,
}

impl Seam {
    /// A seam over a single stitch
    pub fn new(stitch: Stitch) -> Self {
        Self {
            stitches: vec![stitch],
            byte_length: stitch.length() as u64,
        }
    }

    /// Build a seam, rejecting empty input and colliding stitches
    pub fn build<I>(stitches: I) -> Result<Self>
    where
        I: IntoIterator<Item = Stitch>,
    {
        let stitches: Vec<Stitch> = stitches.into_iter().collect();

        if stitches.is_empty() {
            return Err(BraidError::InvalidArgument(
                "a seam needs at least one stitch".to_string(),
            ));
        }

        check_collisions(&stitches)?;

        Ok(Self::from_parts(stitches))
    }

    /// Trusted constructor for stitch lists derived from an existing seam
    fn from_parts(stitches: Vec<Stitch>) -> Self {
        let byte_length = stitches.iter().map(|s| s.length() as u64).sum();
        Self {
            stitches,
            byte_length,
        }
    }

    /// Append one stitch at the logical end
    pub fn append(&self, stitch: Stitch) -> Result<Seam> {
        if self.stitches.iter().any(|s| s.collides_with(&stitch)) {
            return Err(StitchErrorReason::Collision.into());
        }

        let mut stitches = self.stitches.clone();
        stitches.push(stitch);

        Ok(Self {
            stitches,
            byte_length: self.byte_length + stitch.length() as u64,
        })
    }

    /// Append several stitches at the logical end, in order
    pub fn append_all<I>(&self, stitches: I) -> Result<Seam>
    where
        I: IntoIterator<Item = Stitch>,
    {
        let mut all = self.stitches.clone();
        all.extend(stitches);

        check_collisions(&all)?;

        Ok(Self::from_parts(all))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Physical start of the first stitch
    pub fn start(&self) -> u64 {
        self.stitches[0].start()
    }

    /// Physical end of the last stitch
    pub fn end(&self) -> u64 {
        self.last().end()
    }

    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    pub fn is_empty(&self) -> bool {
        self.byte_length == 0
    }

    /// Number of stitches
    pub fn len(&self) -> usize {
        self.stitches.len()
    }

    pub fn last(&self) -> &Stitch {
        &self.stitches[self.stitches.len() - 1]
    }

    pub fn get(&self, index: usize) -> Option<&Stitch> {
        self.stitches.get(index)
    }

    pub fn stitches(&self) -> &[Stitch] {
        &self.stitches
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stitch> {
        self.stitches.iter()
    }

    // =========================================================================
    // Slicing
    // =========================================================================

    /// Logical sub-range `[offset, byte_length)`
    pub fn slice_to_end(&self, offset: u64) -> Result<Seam> {
        if offset > self.byte_length {
            return Err(StitchErrorReason::OffsetOutOfBounds.into());
        }

        self.slice(offset, self.byte_length - offset)
    }

    /// Logical sub-range `[offset, offset + count)`
    ///
    /// A non-zero offset trims the leading stitches (splitting the one that
    /// holds the offset with `take_end`) and then slices again from zero; a
    /// zero offset keeps whole stitches until the one that holds `count`,
    /// which is cut with `take`. A zero count yields an empty stitch
    /// anchored at the physical position of `offset`.
    pub fn slice(&self, offset: u64, count: u64) -> Result<Seam> {
        if offset > 0 {
            if offset > self.byte_length {
                return Err(StitchErrorReason::OffsetOutOfBounds.into());
            }

            if offset == self.byte_length {
                if count > 0 {
                    return Err(StitchErrorReason::CountTooLong.into());
                }
                return Ok(Seam::new(Stitch::new(self.end(), 0)));
            }

            match offset.checked_add(count) {
                Some(end) if end <= self.byte_length => {}
                _ => return Err(StitchErrorReason::CountTooLong.into()),
            }

            let mut remaining = offset;
            let mut trimmed = Vec::with_capacity(self.stitches.len());
            let mut rest = self.stitches.iter();

            for stitch in rest.by_ref() {
                let length = stitch.length() as u64;

                if remaining < length {
                    trimmed.push(stitch.take_end((length - remaining) as u32)?);
                    break;
                }

                remaining -= length;
            }

            trimmed.extend(rest.copied());

            return Seam::from_parts(trimmed).slice(0, count);
        }

        if count > self.byte_length {
            return Err(StitchErrorReason::CountTooLong.into());
        }

        if count == self.byte_length {
            return Ok(self.clone());
        }

        if count == 0 {
            return Ok(Seam::new(Stitch::new(self.start(), 0)));
        }

        let mut remaining = count;
        let mut kept = Vec::with_capacity(self.stitches.len());

        for stitch in &self.stitches {
            let length = stitch.length() as u64;

            if remaining <= length {
                kept.push(stitch.take(remaining as u32)?);
                break;
            }

            remaining -= length;
            kept.push(*stitch);
        }

        Ok(Seam::from_parts(kept))
    }

    // =========================================================================
    // Physical I/O
    // =========================================================================

    /// Queue one positioned read per stitch, in order
    pub fn submit_reads(&self, handle: &mut StreamHandle<'_>) -> Result<Vec<IoTask>> {
        let mut tasks = Vec::with_capacity(self.stitches.len());

        for stitch in &self.stitches {
            handle.seek(SeekFrom::Start(stitch.start()))?;
            tasks.push(handle.read(stitch.length() as usize)?);
        }

        Ok(tasks)
    }

    /// Read the whole seam.
    ///
    /// Stops early and returns a truncated buffer when a stitch comes back
    /// short (the medium ended inside it).
    pub fn read(&self, handle: &mut StreamHandle<'_>) -> Result<Vec<u8>> {
        let tasks = self.submit_reads(handle)?;
        let mut buffer = Vec::with_capacity(self.byte_length as usize);

        for (stitch, task) in self.stitches.iter().zip(tasks) {
            let bytes = task.wait_bytes()?;
            let short = bytes.len() < stitch.length() as usize;

            buffer.extend_from_slice(&bytes);

            if short {
                break;
            }
        }

        Ok(buffer)
    }

    /// Queue writes distributing `buffer` across the stitches in order.
    ///
    /// Returns the number of bytes placed, which is less than
    /// `buffer.len()` when the seam is too short.
    pub fn write(&self, buffer: &[u8], handle: &mut StreamHandle<'_>) -> Result<usize> {
        let mut written = 0;

        for stitch in &self.stitches {
            if written == buffer.len() {
                break;
            }

            written += stitch.write(&buffer[written..], handle)?;
        }

        Ok(written)
    }
}

impl Index<usize> for Seam {
    type Output = Stitch;

    fn index(&self, index: usize) -> &Stitch {
        &self.stitches[index]
    }
}

impl<'a> IntoIterator for &'a Seam {
    type Item = &'a Stitch;
    type IntoIter = std::slice::Iter<'a, Stitch>;

    fn into_iter(self) -> Self::IntoIter {
        self.stitches.iter()
    }
}

/// Pairwise overlap check; seams stay short so O(n²) is fine
fn check_collisions(stitches: &[Stitch]) -> Result<()> {
    for (i, a) in stitches.iter().enumerate() {
        for b in &stitches[i + 1..] {
            if a.collides_with(b) {
                return Err(StitchErrorReason::Collision.into());
            }
        }
    }

    Ok(())
}
