//! Knot Header
//!
//! The record written immediately before every knot's payload extent.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{BraidError, Result};
use crate::range::Stitch;
use crate::stream::{IoTask, StreamHandle};

use super::{fixed_size, rewrite_in_place, Encodable};

/// Metadata for one knot
///
/// The stitch never changes after the knot is appended; only ownership and
/// the used-byte count are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KnotHeader {
    /// Payload extent
    pub stitch: Stitch,

    /// Free for reuse
    pub disused: bool,

    /// Bytes of the extent holding strand data (<= stitch length)
    pub used_bytes: u32,

    /// Owning strand (0 = free)
    pub strand_id: u32,

    /// Position of this knot within its strand
    pub ordinal: u32,
}

impl Encodable for KnotHeader {
    const TAG: u8 = 0xB2;
}

impl KnotHeader {
    /// A fresh, disused knot over `stitch`
    pub fn new(stitch: Stitch) -> Self {
        Self {
            stitch,
            disused: true,
            used_bytes: 0,
            strand_id: 0,
            ordinal: 0,
        }
    }

    /// Encoded size of every knot header, frame included
    pub fn encoded_size() -> u64 {
        static SIZE: OnceLock<u64> = OnceLock::new();
        *SIZE.get_or_init(fixed_size::<KnotHeader>)
    }

    pub fn is_free(&self) -> bool {
        self.disused
    }

    pub fn is_owned_by(&self, strand_id: u32) -> bool {
        !self.disused && self.strand_id == strand_id
    }

    /// Hand the knot to `strand_id` at `ordinal`
    pub fn claim(&mut self, strand_id: u32, ordinal: u32) {
        self.disused = false;
        self.strand_id = strand_id;
        self.ordinal = ordinal;
        self.used_bytes = 0;
    }

    /// Return the knot to the free list
    pub fn release(&mut self) {
        self.disused = true;
        self.strand_id = 0;
        self.ordinal = 0;
        self.used_bytes = 0;
    }

    /// Set the used-byte count, clamped to the extent
    pub fn set_used_bytes(&mut self, used: u32) {
        self.used_bytes = used.min(self.stitch.length());
    }

    /// Offset of this header on the medium
    pub fn header_position(&self) -> Result<u64> {
        self.stitch
            .start()
            .checked_sub(Self::encoded_size())
            .ok_or_else(|| {
                BraidError::Internal(format!(
                    "knot at {} leaves no room for its header",
                    self.stitch.start()
                ))
            })
    }

    /// Queue a rewrite of this header in front of its extent
    pub fn write_self(&self, handle: &mut StreamHandle<'_>) -> Result<IoTask> {
        rewrite_in_place(self, self.header_position()?, Self::encoded_size(), handle)
    }
}
