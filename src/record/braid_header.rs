//! Braid Header
//!
//! The record at offset 0 of every braid.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{BraidError, Result};
use crate::stream::{IoTask, StreamHandle};

use super::{fixed_size, rewrite_in_place, Encodable};

/// Braid-wide metadata
///
/// Rewritten in place at offset 0 whenever a knot is appended or a strand is
/// created or destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BraidHeader {
    /// Number of knots on the medium
    pub knot_count: u32,

    /// Highest strand id handed out so far (0 = none)
    pub last_strand_id: u32,
}

impl Encodable for BraidHeader {
    const TAG: u8 = 0xB1;
}

impl BraidHeader {
    /// Offset of the braid header on the medium
    pub const POSITION: u64 = 0;

    /// Encoded size of every braid header, frame included
    pub fn encoded_size() -> u64 {
        static SIZE: OnceLock<u64> = OnceLock::new();
        *SIZE.get_or_init(fixed_size::<BraidHeader>)
    }

    /// Advance `last_strand_id` and return the new id
    pub fn next_strand_id(&mut self) -> Result<u32> {
        let id = self
            .last_strand_id
            .checked_add(1)
            .ok_or_else(|| BraidError::Internal("strand id space exhausted".to_string()))?;

        self.last_strand_id = id;
        Ok(id)
    }

    /// Queue a rewrite of this header at offset 0
    pub fn write_self(&self, handle: &mut StreamHandle<'_>) -> Result<IoTask> {
        rewrite_in_place(self, Self::POSITION, Self::encoded_size(), handle)
    }
}
