//! Strand iteration over a braid's directory

use std::collections::VecDeque;

use crate::error::{BraidError, Result};

use super::{Braid, Strand};

/// Yields a view of every strand that was live when iteration started.
///
/// Strands destroyed mid-iteration are skipped.
#[derive(Debug)]
pub struct StrandIter<'b> {
    braid: &'b Braid,
    ids: VecDeque<u32>,
}

impl<'b> StrandIter<'b> {
    pub(crate) fn new(braid: &'b Braid, ids: Vec<u32>) -> Self {
        Self {
            braid,
            ids: ids.into(),
        }
    }
}

impl<'b> Iterator for StrandIter<'b> {
    type Item = Result<Strand<'b>>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.ids.pop_front() {
            match self.braid.get_strand(id) {
                Err(BraidError::UnknownStrand(_)) => continue,
                other => return Some(other),
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}
