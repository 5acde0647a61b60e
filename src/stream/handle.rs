//! Stream Handle
//!
//! A per-caller builder that chains tasks and queues them on the engine.

use std::collections::VecDeque;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

use crate::error::{BraidError, Result};
use crate::record::EncodedValue;

use super::engine::StreamEngine;
use super::task::{IoTask, TaskAction, TaskCore, TaskOutput};

/// One caller's chain of queued I/O tasks
///
/// Every submission returns immediately with an `IoTask`. Tasks that do not
/// seek start where the previous task of this handle ended (a handle's
/// first task starts at 0). Finishing or dropping the handle waits for all
/// of its tasks; failures nobody observed are returned by `finish` and
/// logged by `Drop`.
pub struct StreamHandle<'e> {
    engine: &'e StreamEngine,
    last: Option<Arc<TaskCore>>,
    pending: VecDeque<IoTask>,
}

impl<'e> StreamHandle<'e> {
    pub(crate) fn new(engine: &'e StreamEngine) -> Self {
        Self {
            engine,
            last: None,
            pending: VecDeque::new(),
        }
    }

    // =========================================================================
    // Submission
    // =========================================================================

    pub fn seek(&mut self, position: SeekFrom) -> Result<IoTask> {
        self.submit(position, TaskAction::Seek)
    }

    /// Read up to `count` bytes; fewer come back when the medium ends
    pub fn read(&mut self, count: usize) -> Result<IoTask> {
        self.submit(SeekFrom::Current(0), TaskAction::Read(count))
    }

    pub fn write(&mut self, buffer: &[u8]) -> Result<IoTask> {
        self.write_bytes(Bytes::copy_from_slice(buffer))
    }

    pub fn write_bytes(&mut self, buffer: Bytes) -> Result<IoTask> {
        self.submit(SeekFrom::Current(0), TaskAction::Write(buffer))
    }

    /// Write one framed value
    pub fn encode(&mut self, value: EncodedValue) -> Result<IoTask> {
        self.submit(SeekFrom::Current(0), TaskAction::Encode(value))
    }

    /// Read one framed value
    pub fn decode(&mut self) -> Result<IoTask> {
        self.submit(SeekFrom::Current(0), TaskAction::Decode)
    }

    pub fn get_stream_length(&mut self) -> Result<IoTask> {
        self.submit(SeekFrom::Current(0), TaskAction::GetLength)
    }

    pub fn set_stream_length(&mut self, length: u64) -> Result<IoTask> {
        self.submit(SeekFrom::Current(0), TaskAction::SetLength(length))
    }

    fn submit(&mut self, start: SeekFrom, action: TaskAction) -> Result<IoTask> {
        // Tasks whose outcome a waiter already took need no further tracking
        while self.pending.front().is_some_and(IoTask::is_observed) {
            self.pending.pop_front();
        }

        let task = IoTask::new(self.engine.next_seq(), start, action, self.last.clone());
        self.engine.enqueue(task.clone())?;

        self.last = Some(Arc::clone(&task.core));
        self.pending.push_back(task.clone());

        Ok(task)
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Tasks submitted through this handle that may still be outstanding
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wait for the oldest outstanding task and take its outcome
    pub fn wait_next(&mut self) -> Option<Result<TaskOutput>> {
        self.pending.pop_front().map(IoTask::wait)
    }

    /// Like `wait_next`, but gives up after `timeout`.
    ///
    /// Returns `None` when nothing is pending or the oldest task has not
    /// run yet; in the latter case it stays queued.
    pub fn wait_next_timeout(&mut self, timeout: Duration) -> Option<Result<TaskOutput>> {
        if !self.pending.front()?.wait_timeout(timeout) {
            return None;
        }

        self.wait_next()
    }

    /// Wait for every task and return the first unobserved failure
    pub fn finish(mut self) -> Result<()> {
        match self.drain().into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn drain(&mut self) -> Vec<BraidError> {
        self.last = None;
        self.pending
            .drain(..)
            .filter_map(|task| task.take_failure())
            .collect()
    }
}

impl Drop for StreamHandle<'_> {
    fn drop(&mut self) {
        for error in self.drain() {
            warn!(error = %error, "io task failed with nobody waiting");
        }
    }
}

impl std::fmt::Debug for StreamHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("pending", &self.pending.len())
            .finish()
    }
}
