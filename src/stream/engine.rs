//! Stream Engine
//!
//! Owns the backing medium and the single worker thread that executes
//! every queued task against it, strictly in submission order.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{BraidError, Result};
use crate::medium::Medium;

use super::handle::StreamHandle;
use super::task::IoTask;

/// Serialized I/O executor over one medium
///
/// ## Concurrency Model
/// - Any number of threads build `StreamHandle`s and enqueue tasks
/// - Exactly one worker thread touches the medium
/// - The channel is FIFO, so tasks run in enqueue order across all handles
///
/// Closing stops new submissions, lets the worker drain what is already
/// queued, then flushes (and optionally syncs) the medium.
pub struct StreamEngine {
    /// `None` once closed; the write lock orders close against in-flight sends
    sender: RwLock<Option<Sender<IoTask>>>,

    worker: Mutex<Option<JoinHandle<Result<()>>>>,

    next_seq: AtomicU64,

    closed: AtomicBool,
}

impl StreamEngine {
    /// Validate `medium` and start the worker thread
    pub fn start<M: Medium + 'static>(mut medium: M, config: &Config) -> Result<Self> {
        let length = medium.len().map_err(|e| {
            BraidError::InvalidArgument(format!("medium length is not available: {}", e))
        })?;
        let position = medium.stream_position().map_err(|e| {
            BraidError::InvalidArgument(format!("medium position is not available: {}", e))
        })?;

        let (sender, receiver) = channel::unbounded();
        let sync_on_close = config.sync_on_close;

        let worker = thread::Builder::new()
            .name(config.worker_thread_name.clone())
            .spawn(move || run_worker(Box::new(medium), receiver, sync_on_close))?;

        debug!(
            thread = %config.worker_thread_name,
            length,
            position,
            "I/O worker started"
        );

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// A fresh handle with an empty chain
    pub fn handle(&self) -> StreamHandle<'_> {
        StreamHandle::new(self)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting tasks, drain the queue and release the medium.
    ///
    /// Idempotent; only the first call reports worker failures.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Dropping the only sender ends the worker loop once the queue is empty
        self.sender.write().take();

        let worker = self.worker.lock().take();

        match worker {
            Some(worker) => worker
                .join()
                .map_err(|_| BraidError::Internal("I/O worker panicked".to_string()))?,
            None => Ok(()),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn enqueue(&self, task: IoTask) -> Result<()> {
        match self.sender.read().as_ref() {
            Some(sender) => sender.send(task).map_err(|_| BraidError::Closed),
            None => Err(BraidError::Closed),
        }
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "I/O worker did not shut down cleanly");
        }
    }
}

impl std::fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEngine")
            .field("closed", &self.is_closed())
            .field("submitted", &self.next_seq.load(Ordering::Relaxed))
            .finish()
    }
}

// =============================================================================
// Worker Loop
// =============================================================================

fn run_worker(
    mut medium: Box<dyn Medium>,
    receiver: Receiver<IoTask>,
    sync_on_close: bool,
) -> Result<()> {
    let mut executed = 0u64;

    for task in receiver.iter() {
        task.core.execute(medium.as_mut());
        executed += 1;
    }

    medium.flush()?;

    if sync_on_close {
        medium.sync()?;
    }

    debug!(executed, "I/O worker stopped");
    Ok(())
}
