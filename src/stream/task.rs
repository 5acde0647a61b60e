//! I/O Tasks
//!
//! One queued operation against the backing medium, plus the completion
//! signal its submitter waits on.
//!
//! ## Position Chaining
//! ```text
//!  handle:  [seek Start(100)] -> [write 10] -> [seek Current(-4)] -> [read 4]
//!  start:        100             prev.end=110      110 - 4 = 106       106
//!  end:          100               110              106                110
//! ```
//!
//! A task that starts at `SeekFrom::Current` is resolved against the end
//! position its predecessor *recorded*, never against the live cursor of
//! the medium. Tasks from other handles may run in between and move the
//! cursor anywhere.

use std::future::Future;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{BraidError, Result};
use crate::medium::Medium;
use crate::record::{Encodable, EncodedValue};

/// What a task does once it is positioned
#[derive(Debug)]
pub(crate) enum TaskAction {
    Seek,
    Read(usize),
    Write(Bytes),
    Encode(EncodedValue),
    Decode,
    GetLength,
    SetLength(u64),
}

impl TaskAction {
    fn name(&self) -> &'static str {
        match self {
            TaskAction::Seek => "seek",
            TaskAction::Read(_) => "read",
            TaskAction::Write(_) => "write",
            TaskAction::Encode(_) => "encode",
            TaskAction::Decode => "decode",
            TaskAction::GetLength => "get-length",
            TaskAction::SetLength(_) => "set-length",
        }
    }
}

/// Result of a successfully executed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    /// Seek, write, encode and set-length
    Unit,

    /// Bytes read (shorter than requested when the medium ended)
    Bytes(Vec<u8>),

    /// A decoded frame
    Value(EncodedValue),

    /// Medium length
    Length(u64),
}

impl TaskOutput {
    pub fn name(&self) -> &'static str {
        match self {
            TaskOutput::Unit => "unit",
            TaskOutput::Bytes(_) => "bytes",
            TaskOutput::Value(_) => "value",
            TaskOutput::Length(_) => "length",
        }
    }
}

// =============================================================================
// Shared Task State
// =============================================================================

#[derive(Default)]
struct Completion {
    done: bool,

    /// `None` once done means a waiter already took the outcome
    outcome: Option<Result<TaskOutput>>,

    waker: Option<Waker>,
}

pub(crate) struct TaskCore {
    seq: u64,
    start: SeekFrom,
    action: TaskAction,

    /// Predecessor on the same handle; cleared once this task has run
    previous: Mutex<Option<Arc<TaskCore>>>,

    /// Absolute medium position after execution
    end: Mutex<Option<u64>>,

    completion: Mutex<Completion>,
    signal: Condvar,
}

impl TaskCore {
    /// Run against the medium. Only the I/O worker calls this.
    pub(crate) fn execute(&self, medium: &mut dyn Medium) {
        let result = self.perform(medium);

        // Recorded even on failure so successors can still chain.
        let end = medium.stream_position().ok();
        *self.end.lock() = end;
        self.previous.lock().take();

        trace!(
            seq = self.seq,
            action = self.action.name(),
            start = ?self.start,
            end = ?end,
            ok = result.is_ok(),
            "io task executed"
        );

        self.complete(result);
    }

    fn perform(&self, medium: &mut dyn Medium) -> Result<TaskOutput> {
        let position = self.resolve_start(medium)?;
        medium.seek(SeekFrom::Start(position))?;

        match &self.action {
            TaskAction::Seek => Ok(TaskOutput::Unit),
            TaskAction::Read(count) => read_up_to(medium, *count).map(TaskOutput::Bytes),
            TaskAction::Write(bytes) => {
                medium.write_all(bytes)?;
                Ok(TaskOutput::Unit)
            }
            TaskAction::Encode(value) => {
                value.write_to(medium)?;
                Ok(TaskOutput::Unit)
            }
            TaskAction::Decode => EncodedValue::read_from(medium).map(TaskOutput::Value),
            TaskAction::GetLength => Ok(TaskOutput::Length(medium.len()?)),
            TaskAction::SetLength(length) => {
                medium.set_len(*length)?;
                Ok(TaskOutput::Unit)
            }
        }
    }

    /// Absolute offset this task starts at
    fn resolve_start(&self, medium: &mut dyn Medium) -> Result<u64> {
        match self.start {
            SeekFrom::Start(offset) => Ok(offset),
            SeekFrom::Current(delta) => {
                let base = match self.previous.lock().as_ref() {
                    None => 0,
                    Some(previous) => previous.end.lock().ok_or_else(|| {
                        BraidError::Internal(format!(
                            "task {} has no recorded end position",
                            previous.seq
                        ))
                    })?,
                };
                offset_from(base, delta)
            }
            SeekFrom::End(delta) => offset_from(medium.len()?, delta),
        }
    }

    fn complete(&self, result: Result<TaskOutput>) {
        let waker = {
            let mut completion = self.completion.lock();
            completion.done = true;
            completion.outcome = Some(result);
            completion.waker.take()
        };

        self.signal.notify_all();

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

fn offset_from(base: u64, delta: i64) -> Result<u64> {
    let target = base as i128 + delta as i128;

    if target < 0 || target > u64::MAX as i128 {
        return Err(BraidError::InvalidArgument(format!(
            "position {} + {} is outside the medium",
            base, delta
        )));
    }

    Ok(target as u64)
}

/// Read until `count` bytes arrive or the medium ends
fn read_up_to(medium: &mut dyn Medium, count: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; count];
    let mut filled = 0;

    while filled < count {
        match medium.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if filled == 0 && count > 0 {
        return Err(BraidError::EndOfMedium);
    }

    buffer.truncate(filled);
    Ok(buffer)
}

// =============================================================================
// Public Task Handle
// =============================================================================

/// A queued operation whose outcome can be awaited
///
/// Waiting consumes the outcome: only the first waiter sees it. Failures
/// nobody waited for are reported by the owning `StreamHandle` when it
/// finishes or drops.
#[derive(Clone)]
pub struct IoTask {
    pub(crate) core: Arc<TaskCore>,
}

impl IoTask {
    pub(crate) fn new(
        seq: u64,
        start: SeekFrom,
        action: TaskAction,
        previous: Option<Arc<TaskCore>>,
    ) -> Self {
        Self {
            core: Arc::new(TaskCore {
                seq,
                start,
                action,
                previous: Mutex::new(previous),
                end: Mutex::new(None),
                completion: Mutex::new(Completion::default()),
                signal: Condvar::new(),
            }),
        }
    }

    /// Submission sequence number, unique per engine
    pub fn seq(&self) -> u64 {
        self.core.seq
    }

    pub fn is_complete(&self) -> bool {
        self.core.completion.lock().done
    }

    /// Absolute medium position recorded after execution
    pub fn end_position(&self) -> Option<u64> {
        *self.core.end.lock()
    }

    /// Block until the task has run and take its outcome
    pub fn wait(self) -> Result<TaskOutput> {
        let mut completion = self.core.completion.lock();

        while !completion.done {
            self.core.signal.wait(&mut completion);
        }

        completion.outcome.take().unwrap_or_else(|| {
            Err(BraidError::Internal(format!(
                "outcome of task {} was already taken",
                self.core.seq
            )))
        })
    }

    /// Block for at most `timeout`; `true` when the task has run
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut completion = self.core.completion.lock();

        if !completion.done {
            let _ = self
                .core
                .signal
                .wait_while_for(&mut completion, |c| !c.done, timeout);
        }

        completion.done
    }

    pub fn wait_bytes(self) -> Result<Vec<u8>> {
        match self.wait()? {
            TaskOutput::Bytes(bytes) => Ok(bytes),
            other => Err(wrong_output("bytes", &other)),
        }
    }

    pub fn wait_value(self) -> Result<EncodedValue> {
        match self.wait()? {
            TaskOutput::Value(value) => Ok(value),
            other => Err(wrong_output("value", &other)),
        }
    }

    /// Wait for a decode task and deserialize its frame
    pub fn wait_decoded<T: Encodable>(self) -> Result<T> {
        self.wait_value()?.decode()
    }

    pub fn wait_length(self) -> Result<u64> {
        match self.wait()? {
            TaskOutput::Length(length) => Ok(length),
            other => Err(wrong_output("length", &other)),
        }
    }

    pub fn wait_unit(self) -> Result<()> {
        match self.wait()? {
            TaskOutput::Unit => Ok(()),
            other => Err(wrong_output("unit", &other)),
        }
    }

    /// Block until done and take the failure if nobody has observed it
    pub(crate) fn take_failure(&self) -> Option<BraidError> {
        let mut completion = self.core.completion.lock();

        while !completion.done {
            self.core.signal.wait(&mut completion);
        }

        match completion.outcome.take() {
            Some(Err(e)) => Some(e),
            other => {
                completion.outcome = other;
                None
            }
        }
    }

    /// Done and its outcome already taken by a waiter
    pub(crate) fn is_observed(&self) -> bool {
        let completion = self.core.completion.lock();
        completion.done && completion.outcome.is_none()
    }
}

fn wrong_output(expected: &'static str, actual: &TaskOutput) -> BraidError {
    BraidError::WrongTaskOutput {
        expected,
        actual: actual.name(),
    }
}

impl std::fmt::Debug for IoTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoTask")
            .field("seq", &self.core.seq)
            .field("action", &self.core.action.name())
            .field("start", &self.core.start)
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl Future for IoTask {
    type Output = Result<TaskOutput>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut completion = self.core.completion.lock();

        if !completion.done {
            completion.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        Poll::Ready(completion.outcome.take().unwrap_or_else(|| {
            Err(BraidError::Internal(format!(
                "outcome of task {} was already taken",
                self.core.seq
            )))
        }))
    }
}
