//! Stream Module
//!
//! The serialized I/O pipeline in front of the backing medium.
//!
//! ## Responsibilities
//! - Queue seek/read/write/encode/decode/length tasks from many threads
//! - Execute them one at a time, in order, on a dedicated worker
//! - Resolve relative positions against each handle's own chain
//! - Hand every caller a waitable (or awaitable) result per task
//!
//! ## Pipeline
//! ```text
//!  thread A: handle ──► [t1]──►[t2]──────────┐
//!                                            ▼
//!  thread B: handle ──►[u1]──►[u2]──► crossbeam channel ──► worker ──► medium
//!                                            ▲
//!  thread C: handle ──►[v1]──────────────────┘
//! ```

mod engine;
mod handle;
mod task;

pub use engine::StreamEngine;
pub use handle::StreamHandle;
pub use task::{IoTask, TaskOutput};
