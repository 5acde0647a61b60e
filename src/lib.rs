//! # braid
//!
//! A single-file container that multiplexes many independent, growable,
//! randomly addressable byte streams ("strands") onto one backing medium:
//! - Reusable fixed-size extents ("knots") with in-place header rewrites
//! - Disjoint physical ranges composed into one logical address space
//! - Concurrent strand access under a two-level lock hierarchy
//! - One serialized I/O worker that preserves per-caller ordering
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Callers (many threads)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │        Braid (knot index, strand directory, RwLock)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Strand    │          │   Records   │
//!   │   (Seams)   │          │  (Headers)  │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          └───────────┬────────────┘
//!                      ▼
//!              ┌───────────────┐
//!              │ StreamEngine  │
//!              │ (I/O worker)  │
//!              └───────┬───────┘
//!                      ▼
//!              ┌───────────────┐
//!              │    Medium     │
//!              └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod medium;
pub mod range;
pub mod record;
pub mod stream;
pub mod braid;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BraidError, Result, StitchErrorReason};
pub use config::{AllocationPolicy, Config};
pub use medium::{Medium, MemoryMedium};
pub use range::{Seam, Stitch};
pub use record::{BraidHeader, Encodable, EncodedValue, KnotHeader};
pub use stream::{IoTask, StreamEngine, StreamHandle, TaskOutput};
pub use braid::{Braid, Strand, MAX_KNOT_SIZE, MIN_KNOT_SIZE};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of braid
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
