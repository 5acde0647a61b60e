//! Range Module
//!
//! Range arithmetic over the backing medium.
//!
//! ## Responsibilities
//! - Describe one contiguous physical range (`Stitch`)
//! - Compose disjoint ranges into one logical byte sequence (`Seam`)
//! - Slice logical ranges without leaking cross-range offsets to callers
//! - Fan physical I/O out per stitch through a `StreamHandle`
//!
//! ## Logical vs Physical
//! ```text
//!  physical:  ....[ A A A A ]......[ B B ]....[ C C C ]....
//!                   stitch 0        stitch 1   stitch 2
//!
//!  logical:   [ A A A A B B C C C ]
//!              0              byte_length
//!
//!  slice(3, 4) -> [ A ][ B B ][ C ]   (tail of 0, all of 1, head of 2)
//! ```

mod seam;
mod stitch;

pub use seam::Seam;
pub use stitch::Stitch;
