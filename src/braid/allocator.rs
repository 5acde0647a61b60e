//! Free-Knot Allocation
//!
//! Policies that pick a disused knot for reuse.

use std::fmt;

use crate::config::AllocationPolicy;
use crate::record::KnotHeader;

use super::{MAX_KNOT_SIZE, MIN_KNOT_SIZE};

/// Clamp a requested size into `[MIN_KNOT_SIZE, MAX_KNOT_SIZE]`
pub fn clamp_knot_size(desired: u64) -> u32 {
    desired.clamp(MIN_KNOT_SIZE as u64, MAX_KNOT_SIZE as u64) as u32
}

/// Chooses which disused knot (if any) satisfies a request
///
/// `desired` is already clamped. Returning `None` makes the braid append a
/// new knot of exactly `desired` bytes.
pub trait KnotAllocator: Send + Sync + fmt::Debug {
    /// Slot of the knot to claim
    fn select(&self, knots: &[KnotHeader], desired: u32) -> Option<usize>;

    fn name(&self) -> &'static str;
}

/// Build the allocator for a configured policy
pub fn for_policy(policy: AllocationPolicy) -> Box<dyn KnotAllocator> {
    match policy {
        AllocationPolicy::RatioFit => Box::new(RatioFit),
        AllocationPolicy::BestFit => Box::new(BestFit),
    }
}

// =============================================================================
// Ratio Fit
// =============================================================================

/// First disused knot inside the size window
///
/// A knot is taken when it is larger than the request but not by more than
/// 5:3, or when it is more than 60% of the request. The second clause
/// accepts knots smaller than the request; strand growth keeps claiming
/// until capacity is reached. Reuse order on existing files follows this
/// exact expression, so keep it as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatioFit;

impl RatioFit {
    pub fn accepts(length: u32, desired: u32) -> bool {
        let length = length as f64;
        let desired = desired as f64;

        (length > desired && desired > length * 0.6) || desired * 0.6 < length
    }
}

impl KnotAllocator for RatioFit {
    fn select(&self, knots: &[KnotHeader], desired: u32) -> Option<usize> {
        knots
            .iter()
            .position(|k| k.is_free() && Self::accepts(k.stitch.length(), desired))
    }

    fn name(&self) -> &'static str {
        "ratio-fit"
    }
}

// =============================================================================
// Best Fit
// =============================================================================

/// Smallest disused knot that holds the whole request without wasting more
/// than the request again
#[derive(Debug, Clone, Copy, Default)]
pub struct BestFit;

impl KnotAllocator for BestFit {
    fn select(&self, knots: &[KnotHeader], desired: u32) -> Option<usize> {
        let ceiling = desired as u64 * 2;

        knots
            .iter()
            .enumerate()
            .filter(|(_, k)| k.is_free())
            .filter(|(_, k)| {
                let length = k.stitch.length() as u64;
                length >= desired as u64 && length <= ceiling
            })
            .min_by_key(|(slot, k)| (k.stitch.length(), *slot))
            .map(|(slot, _)| slot)
    }

    fn name(&self) -> &'static str {
        "best-fit"
    }
}
