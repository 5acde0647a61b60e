//! Braid Module
//!
//! The container: many strands multiplexed onto one medium through a
//! reusable pool of knots.
//!
//! ## Responsibilities
//! - Replay the on-disk knot index when opening
//! - Allocate, reuse and append knots
//! - Maintain the strand directory and hand out `Strand` views
//! - Route every header rewrite through the I/O pipeline
//!
//! ## On-Disk Layout
//! ```text
//! ┌──────────────┬──────────────┬───────────────┬──────────────┬─────────
//! │ BraidHeader  │ KnotHeader 0 │ extent 0      │ KnotHeader 1 │ extent 1 ...
//! │ (13 bytes)   │ (30 bytes)   │ (4K..32K)     │ (30 bytes)   │
//! └──────────────┴──────────────┴───────────────┴──────────────┴─────────
//! ```
//!
//! ## Locking
//! The knot index sits behind one `RwLock`. Strand growth takes an
//! upgradable read to scan for a free knot and upgrades only to claim it.
//! Strand payload I/O holds a read lock for the whole transfer.
//! Locks are always taken strand first, index second.

mod allocator;
mod iter;
mod strand;

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Read, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{BraidError, Result};
use crate::medium::Medium;
use crate::range::Stitch;
use crate::record::{BraidHeader, Encodable, KnotHeader};
use crate::stream::{StreamEngine, StreamHandle};

pub use allocator::{clamp_knot_size, for_policy, BestFit, KnotAllocator, RatioFit};
pub use iter::StrandIter;
pub use strand::Strand;

use strand::StrandState;

/// Smallest extent a knot is given (4 KB)
pub const MIN_KNOT_SIZE: u32 = 4 * 1024;

/// Largest extent a knot is given (32 KB)
pub const MAX_KNOT_SIZE: u32 = 32 * 1024;

/// A knot as seen by one strand: its index slot and a header copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KnotSlot {
    pub(crate) slot: usize,
    pub(crate) header: KnotHeader,
}

/// In-memory mirror of everything on the medium except payload bytes
#[derive(Debug, Default)]
struct BraidIndex {
    header: BraidHeader,

    /// Every knot in medium order; a knot's slot never changes
    knots: Vec<KnotHeader>,

    /// Live strand ids in first-seen order
    strands: Vec<u32>,

    /// State shared by the open views of each strand
    views: HashMap<u32, Weak<RwLock<StrandState>>>,
}

impl BraidIndex {
    fn has_strand(&self, id: u32) -> bool {
        self.strands.contains(&id)
    }

    /// Knots owned by `id`, ordered by ordinal
    fn knots_of(&self, id: u32) -> Vec<KnotSlot> {
        let mut owned: Vec<KnotSlot> = self
            .knots
            .iter()
            .enumerate()
            .filter(|(_, k)| k.is_owned_by(id))
            .map(|(slot, header)| KnotSlot {
                slot,
                header: *header,
            })
            .collect();

        owned.sort_by_key(|k| k.header.ordinal);
        owned
    }

    /// The state every view of `id` shares, built from the index if no view
    /// is open
    fn shared_state(&mut self, id: u32) -> Result<Arc<RwLock<StrandState>>> {
        if let Some(state) = self.views.get(&id).and_then(Weak::upgrade) {
            return Ok(state);
        }

        let knots = self.knots_of(id);
        if knots.is_empty() {
            return Err(BraidError::UnknownStrand(id));
        }

        let state = Arc::new(RwLock::new(StrandState::build(knots)?));
        self.views.insert(id, Arc::downgrade(&state));
        Ok(state)
    }
}

/// A strand container over one medium
///
/// ## Lifecycle
/// - `open`/`with_medium` replays the index (or initializes an empty medium)
/// - strands are created, fetched and destroyed by id
/// - `close` (or drop) drains the I/O queue and releases the medium
pub struct Braid {
    config: Config,
    engine: StreamEngine,
    index: RwLock<BraidIndex>,
    allocator: Box<dyn KnotAllocator>,
}

impl Braid {
    // =========================================================================
    // Opening
    // =========================================================================

    /// Open (or create) the braid file named by `config.path`
    pub fn open(config: Config) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(config.create_if_missing)
            .truncate(false)
            .open(&config.path)?;

        Self::with_medium(file, config)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified file
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().path(path.as_ref()).build())
    }

    /// Open a braid stored on an arbitrary medium.
    ///
    /// An empty medium is initialized with a fresh header. Anything that does
    /// not replay cleanly as a braid is `NotValid`.
    pub fn with_medium<M: Medium + 'static>(medium: M, config: Config) -> Result<Self> {
        let engine = StreamEngine::start(medium, &config)?;
        let index = replay(&engine)?;

        info!(
            knots = index.knots.len(),
            strands = index.strands.len(),
            last_strand_id = index.header.last_strand_id,
            "braid opened"
        );

        Ok(Self {
            allocator: allocator::for_policy(config.allocation_policy),
            config,
            engine,
            index: RwLock::new(index),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Strand Lifecycle
    // =========================================================================

    /// A new view of an existing strand, positioned at 0
    pub fn get_strand(&self, id: u32) -> Result<Strand<'_>> {
        if id == 0 {
            return Err(BraidError::InvalidStrandId);
        }

        self.ensure_open()?;

        let state = {
            let mut index = self.index.write();
            if !index.has_strand(id) {
                return Err(BraidError::UnknownStrand(id));
            }
            index.shared_state(id)?
        };

        Ok(Strand::new(self, id, state))
    }

    /// A new, empty strand with the minimum capacity
    pub fn create_strand(&self) -> Result<Strand<'_>> {
        self.allocate_strand(MIN_KNOT_SIZE as u64)
    }

    /// A new strand holding everything `reader` yields.
    ///
    /// The first knot is sized to the first chunk read; the strand is left
    /// positioned at the end of the data.
    pub fn create_strand_from<R: Read>(&self, mut reader: R) -> Result<Strand<'_>> {
        let mut chunk = vec![0u8; MAX_KNOT_SIZE as usize];

        let first = read_chunk(&mut reader, &mut chunk)?;
        if first == 0 {
            return Err(BraidError::InvalidArgument(
                "no initial bytes to store".to_string(),
            ));
        }

        let strand = self.allocate_strand(first as u64)?;
        strand.write(&chunk[..first])?;

        loop {
            let n = read_chunk(&mut reader, &mut chunk)?;
            if n == 0 {
                break;
            }
            strand.write(&chunk[..n])?;
        }

        Ok(strand)
    }

    /// A new strand sized for and holding one encoded value, positioned at 0
    pub fn create_strand_with<T: Encodable>(&self, value: &T) -> Result<Strand<'_>> {
        let encoded = value.encode()?;

        let strand = self.allocate_strand(encoded.encoded_len())?;
        strand.write(&encoded.to_bytes())?;
        strand.seek(SeekFrom::Start(0));

        Ok(strand)
    }

    /// Free every knot of `id` and forget the id
    pub fn destroy_strand(&self, id: u32) -> Result<()> {
        if id == 0 {
            return Err(BraidError::InvalidStrandId);
        }

        self.ensure_open()?;

        let mut handle = self.engine.handle();
        let released = {
            let mut index = self.index.write();

            let position = index
                .strands
                .iter()
                .position(|s| *s == id)
                .ok_or(BraidError::UnknownStrand(id))?;

            let mut released = 0;
            for knot in index.knots.iter_mut().filter(|k| k.is_owned_by(id)) {
                knot.release();
                knot.write_self(&mut handle)?;
                released += 1;
            }

            index.strands.remove(position);
            index.views.remove(&id);
            index.header.write_self(&mut handle)?;
            released
        };

        handle.finish()?;

        debug!(id, released, "strand destroyed");
        Ok(())
    }

    /// Free every knot and forget every strand. The medium never shrinks.
    pub fn clear(&self) -> Result<()> {
        self.ensure_open()?;

        let mut handle = self.engine.handle();
        let released = {
            let mut index = self.index.write();

            let mut released = 0;
            for knot in index.knots.iter_mut().filter(|k| !k.is_free()) {
                knot.release();
                knot.write_self(&mut handle)?;
                released += 1;
            }

            index.strands.clear();
            index.views.clear();
            released
        };

        handle.finish()?;

        debug!(released, "braid cleared");
        Ok(())
    }

    /// Iterate over live strands in directory order
    pub fn strands(&self) -> StrandIter<'_> {
        StrandIter::new(self, self.strand_ids())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn strand_count(&self) -> usize {
        self.index.read().strands.len()
    }

    /// Live strand ids in directory order
    pub fn strand_ids(&self) -> Vec<u32> {
        self.index.read().strands.clone()
    }

    pub fn has_strand(&self, id: u32) -> bool {
        self.index.read().has_strand(id)
    }

    pub fn last_strand_id(&self) -> u32 {
        self.index.read().header.last_strand_id
    }

    pub fn knot_count(&self) -> usize {
        self.index.read().knots.len()
    }

    /// Snapshot of every knot header in medium order
    pub fn knots(&self) -> Vec<KnotHeader> {
        self.index.read().knots.clone()
    }

    /// Current length of the backing medium
    pub fn medium_length(&self) -> Result<u64> {
        self.ensure_open()?;
        let mut handle = self.engine.handle();
        let length = handle.get_stream_length()?.wait_length()?;
        handle.finish()?;
        Ok(length)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Drain queued I/O and release the medium. Later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        if self.engine.is_closed() {
            return Ok(());
        }

        self.engine.close()?;
        info!("braid closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.engine.is_closed() {
            return Err(BraidError::Closed);
        }
        Ok(())
    }

    // =========================================================================
    // Knot Management (crate-internal)
    // =========================================================================

    pub(crate) fn engine(&self) -> &StreamEngine {
        &self.engine
    }

    /// Register a new strand on one knot sized for `desired` bytes
    fn allocate_strand(&self, desired: u64) -> Result<Strand<'_>> {
        self.ensure_open()?;

        let size = clamp_knot_size(desired);
        let mut handle = self.engine.handle();

        let (id, knot, state) = {
            let mut index = self.index.write();

            let slot = match self.allocator.select(&index.knots, size) {
                Some(slot) => slot,
                None => self.append_knot(&mut index, size, &mut handle)?,
            };

            // Only a placed knot consumes an id
            let id = index.header.next_strand_id()?;

            let knot = &mut index.knots[slot];
            knot.claim(id, 0);
            knot.write_self(&mut handle)?;
            let knot = KnotSlot { slot, header: *knot };

            index.header.write_self(&mut handle)?;
            index.strands.push(id);

            let state = index.shared_state(id)?;
            (id, knot, state)
        };

        handle.finish()?;

        debug!(id, slot = knot.slot, length = knot.header.stitch.length(), "strand created");
        Ok(Strand::new(self, id, state))
    }

    /// Claim a free knot for strand growth.
    ///
    /// The scan runs under an upgradable read so concurrent readers of the
    /// index are not blocked; the upgrade makes the claim exclusive.
    pub(crate) fn claim_knot(&self, desired: u64, id: u32, ordinal: u32) -> Result<KnotSlot> {
        self.ensure_open()?;

        let size = clamp_knot_size(desired);
        let mut handle = self.engine.handle();

        let knot = {
            let index = self.index.upgradable_read();

            if !index.has_strand(id) {
                return Err(BraidError::UnknownStrand(id));
            }

            let selected = self.allocator.select(&index.knots, size);
            let mut index = RwLockUpgradableReadGuard::upgrade(index);

            let slot = match selected {
                Some(slot) => slot,
                None => self.append_knot(&mut index, size, &mut handle)?,
            };

            let knot = &mut index.knots[slot];
            knot.claim(id, ordinal);
            knot.write_self(&mut handle)?;

            KnotSlot { slot, header: *knot }
        };

        handle.finish()?;
        Ok(knot)
    }

    /// Append a disused knot of `size` bytes at the end of the medium
    fn append_knot(
        &self,
        index: &mut BraidIndex,
        size: u32,
        handle: &mut StreamHandle<'_>,
    ) -> Result<usize> {
        let header_position = handle.get_stream_length()?.wait_length()?;
        let stitch = Stitch::new(header_position + KnotHeader::encoded_size(), size);
        let knot = KnotHeader::new(stitch);

        index.header.knot_count = index
            .header
            .knot_count
            .checked_add(1)
            .ok_or_else(|| BraidError::Internal("knot count overflow".to_string()))?;
        index.knots.push(knot);

        index.header.write_self(handle)?;
        knot.write_self(handle)?;
        handle.set_stream_length(stitch.end())?;

        let slot = index.knots.len() - 1;
        debug!(slot, start = stitch.start(), length = size, "knot appended");

        Ok(slot)
    }

    /// Hold the index read lock while `id` is live.
    ///
    /// Knots cannot change hands while the guard is held, so strands keep it
    /// across payload I/O.
    fn pin_live(&self, id: u32) -> Result<RwLockReadGuard<'_, BraidIndex>> {
        let index = self.index.read();
        if !index.has_strand(id) {
            return Err(BraidError::UnknownStrand(id));
        }
        Ok(index)
    }

    /// Return knots `slots` of strand `id` to the free list
    pub(crate) fn release_knots(&self, id: u32, slots: &[usize]) -> Result<()> {
        let mut handle = self.engine.handle();

        {
            let mut index = self.index.write();
            check_ownership(&index, id, slots.iter().copied())?;

            for &slot in slots {
                let knot = &mut index.knots[slot];
                knot.release();
                knot.write_self(&mut handle)?;
            }
        }

        handle.finish()
    }

    /// Persist new used-byte counts for knots of strand `id`
    pub(crate) fn update_used_bytes(&self, id: u32, updates: &[(usize, u32)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut handle = self.engine.handle();

        {
            let mut index = self.index.write();
            check_ownership(&index, id, updates.iter().map(|(slot, _)| *slot))?;

            for &(slot, used) in updates {
                let knot = &mut index.knots[slot];
                knot.set_used_bytes(used);
                knot.write_self(&mut handle)?;
            }
        }

        handle.finish()
    }
}

impl Drop for Braid {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "braid did not close cleanly");
        }
    }
}

impl std::fmt::Debug for Braid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.index.read();
        f.debug_struct("Braid")
            .field("knots", &index.knots.len())
            .field("strands", &index.strands.len())
            .field("allocator", &self.allocator.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<'b> IntoIterator for &'b Braid {
    type Item = Result<Strand<'b>>;
    type IntoIter = StrandIter<'b>;

    fn into_iter(self) -> Self::IntoIter {
        self.strands()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn check_ownership<I>(index: &BraidIndex, id: u32, slots: I) -> Result<()>
where
    I: IntoIterator<Item = usize>,
{
    if !index.has_strand(id) {
        return Err(BraidError::UnknownStrand(id));
    }

    for slot in slots {
        match index.knots.get(slot) {
            Some(knot) if knot.is_owned_by(id) => {}
            _ => return Err(BraidError::UnknownStrand(id)),
        }
    }

    Ok(())
}

/// Fill `buf` as far as the reader allows
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(filled)
}

/// Decode one fixed-size record at `position`
fn read_record<T: Encodable>(
    handle: &mut StreamHandle<'_>,
    position: u64,
    expected_size: u64,
) -> Result<T> {
    handle.seek(SeekFrom::Start(position))?;
    let value = handle.decode()?.wait_value()?;

    if value.encoded_len() != expected_size {
        return Err(BraidError::HeaderSizeChanged {
            expected: expected_size,
            actual: value.encoded_len(),
        });
    }

    value.decode()
}

fn not_valid(what: &str, err: impl std::fmt::Display) -> BraidError {
    BraidError::NotValid(format!("{}: {}", what, err))
}

/// Rebuild the index from the medium, initializing an empty one
fn replay(engine: &StreamEngine) -> Result<BraidIndex> {
    let mut handle = engine.handle();
    let length = handle.get_stream_length()?.wait_length()?;

    if length == 0 {
        let index = BraidIndex::default();
        index.header.write_self(&mut handle)?;
        handle.finish()?;

        debug!("initialized empty medium");
        return Ok(index);
    }

    let mut header: BraidHeader =
        read_record(&mut handle, BraidHeader::POSITION, BraidHeader::encoded_size())
            .map_err(|e| not_valid("unreadable braid header", e))?;

    // The recorded count is only a hint; it may be corrupt
    let mut knots = Vec::with_capacity((header.knot_count as usize).min(1024));
    let mut position = BraidHeader::encoded_size();

    while position < length {
        let mut knot: KnotHeader = read_record(&mut handle, position, KnotHeader::encoded_size())
            .map_err(|e| not_valid(&format!("unreadable knot header at {}", position), e))?;

        let expected_start = position + KnotHeader::encoded_size();
        if knot.stitch.start() != expected_start {
            return Err(BraidError::NotValid(format!(
                "knot header at {} points at {}, expected {}",
                position,
                knot.stitch.start(),
                expected_start
            )));
        }

        if knot.stitch.end() > length {
            return Err(BraidError::NotValid(format!(
                "knot at {} runs past the end of the medium ({} > {})",
                position,
                knot.stitch.end(),
                length
            )));
        }

        if knot.used_bytes > knot.stitch.length() {
            return Err(BraidError::NotValid(format!(
                "knot at {} claims {} used bytes of {}",
                position,
                knot.used_bytes,
                knot.stitch.length()
            )));
        }

        if !knot.is_free() && knot.strand_id == 0 {
            warn!(position, "knot in use without an owner; returning it to the free list");
            knot.release();
            knot.write_self(&mut handle)?;
        }

        knots.push(knot);
        position = knot.stitch.end();
    }

    handle.finish()?;

    if header.knot_count as usize != knots.len() {
        warn!(
            recorded = header.knot_count,
            found = knots.len(),
            "braid header knot count disagrees with the medium"
        );
        header.knot_count = knots.len() as u32;
    }

    let mut strands = Vec::new();
    for knot in knots.iter().filter(|k| !k.is_free()) {
        if !strands.contains(&knot.strand_id) {
            strands.push(knot.strand_id);
        }
    }

    if let Some(&highest) = strands.iter().max() {
        if highest > header.last_strand_id {
            warn!(
                recorded = header.last_strand_id,
                highest,
                "braid header is behind the strands on the medium"
            );
            header.last_strand_id = highest;
        }
    }

    Ok(BraidIndex {
        header,
        knots,
        strands,
        views: HashMap::new(),
    })
}
