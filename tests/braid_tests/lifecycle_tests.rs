//! Tests for Braid lifecycle
//!
//! These tests verify:
//! - Initializing an empty medium
//! - Creating, fetching and destroying strands
//! - Knot reuse after destroy and clear
//! - Replaying the index on reopen (memory and file)
//! - Rejecting media that are not braids
//! - Behavior after close

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use braid::{
    AllocationPolicy, Braid, BraidError, BraidHeader, Config, Encodable, KnotHeader, Medium,
    MemoryMedium, MIN_KNOT_SIZE,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config() -> Config {
    Config::builder().sync_on_close(false).build()
}

fn open_memory() -> (MemoryMedium, Braid) {
    let medium = MemoryMedium::new();
    let braid = Braid::with_medium(medium.clone(), test_config()).unwrap();
    (medium, braid)
}

fn reopen(medium: &MemoryMedium) -> Braid {
    Braid::with_medium(medium.clone(), test_config()).unwrap()
}

/// Size of one braid header plus one minimum knot
fn one_knot_length() -> u64 {
    BraidHeader::encoded_size() + KnotHeader::encoded_size() + MIN_KNOT_SIZE as u64
}

/// Memory medium whose length queries fail while `broken` is set
#[derive(Debug, Clone, Default)]
struct FlakyMedium {
    inner: MemoryMedium,
    broken: Arc<AtomicBool>,
}

impl Read for FlakyMedium {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for FlakyMedium {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for FlakyMedium {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Medium for FlakyMedium {
    fn len(&mut self) -> io::Result<u64> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "medium unavailable"));
        }
        self.inner.len()
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.inner.set_len(len)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Manifest {
    name: String,
    entries: Vec<u64>,
}

impl Encodable for Manifest {
    const TAG: u8 = 0x40;
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_empty_medium() {
    let (medium, braid) = open_memory();

    assert_eq!(braid.strand_count(), 0);
    assert_eq!(braid.last_strand_id(), 0);
    assert_eq!(braid.knot_count(), 0);
    assert_eq!(braid.medium_length().unwrap(), BraidHeader::encoded_size());

    braid.close().unwrap();
    assert_eq!(medium.size(), BraidHeader::encoded_size());
}

#[test]
fn test_open_path_creates_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("test.braid");

    let braid = Braid::open_path(&path).unwrap();
    braid.create_strand_from(&b"persisted"[..]).unwrap();
    braid.close().unwrap();

    let braid = Braid::open_path(&path).unwrap();
    let mut strand = braid.get_strand(1).unwrap();
    let mut contents = String::new();
    strand.read_to_string(&mut contents).unwrap();

    assert_eq!(contents, "persisted");
}

#[test]
fn test_open_missing_without_create() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .path(temp.path().join("missing.braid"))
        .create_if_missing(false)
        .build();

    assert!(matches!(Braid::open(config), Err(BraidError::Io(_))));
}

#[test]
fn test_open_garbage_is_not_valid() {
    let medium = MemoryMedium::from_bytes(b"definitely not a braid".to_vec());
    assert!(matches!(
        Braid::with_medium(medium, test_config()),
        Err(BraidError::NotValid(_))
    ));
}

#[test]
fn test_open_truncated_knot_is_not_valid() {
    let (medium, braid) = open_memory();
    braid.create_strand().unwrap();
    braid.close().unwrap();

    let mut bytes = medium.snapshot();
    bytes.truncate(bytes.len() - 1);

    assert!(matches!(
        Braid::with_medium(MemoryMedium::from_bytes(bytes), test_config()),
        Err(BraidError::NotValid(_))
    ));
}

#[test]
fn test_open_trailing_bytes_is_not_valid() {
    let (medium, braid) = open_memory();
    braid.create_strand().unwrap();
    braid.close().unwrap();

    let mut bytes = medium.snapshot();
    bytes.extend_from_slice(&[0; 7]);

    assert!(matches!(
        Braid::with_medium(MemoryMedium::from_bytes(bytes), test_config()),
        Err(BraidError::NotValid(_))
    ));
}

#[test]
fn test_knot_count_mismatch_is_tolerated() {
    let (medium, braid) = open_memory();
    braid.create_strand().unwrap();
    braid.close().unwrap();

    // Rewrite the braid header claiming five knots
    let mut bytes = medium.snapshot();
    let header = BraidHeader {
        knot_count: 5,
        last_strand_id: 1,
    };
    let encoded = header.encode().unwrap().to_bytes();
    bytes[..encoded.len()].copy_from_slice(&encoded);

    let braid = Braid::with_medium(MemoryMedium::from_bytes(bytes), test_config()).unwrap();
    assert_eq!(braid.knot_count(), 1);
    assert_eq!(braid.strand_count(), 1);
}

#[test]
fn test_ownerless_knot_returns_to_free_list() {
    let (medium, braid) = open_memory();
    braid.create_strand().unwrap();
    let mut knot = braid.knots()[0];
    braid.close().unwrap();

    // In use, but owned by nobody
    knot.strand_id = 0;
    knot.ordinal = 0;
    assert!(!knot.is_free());

    let mut bytes = medium.snapshot();
    let encoded = knot.encode().unwrap().to_bytes();
    let at = BraidHeader::encoded_size() as usize;
    bytes[at..at + encoded.len()].copy_from_slice(&encoded);

    let medium = MemoryMedium::from_bytes(bytes);
    let braid = reopen(&medium);
    assert_eq!(braid.strand_count(), 0);
    assert!(braid.knots()[0].is_free());
    braid.close().unwrap();

    // The repair was written back
    let braid = reopen(&medium);
    assert!(braid.knots()[0].is_free());

    let length = braid.medium_length().unwrap();
    let strand = braid.create_strand().unwrap();
    assert_eq!(strand.id(), 2);
    assert_eq!(braid.knot_count(), 1);
    assert_eq!(braid.medium_length().unwrap(), length);
}

// =============================================================================
// Strand Lifecycle Tests
// =============================================================================

#[test]
fn test_create_strand() {
    let (_medium, braid) = open_memory();

    let strand = braid.create_strand().unwrap();

    assert_eq!(strand.id(), 1);
    assert_eq!(strand.length(), 0);
    assert_eq!(strand.capacity(), MIN_KNOT_SIZE as u64);
    assert_eq!(braid.strand_ids(), vec![1]);
    assert_eq!(braid.last_strand_id(), 1);
    assert_eq!(braid.knot_count(), 1);
    assert_eq!(braid.medium_length().unwrap(), one_knot_length());
}

#[test]
fn test_create_strand_from_reader() {
    let (_medium, braid) = open_memory();

    let strand = braid.create_strand_from(&b"0123456789"[..]).unwrap();

    assert_eq!(strand.length(), 10);
    assert_eq!(strand.position(), 10);

    strand.seek(SeekFrom::Start(0));
    let mut buf = [0u8; 10];
    assert_eq!(strand.read(&mut buf).unwrap(), 10);
    assert_eq!(&buf, b"0123456789");
}

#[test]
fn test_create_strand_from_empty_reader() {
    let (_medium, braid) = open_memory();

    assert!(matches!(
        braid.create_strand_from(std::io::empty()),
        Err(BraidError::InvalidArgument(_))
    ));
    assert_eq!(braid.strand_count(), 0);
    assert_eq!(braid.last_strand_id(), 0);
}

#[test]
fn test_failed_create_keeps_strand_id() {
    let medium = FlakyMedium::default();
    let braid = Braid::with_medium(medium.clone(), test_config()).unwrap();

    // No free knot, so the create has to measure the medium to append one
    medium.broken.store(true, Ordering::SeqCst);
    assert!(matches!(braid.create_strand(), Err(BraidError::Io(_))));
    assert_eq!(braid.last_strand_id(), 0);
    assert_eq!(braid.strand_count(), 0);
    assert_eq!(braid.knot_count(), 0);

    medium.broken.store(false, Ordering::SeqCst);
    let strand = braid.create_strand().unwrap();
    assert_eq!(strand.id(), 1);
    assert_eq!(braid.last_strand_id(), 1);
}

#[test]
fn test_create_strand_with_value() {
    let (_medium, braid) = open_memory();
    let manifest = Manifest {
        name: "index".to_string(),
        entries: (0..100).collect(),
    };

    let strand = braid.create_strand_with(&manifest).unwrap();

    assert_eq!(strand.position(), 0);
    assert_eq!(strand.length(), manifest.encode().unwrap().encoded_len());
    assert_eq!(strand.read_value::<Manifest>().unwrap(), manifest);
}

#[test]
fn test_get_strand_errors() {
    let (_medium, braid) = open_memory();
    braid.create_strand().unwrap();

    assert!(matches!(braid.get_strand(0), Err(BraidError::InvalidStrandId)));
    assert!(matches!(braid.get_strand(2), Err(BraidError::UnknownStrand(2))));
    assert!(braid.get_strand(1).is_ok());
}

#[test]
fn test_destroy_strand() {
    let (_medium, braid) = open_memory();
    let id = braid.create_strand().unwrap().id();

    braid.destroy_strand(id).unwrap();

    assert_eq!(braid.strand_count(), 0);
    assert!(braid.knots().iter().all(|k| k.is_free()));
    assert!(matches!(braid.get_strand(id), Err(BraidError::UnknownStrand(_))));
    assert!(matches!(braid.destroy_strand(id), Err(BraidError::UnknownStrand(_))));
    assert!(matches!(braid.destroy_strand(0), Err(BraidError::InvalidStrandId)));
}

#[test]
fn test_destroy_then_create_reuses_knot() {
    let (_medium, braid) = open_memory();
    let first = braid.create_strand().unwrap().id();
    let length = braid.medium_length().unwrap();

    braid.destroy_strand(first).unwrap();
    let second = braid.create_strand().unwrap();

    assert_eq!(second.id(), 2);
    assert_eq!(braid.knot_count(), 1);
    assert_eq!(braid.medium_length().unwrap(), length);
}

#[test]
fn test_clear() {
    let (_medium, braid) = open_memory();
    for _ in 0..3 {
        braid.create_strand().unwrap();
    }
    let length = braid.medium_length().unwrap();

    braid.clear().unwrap();

    assert_eq!(braid.strand_count(), 0);
    assert_eq!(braid.knot_count(), 3);
    assert!(braid.knots().iter().all(|k| k.is_free() && k.strand_id == 0));
    assert_eq!(braid.medium_length().unwrap(), length);
    assert_eq!(braid.last_strand_id(), 3);
}

#[test]
fn test_strand_iteration() {
    let (_medium, braid) = open_memory();
    for _ in 0..4 {
        braid.create_strand().unwrap();
    }
    braid.destroy_strand(2).unwrap();

    let ids: Vec<u32> = braid.strands().map(|s| s.unwrap().id()).collect();
    assert_eq!(ids, vec![1, 3, 4]);

    let mut count = 0;
    for strand in &braid {
        assert!(strand.is_ok());
        count += 1;
    }
    assert_eq!(count, 3);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_replays_index() {
    let (medium, braid) = open_memory();
    braid.create_strand_from(&b"alpha"[..]).unwrap();
    braid.create_strand_from(&b"beta"[..]).unwrap();
    braid.create_strand().unwrap();
    braid.destroy_strand(2).unwrap();
    braid.close().unwrap();

    let braid = reopen(&medium);

    assert_eq!(braid.strand_ids(), vec![1, 3]);
    assert_eq!(braid.last_strand_id(), 3);
    assert_eq!(braid.knot_count(), 3);
    assert_eq!(braid.get_strand(1).unwrap().length(), 5);
    assert_eq!(braid.get_strand(3).unwrap().length(), 0);

    // Ids keep counting after reopen
    assert_eq!(braid.create_strand().unwrap().id(), 4);
}

#[test]
fn test_reopen_with_best_fit() {
    let (medium, braid) = open_memory();
    braid.create_strand_from(&vec![1u8; 32_768][..]).unwrap();
    braid.clear().unwrap();
    braid.close().unwrap();

    let config = Config::builder()
        .sync_on_close(false)
        .allocation_policy(AllocationPolicy::BestFit)
        .build();
    let braid = Braid::with_medium(medium.clone(), config).unwrap();

    // The free 32K knot is more than twice a minimum request
    braid.create_strand().unwrap();
    assert_eq!(braid.knot_count(), 2);

    braid.create_strand_from(&vec![2u8; 20_000][..]).unwrap();
    assert_eq!(braid.knot_count(), 2);
}

#[test]
fn test_ratio_fit_reuses_large_knot() {
    let (_medium, braid) = open_memory();
    braid.create_strand_from(&vec![1u8; 32_768][..]).unwrap();
    braid.clear().unwrap();

    braid.create_strand().unwrap();
    assert_eq!(braid.knot_count(), 1);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_operations_after_close() {
    let (_medium, braid) = open_memory();
    braid.create_strand().unwrap();

    braid.close().unwrap();
    assert!(braid.is_closed());
    braid.close().unwrap();

    assert!(matches!(braid.create_strand(), Err(BraidError::Closed)));
    assert!(matches!(braid.get_strand(1), Err(BraidError::Closed)));
    assert!(matches!(braid.destroy_strand(1), Err(BraidError::Closed)));
    assert!(matches!(braid.clear(), Err(BraidError::Closed)));
    assert!(matches!(braid.medium_length(), Err(BraidError::Closed)));

    // In-memory queries still answer
    assert_eq!(braid.strand_count(), 1);
}

#[test]
fn test_strand_io_after_close() {
    let (_medium, braid) = open_memory();
    let strand = braid.create_strand().unwrap();
    strand.write(b"data").unwrap();

    braid.close().unwrap();

    strand.seek(SeekFrom::Start(0));
    let mut buf = [0u8; 4];
    assert!(matches!(strand.read(&mut buf), Err(BraidError::Closed)));
}
