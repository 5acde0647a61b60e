//! Tests for Seam
//!
//! These tests verify:
//! - Building and appending with collision checks
//! - Logical slicing across stitch boundaries
//! - Degenerate zero-length slices
//! - Reading and writing through a stream handle

use std::io::SeekFrom;

use braid::{BraidError, Config, MemoryMedium, Seam, Stitch, StitchErrorReason, StreamEngine};

// =============================================================================
// Helper Functions
// =============================================================================

/// [0,10) [20,25) [40,48) => 23 logical bytes
fn three_part_seam() -> Seam {
    Seam::build([Stitch::new(0, 10), Stitch::new(20, 5), Stitch::new(40, 8)]).unwrap()
}

/// Medium whose byte at offset i is i
fn numbered_engine(len: usize) -> (MemoryMedium, StreamEngine) {
    let medium = MemoryMedium::from_bytes((0..len).map(|i| i as u8).collect());
    let config = Config::builder().sync_on_close(false).build();
    let engine = StreamEngine::start(medium.clone(), &config).unwrap();
    (medium, engine)
}

fn physical_bytes(seam: &Seam) -> Vec<u8> {
    seam.iter()
        .flat_map(|s| (s.start()..s.end()).map(|i| i as u8))
        .collect()
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_build() {
    let seam = three_part_seam();

    assert_eq!(seam.len(), 3);
    assert_eq!(seam.byte_length(), 23);
    assert_eq!(seam.start(), 0);
    assert_eq!(seam.end(), 48);
    assert_eq!(seam[1], Stitch::new(20, 5));
}

#[test]
fn test_build_rejects_empty_and_collisions() {
    assert!(matches!(
        Seam::build(Vec::new()),
        Err(BraidError::InvalidArgument(_))
    ));
    assert!(matches!(
        Seam::build([Stitch::new(0, 10), Stitch::new(5, 10)]),
        Err(BraidError::Stitch(StitchErrorReason::Collision))
    ));
}

#[test]
fn test_append_keeps_order() {
    let seam = Seam::new(Stitch::new(100, 10))
        .append(Stitch::new(0, 10))
        .unwrap()
        .append_all([Stitch::new(50, 5), Stitch::new(200, 1)])
        .unwrap();

    let starts: Vec<u64> = seam.iter().map(|s| s.start()).collect();
    assert_eq!(starts, vec![100, 0, 50, 200]);
    assert_eq!(seam.byte_length(), 26);
}

#[test]
fn test_append_collision() {
    let seam = three_part_seam();

    assert!(matches!(
        seam.append(Stitch::new(22, 1)),
        Err(BraidError::Stitch(StitchErrorReason::Collision))
    ));
    assert!(matches!(
        seam.append_all([Stitch::new(60, 5), Stitch::new(62, 5)]),
        Err(BraidError::Stitch(StitchErrorReason::Collision))
    ));
}

// =============================================================================
// Slicing Tests
// =============================================================================

#[test]
fn test_slice_across_boundaries() {
    let seam = three_part_seam();
    let slice = seam.slice(8, 10).unwrap();

    assert_eq!(slice.byte_length(), 10);
    assert_eq!(
        slice.stitches(),
        &[Stitch::new(8, 2), Stitch::new(20, 5), Stitch::new(40, 3)]
    );
}

#[test]
fn test_slice_lengths_everywhere() {
    let seam = three_part_seam();
    let whole = physical_bytes(&seam);

    for offset in 0..=seam.byte_length() {
        for count in 0..=(seam.byte_length() - offset) {
            let slice = seam.slice(offset, count).unwrap();
            assert_eq!(slice.byte_length(), count);

            let expected = &whole[offset as usize..(offset + count) as usize];
            assert_eq!(physical_bytes(&slice), expected, "slice({}, {})", offset, count);
        }
    }
}

#[test]
fn test_slice_on_boundary() {
    let seam = three_part_seam();

    let head = seam.slice(0, 10).unwrap();
    assert_eq!(head.stitches(), &[Stitch::new(0, 10)]);

    let tail = seam.slice(10, 13).unwrap();
    assert_eq!(tail.stitches(), &[Stitch::new(20, 5), Stitch::new(40, 8)]);
}

#[test]
fn test_zero_count_is_anchored() {
    let seam = three_part_seam();

    let at_start = seam.slice(0, 0).unwrap();
    assert_eq!(at_start.stitches(), &[Stitch::new(0, 0)]);

    let mid = seam.slice(12, 0).unwrap();
    assert_eq!(mid.stitches(), &[Stitch::new(22, 0)]);

    let at_end = seam.slice_to_end(23).unwrap();
    assert_eq!(at_end.stitches(), &[Stitch::new(48, 0)]);
    assert!(at_end.is_empty());
}

#[test]
fn test_slice_errors() {
    let seam = three_part_seam();

    assert!(matches!(
        seam.slice(24, 0),
        Err(BraidError::Stitch(StitchErrorReason::OffsetOutOfBounds))
    ));
    assert!(matches!(
        seam.slice(23, 1),
        Err(BraidError::Stitch(StitchErrorReason::CountTooLong))
    ));
    assert!(matches!(
        seam.slice(5, 19),
        Err(BraidError::Stitch(StitchErrorReason::CountTooLong))
    ));
    assert!(matches!(
        seam.slice(0, 24),
        Err(BraidError::Stitch(StitchErrorReason::CountTooLong))
    ));
}

// =============================================================================
// I/O Tests
// =============================================================================

#[test]
fn test_read_concatenates_stitches() {
    let (_medium, engine) = numbered_engine(64);
    let seam = three_part_seam();

    let mut handle = engine.handle();
    let bytes = seam.slice(8, 10).unwrap().read(&mut handle).unwrap();
    handle.finish().unwrap();

    assert_eq!(bytes, vec![8, 9, 20, 21, 22, 23, 24, 40, 41, 42]);
}

#[test]
fn test_read_short_circuits_at_end_of_medium() {
    // Medium ends inside the last stitch
    let (_medium, engine) = numbered_engine(44);
    let seam = three_part_seam();

    let mut handle = engine.handle();
    let bytes = seam.read(&mut handle).unwrap();
    handle.finish().unwrap();

    assert_eq!(bytes.len(), 10 + 5 + 4);
    assert_eq!(&bytes[15..], &[40, 41, 42, 43]);
}

#[test]
fn test_write_distributes_buffer() {
    let (medium, engine) = numbered_engine(64);
    let seam = three_part_seam().slice(8, 10).unwrap();

    let mut handle = engine.handle();
    let written = seam.write(&[0xFF; 10], &mut handle).unwrap();
    handle.finish().unwrap();
    engine.close().unwrap();

    assert_eq!(written, 10);

    let data = medium.snapshot();
    assert_eq!(&data[6..12], &[6, 7, 0xFF, 0xFF, 10, 11]);
    assert_eq!(&data[20..25], &[0xFF; 5]);
    assert_eq!(&data[40..44], &[0xFF, 0xFF, 0xFF, 43]);
}

#[test]
fn test_write_reports_short_seam() {
    let (_medium, engine) = numbered_engine(64);
    let seam = Seam::new(Stitch::new(0, 4));

    let mut handle = engine.handle();
    let written = seam.write(&[1; 10], &mut handle).unwrap();
    handle.finish().unwrap();

    assert_eq!(written, 4);
}

#[test]
fn test_stitch_write_positions_absolutely() {
    let (medium, engine) = numbered_engine(16);

    let mut handle = engine.handle();
    handle.seek(SeekFrom::Start(2)).unwrap();
    Stitch::new(10, 2).write(&[0xAA, 0xBB, 0xCC], &mut handle).unwrap();
    handle.finish().unwrap();
    engine.close().unwrap();

    assert_eq!(&medium.snapshot()[9..13], &[9, 0xAA, 0xBB, 12]);
}
