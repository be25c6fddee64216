//! Tests for the state file codec.

use super::*;
use crate::segmenter::{divide, Segment, UNBOUNDED};

fn legacy_image(completed: i64, currents: &[i64]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(currents.len() as u32).to_ne_bytes());
    out.extend_from_slice(&completed.to_ne_bytes());
    for c in currents {
        out.extend_from_slice(&c.to_ne_bytes());
    }
    out
}

#[test]
fn snapshot_restore_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.bin.st");
    let record = StateRecord {
        bytes_completed: 230_000,
        segments: vec![
            Segment::new(100_000, 250_000),
            Segment::new(250_000, 500_000),
            Segment::new(580_000, 750_000),
            Segment::new(750_000, 1_000_000),
        ],
    };
    snapshot(&path, &record).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 12 + 16 * 4);
    let restored = restore(&path, Some(1_000_000)).unwrap().unwrap();
    assert_eq!(restored, record);
    assert!(!dir.path().join("file.bin.st.tmp").exists());
}

#[test]
fn snapshot_replaces_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.st");
    let mut record = StateRecord {
        bytes_completed: 10,
        segments: vec![Segment::new(10, 200)],
    };
    snapshot(&path, &record).unwrap();
    record.bytes_completed = 50;
    record.segments[0].current_byte = 50;
    snapshot(&path, &record).unwrap();
    assert_eq!(read_record(&path, Some(200)).unwrap().bytes_completed, 50);
}

#[test]
fn restore_missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(restore(&dir.path().join("nope.st"), Some(10)).unwrap().is_none());
}

#[test]
fn unbounded_segment_survives_roundtrip() {
    let record = StateRecord {
        bytes_completed: 7,
        segments: vec![Segment::new(7, UNBOUNDED)],
    };
    assert_eq!(decode(&encode(&record), None).unwrap(), record);
}

#[test]
fn legacy_file_rebuilds_bounds_with_divide() {
    let total = 1_000_000;
    let img = legacy_image(60_000, &[10_000, 260_000, 500_000, 780_000]);
    let rec = decode(&img, Some(total)).unwrap();
    let bounds = divide(total, 4);
    assert_eq!(rec.bytes_completed, 60_000);
    for (i, s) in rec.segments.iter().enumerate() {
        assert_eq!(s.last_byte, bounds[i].last_byte);
    }
    let currents: Vec<u64> = rec.segments.iter().map(|s| s.current_byte).collect();
    assert_eq!(currents, vec![10_000, 260_000, 500_000, 780_000]);
}

#[test]
fn legacy_file_needs_known_size() {
    let img = legacy_image(0, &[0, 0]);
    assert!(matches!(decode(&img, None), Err(StateFileError::LegacyNeedsSize)));
}

#[test]
fn legacy_file_with_impossible_slot_count_rejected() {
    // 200 KiB only splits into two segments, not eight.
    let img = legacy_image(0, &[0; 8]);
    assert!(matches!(
        decode(&img, Some(200 * 1024)),
        Err(StateFileError::LegacyMismatch { found: 8, expected: 2 })
    ));
}

#[test]
fn zero_slot_count_rejected() {
    let img = legacy_image(0, &[]);
    assert!(matches!(decode(&img, Some(10)), Err(StateFileError::NoSlots)));
}

#[test]
fn truncated_files_rejected() {
    assert!(matches!(decode(&[1, 0], Some(10)), Err(StateFileError::Truncated { .. })));
    let mut img = legacy_image(0, &[0, 0, 0]);
    img.truncate(img.len() - 4);
    assert!(matches!(decode(&img, Some(1 << 30)), Err(StateFileError::Truncated { .. })));
}

#[test]
fn negative_and_inverted_ranges_rejected() {
    let good = StateRecord {
        bytes_completed: 0,
        segments: vec![Segment::new(0, 100)],
    };
    let mut img = encode(&good);
    img[12..20].copy_from_slice(&(-5i64).to_ne_bytes());
    assert!(matches!(decode(&img, Some(100)), Err(StateFileError::Negative(-5))));

    let inverted = StateRecord {
        bytes_completed: 0,
        segments: vec![Segment::new(80, 40)],
    };
    assert!(matches!(
        decode(&encode(&inverted), Some(100)),
        Err(StateFileError::BadRange { slot: 0, .. })
    ));
}

#[test]
fn progress_beyond_file_size_rejected() {
    let rec = StateRecord {
        bytes_completed: 500,
        segments: vec![Segment::new(100, 100)],
    };
    assert!(matches!(
        decode(&encode(&rec), Some(100)),
        Err(StateFileError::Oversized { .. })
    ));
    let past_end = StateRecord {
        bytes_completed: 0,
        segments: vec![Segment::new(0, 150)],
    };
    assert!(matches!(
        decode(&encode(&past_end), Some(100)),
        Err(StateFileError::BadRange { .. })
    ));
}

#[test]
fn remove_ignores_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.st");
    remove(&path).unwrap();
    std::fs::write(&path, b"x").unwrap();
    remove(&path).unwrap();
    assert!(!path.exists());
}
