use crate::{archive_of, listing_fixture};
use packfs::{CompressionLevel, ErrorKind, Vfs};
use rstest::rstest;

const TRAILER_SIZE: usize = 32;

/// Byte offsets of declared fields within the trailer record, relative to
/// its signature: entry count, directory size, directory offset, directory
/// checksum.
#[rstest]
#[case(6)]
#[case(10)]
#[case(18)]
#[case(26)]
fn flipping_trailer_fields_is_corrupt_never_wrong(#[case] field_offset: usize) {
    let mut archive = archive_of(&listing_fixture(), CompressionLevel::default());
    let trailer_pos = archive.len() - TRAILER_SIZE;
    archive[trailer_pos + field_offset] ^= 0xff;

    let err = Vfs::from_slice(&archive).unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::CorruptTrailer { .. }),
        "got {:?}",
        err.kind()
    );
}

#[test]
fn flipping_directory_bytes_trips_the_checksum() {
    let mut archive = archive_of(&listing_fixture(), CompressionLevel::default());
    let trailer_pos = archive.len() - TRAILER_SIZE;
    archive[trailer_pos - 5] ^= 0x20;

    let err = Vfs::from_slice(&archive).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::CorruptTrailer { .. }));
}

#[test]
fn destroying_the_trailer_means_no_archive() {
    let mut archive = archive_of(&listing_fixture(), CompressionLevel::default());
    let trailer_pos = archive.len() - TRAILER_SIZE;
    // Wipe the signature itself: nothing identifiable remains.
    archive[trailer_pos] ^= 0xff;

    let err = Vfs::from_slice(&archive).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TrailerNotFound));
}

#[test]
fn truncated_archive_has_no_trailer() {
    let archive = archive_of(&listing_fixture(), CompressionLevel::default());
    let truncated = &archive[..archive.len() - 7];

    let err = Vfs::from_slice(truncated).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TrailerNotFound));
}

#[test]
fn corrupt_entry_body_fails_the_read_not_the_load() {
    let fixture = listing_fixture();
    let mut archive = archive_of(&fixture, CompressionLevel::STORE);

    // The first entry's body sits right after its local header and path;
    // damage one byte of the stored content ("alpha").
    let body_start = 28 + "a/x.txt".len();
    archive[body_start] ^= 0xff;

    // The directory is intact, so the index loads.
    let vfs = Vfs::from_slice(&archive).unwrap();
    let err = vfs.read("a/x.txt").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidChecksum { .. }));

    // Undamaged entries still read fine.
    assert_eq!(vfs.read("c.txt").unwrap(), b"gamma");
}

#[test]
fn plain_files_are_not_archives() {
    let err = Vfs::from_slice(b"#!/bin/sh\necho not packaged\n").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TrailerNotFound));
}
