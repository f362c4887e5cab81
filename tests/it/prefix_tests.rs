use crate::{archive_of, listing_fixture};
use packfs::{CompressionLevel, Vfs};
use rstest::rstest;

/// The documented platform contract: the distributable is a plain byte-level
/// concatenation of native binary and archive, for any prefix length.
#[rstest]
#[case(0)]
#[case(1)]
#[case(4096)]
fn index_is_identical_behind_any_prefix(#[case] prefix_len: usize) {
    let archive = archive_of(&listing_fixture(), CompressionLevel::default());

    // Arbitrary non-zero prefix bytes; a real native binary is opaque data
    // to the locator either way.
    let prefix: Vec<u8> = (0..prefix_len).map(|i| (i * 31 % 251) as u8).collect();
    let mut image = prefix;
    image.extend_from_slice(&archive);

    let bare = Vfs::from_slice(&archive).unwrap();
    let packaged = Vfs::from_slice(&image).unwrap();

    assert_eq!(
        packaged.index().unwrap().prefix_len(),
        prefix_len as u64
    );

    let mut bare_paths: Vec<&str> = bare.index().unwrap().paths().collect();
    let mut packaged_paths: Vec<&str> = packaged.index().unwrap().paths().collect();
    bare_paths.sort_unstable();
    packaged_paths.sort_unstable();
    assert_eq!(bare_paths, packaged_paths);

    for path in bare_paths {
        assert_eq!(bare.read(path).unwrap(), packaged.read(path).unwrap());
    }
}

#[test]
fn same_archive_serves_multiple_native_variants() {
    let archive = archive_of(&listing_fixture(), CompressionLevel::default());

    for native in [&b"console build"[..], &b"a much longer gui build image"[..]] {
        let mut image = native.to_vec();
        image.extend_from_slice(&archive);
        let vfs = Vfs::from_slice(&image).unwrap();
        assert_eq!(vfs.index().unwrap().prefix_len(), native.len() as u64);
        assert_eq!(vfs.read("a/x.txt").unwrap(), b"alpha");
    }
}

#[test]
fn entry_metadata_survives_the_prefix() {
    let archive = archive_of(&listing_fixture(), CompressionLevel::default());
    let mut image = vec![0u8; 512];
    image.extend_from_slice(&archive);

    let bare = Vfs::from_slice(&archive).unwrap();
    let packaged = Vfs::from_slice(&image).unwrap();

    for (path, _) in listing_fixture() {
        let a = bare.index().unwrap().get(path).unwrap();
        let b = packaged.index().unwrap().get(path).unwrap();
        assert_eq!(a.crc32(), b.crc32());
        assert_eq!(a.compressed_size(), b.compressed_size());
        assert_eq!(a.uncompressed_size(), b.uncompressed_size());
        assert_eq!(a.method(), b.method());
    }
}
