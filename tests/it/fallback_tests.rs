use crate::{archive_of, write_tree};
use packfs::{CompressionLevel, ErrorKind, Vfs};

#[test]
fn archive_shadows_same_named_fallback_file() {
    let archive = archive_of(
        &[("app/config.tcl", b"set packaged 1\n")],
        CompressionLevel::default(),
    );
    let base = tempfile::tempdir().unwrap();
    write_tree(base.path(), &[("app/config.tcl", b"set external 1\n")]);

    let vfs = Vfs::from_slice(&archive)
        .unwrap()
        .with_fallback(base.path());
    assert_eq!(vfs.read("app/config.tcl").unwrap(), b"set packaged 1\n");
}

#[test]
fn misses_fall_through_to_the_base_directory() {
    let archive = archive_of(&[("app/main.tcl", b"packaged")], CompressionLevel::default());
    let base = tempfile::tempdir().unwrap();
    write_tree(base.path(), &[("app/user.tcl", b"user script")]);

    let vfs = Vfs::from_slice(&archive)
        .unwrap()
        .with_fallback(base.path());

    assert_eq!(vfs.read("app/user.tcl").unwrap(), b"user script");
    assert!(vfs.exists("app/user.tcl"));
    assert!(vfs.is_dir("app"));
}

#[test]
fn without_fallback_misses_are_not_found() {
    let archive = archive_of(&[("app/main.tcl", b"packaged")], CompressionLevel::default());
    let vfs = Vfs::from_slice(&archive).unwrap();

    let err = vfs.read("app/user.tcl").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::NotFound));
}

#[test]
fn listings_union_both_namespaces() {
    let archive = archive_of(&[("app/packaged.tcl", b"p")], CompressionLevel::default());
    let base = tempfile::tempdir().unwrap();
    write_tree(
        base.path(),
        &[("app/external.tcl", b"e"), ("app/packaged.tcl", b"shadowed")],
    );

    let vfs = Vfs::from_slice(&archive)
        .unwrap()
        .with_fallback(base.path());

    let listed = vfs.list_dir("app").unwrap();
    let expected: Vec<&str> = vec!["external.tcl", "packaged.tcl"];
    assert_eq!(listed.iter().map(String::as_str).collect::<Vec<_>>(), expected);
}

#[test]
fn unpackaged_mode_serves_the_base_directory_only() {
    let base = tempfile::tempdir().unwrap();
    write_tree(base.path(), &[("app/main.tcl", b"dev tree")]);

    let vfs = Vfs::unpackaged(base.path());
    assert!(vfs.index().is_none());
    assert_eq!(vfs.read("app/main.tcl").unwrap(), b"dev tree");
    assert!(vfs.is_dir("app"));

    let err = vfs.read("app/missing.tcl").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::NotFound));
}

#[test]
fn materialize_hands_back_real_fallback_paths_directly() {
    let archive = archive_of(&[("app/main.tcl", b"x")], CompressionLevel::default());
    let base = tempfile::tempdir().unwrap();
    write_tree(base.path(), &[("app/native.so", b"external library")]);

    let vfs = Vfs::from_slice(&archive)
        .unwrap()
        .with_fallback(base.path());

    let real = vfs.materialize("app/native.so").unwrap();
    assert_eq!(real, base.path().join("app").join("native.so"));
    assert_eq!(std::fs::read(real).unwrap(), b"external library");
}
