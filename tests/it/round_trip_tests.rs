use crate::{archive_of, write_tree};
use packfs::{build_archive, CompressionLevel, Vfs};
use rstest::rstest;

fn mixed_fixture() -> Vec<(&'static str, Vec<u8>)> {
    // Compressible text, incompressible bytes, an empty file, and something
    // big enough to span several deflate blocks.
    let mut big = Vec::new();
    for i in 0..40_000u32 {
        big.extend_from_slice(format!("line {}\n", i % 97).as_bytes());
    }
    let mut noisy = Vec::with_capacity(4096);
    let mut state = 0x2545_f491u32;
    for _ in 0..4096 {
        state = state.wrapping_mul(0x0019_660d).wrapping_add(0x3c6e_f35f);
        noisy.push((state >> 24) as u8);
    }
    vec![
        ("app/main.tcl", b"puts {hello world}\n".to_vec()),
        ("app/lib/util.tcl", b"proc noop {} {}\n".to_vec()),
        ("app/empty", Vec::new()),
        ("app/data/noise.bin", noisy),
        ("app/data/big.txt", big),
    ]
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(6)]
#[case(9)]
fn every_file_reads_back_identical(#[case] level: u8) {
    let files = mixed_fixture();
    let borrowed: Vec<(&str, &[u8])> = files.iter().map(|(p, d)| (*p, d.as_slice())).collect();
    let archive = archive_of(&borrowed, CompressionLevel::new(level).unwrap());

    let vfs = Vfs::from_slice(&archive).unwrap();
    for (logical, data) in &files {
        assert_eq!(&vfs.read(logical).unwrap(), data, "mismatch at {logical}");
        assert!(vfs.exists(logical));
        assert!(!vfs.is_dir(logical));
    }
}

#[test]
fn built_tree_round_trips_through_the_tool_layer() {
    let source = tempfile::tempdir().unwrap();
    write_tree(
        source.path(),
        &[
            ("init.tcl", b"source lib/util.tcl\n"),
            ("lib/util.tcl", b"proc add {a b} {expr {$a + $b}}\n"),
        ],
    );

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("app.pfs");
    let summary = build_archive(
        source.path(),
        &out_path,
        "app",
        CompressionLevel::default(),
        Some(b"runtime v1"),
    )
    .unwrap();
    assert_eq!(summary.entries, 2);

    let archive = std::fs::read(&out_path).unwrap();
    let vfs = Vfs::from_slice(&archive).unwrap();
    assert_eq!(
        vfs.read("app/lib/util.tcl").unwrap(),
        b"proc add {a b} {expr {$a + $b}}\n"
    );
    assert_eq!(vfs.index().unwrap().comment(), b"runtime v1");
}

#[test]
fn identical_trees_build_identical_archives() {
    let files: &[(&str, &[u8])] = &[
        ("z.txt", b"last"),
        ("a/nested.txt", b"first"),
        ("m.bin", &[0u8; 100]),
    ];

    let mut archives = Vec::new();
    for _ in 0..2 {
        let source = tempfile::tempdir().unwrap();
        write_tree(source.path(), files);
        let out = tempfile::tempdir().unwrap();
        let out_path = out.path().join("a.pfs");
        build_archive(
            source.path(),
            &out_path,
            "app",
            CompressionLevel::default(),
            None,
        )
        .unwrap();
        archives.push(std::fs::read(&out_path).unwrap());
    }

    assert_eq!(archives[0], archives[1]);
}

#[test]
fn missing_source_fails_and_leaves_no_output() {
    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("a.pfs");
    let missing = out_dir.path().join("no-such-tree");
    let err = build_archive(
        &missing,
        &out_path,
        "app",
        CompressionLevel::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err.kind(), packfs::ErrorKind::IO(_)));
    assert!(!out_path.exists());
}

#[cfg(unix)]
#[test]
fn sockets_in_the_source_tree_abort_the_build() {
    let source = tempfile::tempdir().unwrap();
    write_tree(source.path(), &[("ok.txt", b"fine")]);
    let _listener = std::os::unix::net::UnixListener::bind(source.path().join("ctl.sock")).unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("a.pfs");
    let err = build_archive(
        source.path(),
        &out_path,
        "app",
        CompressionLevel::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(
        err.kind(),
        packfs::ErrorKind::UnsupportedSource { .. }
    ));
    assert!(!out_path.exists());
}

#[cfg(unix)]
#[test]
fn symlinked_files_are_followed() {
    let source = tempfile::tempdir().unwrap();
    write_tree(source.path(), &[("real.txt", b"content")]);
    std::os::unix::fs::symlink(source.path().join("real.txt"), source.path().join("link.txt"))
        .unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("a.pfs");
    build_archive(
        source.path(),
        &out_path,
        "app",
        CompressionLevel::default(),
        None,
    )
    .unwrap();

    let archive = std::fs::read(&out_path).unwrap();
    let vfs = Vfs::from_slice(&archive).unwrap();
    assert_eq!(vfs.read("app/link.txt").unwrap(), b"content");
    assert_eq!(vfs.read("app/real.txt").unwrap(), b"content");
}
