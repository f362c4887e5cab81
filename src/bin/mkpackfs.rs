use clap::Parser;
use packfs::{build_archive, CompressionLevel};
use std::path::PathBuf;

/// Packs a directory tree into an appendable archive.
///
/// The produced file is not runnable by itself; concatenate it after a
/// native binary (`cat runtime archive > app`) to get the distributable.
#[derive(Debug, Parser)]
#[command(name = "mkpackfs", version)]
struct Args {
    /// Where to write the archive.
    #[arg(short = 'o', long = "output", value_name = "ARCHIVE")]
    output: PathBuf,

    /// Directory tree to pack.
    source_dir: PathBuf,

    /// Name entries are stored under, e.g. `app` maps `<source>/x` to `app/x`.
    logical_root: String,

    /// Compression level: 0 stores, 9 compresses hardest.
    #[arg(value_parser = clap::value_parser!(u8).range(0..=9))]
    level: u8,

    /// Optional archive comment (at most 65,535 bytes).
    #[arg(long)]
    comment: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let Some(level) = CompressionLevel::new(args.level) else {
        eprintln!("mkpackfs: compression level must be 0-9");
        std::process::exit(2);
    };

    let summary = build_archive(
        &args.source_dir,
        &args.output,
        &args.logical_root,
        level,
        args.comment.as_deref().map(str::as_bytes),
    );

    match summary {
        Ok(summary) => {
            println!(
                "{}: {} entries, {} -> {} bytes",
                args.output.display(),
                summary.entries,
                summary.uncompressed_bytes,
                summary.archive_bytes
            );
        }
        Err(e) => {
            eprintln!("mkpackfs: {}", e);
            std::process::exit(1);
        }
    }
}
