use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use structopt::StructOpt;

use wad_format::{compute_wasted, LumpRecord, WadFileReader, WasteReport};

#[derive(Debug, StructOpt)]
#[structopt(name = "lswad", about = "List the lumps of a WAD archive.")]
struct CliOpts {
    #[structopt(short = "H", long, help = "Suppress the summary and table headers")]
    no_header: bool,

    #[structopt(short = "w", long, help = "Skip the wasted-space report")]
    no_waste: bool,

    #[structopt(short = "c", long, help = "Print a CRC32 column for each lump")]
    crc: bool,

    #[structopt(name = "wadfile", parse(from_os_str), help = "Path to the WAD archive")]
    path: PathBuf,
}

/// CRC32 of a lump's byte range, streamed in 64 KiB chunks.
fn lump_crc32(wad: &WadFileReader, record: &LumpRecord) -> io::Result<u32> {
    let mut reader = wad.read_bytes(record)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

fn print_waste(path: &Path, report: &WasteReport) {
    for gap in &report.gaps {
        println!("{} bytes wasted at offset {}", gap.size, gap.offset);
    }
    for overlap in &report.overlaps {
        println!("{} bytes overlapping at offset {}", overlap.size, overlap.offset);
    }
    if report.wasted_bytes > 0 {
        println!(
            "{}: {} wasted byte{}",
            path.display(),
            report.wasted_bytes,
            if report.wasted_bytes == 1 { "" } else { "s" }
        );
    }
}

fn run(opts: CliOpts) -> anyhow::Result<()> {
    let wad = WadFileReader::open(&opts.path)
        .with_context(|| format!("cannot open {}", opts.path.display()))?;
    let header = wad.header();

    if !opts.no_header {
        println!(
            "{}WAD containing {} lumps",
            header.kind.as_byte() as char,
            header.lump_count
        );
        println!(
            "directory at offset {} (size {} bytes)",
            header.directory_offset,
            header.directory_len()
        );
        if opts.crc {
            println!("    name\t    size\t   CRC32\t   index");
        } else {
            println!("    name\t    size\t   index");
        }
    }

    for record in wad.records() {
        if opts.crc {
            let crc = lump_crc32(&wad, record)
                .with_context(|| format!("cannot read lump `{}`", record.name))?;
            println!(
                "{:>8}\t{:>8}\t{:08x}\t{:>8}",
                record.name, record.length, crc, record.offset
            );
        } else {
            println!("{:>8}\t{:>8}\t{:>8}", record.name, record.length, record.offset);
        }
    }

    if !opts.no_waste {
        print_waste(&opts.path, &compute_wasted(wad.records()));
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run(CliOpts::from_args()) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
