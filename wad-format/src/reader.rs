use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::de;
use crate::error::{FormatError, OpenError};
use crate::header::{WadHeader, HEADER_LEN, RECORD_LEN};
use crate::record::LumpRecord;

/// The backing file's own timestamps, snapshotted when the archive is opened
/// and never refreshed.
#[derive(Debug, Clone, Copy)]
pub struct Timestamps {
    pub accessed: SystemTime,
    pub modified: SystemTime,
    pub changed: SystemTime,
}

impl Timestamps {
    fn capture(meta: &std::fs::Metadata) -> Timestamps {
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Timestamps {
            accessed: meta.accessed().unwrap_or(modified),
            modified,
            changed: changed_time(meta).unwrap_or(modified),
        }
    }
}

#[cfg(unix)]
fn changed_time(meta: &std::fs::Metadata) -> Option<SystemTime> {
    use std::convert::TryFrom;
    use std::os::unix::fs::MetadataExt;

    let secs = u64::try_from(meta.ctime()).ok()?;
    Some(SystemTime::UNIX_EPOCH + std::time::Duration::new(secs, meta.ctime_nsec() as u32))
}

#[cfg(not(unix))]
fn changed_time(meta: &std::fs::Metadata) -> Option<SystemTime> {
    meta.modified().ok()
}

/// An open archive: the parsed header, the full directory in file order, and
/// the long-lived read handle.
///
/// The index is built once, in `open`, before the reader is returned; it is
/// never mutated afterwards. There is no invalidation: if the backing file
/// changes under an open reader, reads return whatever is there now.
#[derive(Debug)]
pub struct WadFileReader {
    file: File,
    path: PathBuf,
    header: WadHeader,
    records: Vec<LumpRecord>,
    times: Timestamps,
}

impl WadFileReader {
    /// Open an archive for reading, validate its header and load its
    /// directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WadFileReader, OpenError> {
        let path = path.as_ref().canonicalize()?;
        let mut file = OpenOptions::new().read(true).open(&path)?;

        let mut hbuf = [0u8; HEADER_LEN];
        file.read_exact(&mut hbuf)?;
        let header = de::parse_header(&hbuf)?;

        let file_len = file.metadata()?.len();
        if header.directory_end() > file_len {
            return Err(FormatError::DirectoryOutOfBounds {
                directory_end: header.directory_end(),
                file_len,
            }
            .into());
        }

        let records = read_directory(&mut file, &header)?;
        let times = Timestamps::capture(&file.metadata()?);

        tracing::debug!(
            path = %path.display(),
            records = records.len(),
            directory_offset = header.directory_offset,
            "loaded archive directory"
        );

        Ok(WadFileReader {
            file,
            path,
            header,
            records,
            times,
        })
    }

    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline(always)]
    pub fn header(&self) -> &WadHeader {
        &self.header
    }

    /// The directory, in file order.
    #[inline(always)]
    pub fn records(&self) -> &[LumpRecord] {
        &self.records
    }

    #[inline(always)]
    pub fn timestamps(&self) -> Timestamps {
        self.times
    }

    /// The first record in directory order whose name matches.
    ///
    /// The format permits duplicate names; the first one always wins.
    pub fn find(&self, name: &str) -> Option<&LumpRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Read up to `size` bytes of a lump, starting `offset` bytes into it.
    ///
    /// The request is clamped to the lump: a read at or past its end returns
    /// an empty buffer, and a read crossing its end returns only the bytes up
    /// to it. Addressing is positional on every call; no shared cursor moves,
    /// so concurrent reads against the same handle are safe.
    pub fn read_at(&self, record: &LumpRecord, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        let length = u64::from(record.length);
        if offset >= length {
            return Ok(Vec::new());
        }
        let len = (size as u64).min(length - offset) as usize;
        let mut buf = vec![0u8; len];
        read_exact_at(&self.file, &mut buf, u64::from(record.offset) + offset)?;
        Ok(buf)
    }

    /// Stream a whole lump over a fresh handle.
    pub fn read_bytes(&self, record: &LumpRecord) -> io::Result<io::Take<File>> {
        let mut file = OpenOptions::new().read(true).open(&self.path)?;
        file.seek(SeekFrom::Start(u64::from(record.offset)))?;
        Ok(file.take(u64::from(record.length)))
    }
}

fn read_directory(file: &mut File, header: &WadHeader) -> Result<Vec<LumpRecord>, OpenError> {
    file.seek(SeekFrom::Start(u64::from(header.directory_offset)))?;

    let mut records = Vec::with_capacity(header.lump_count as usize);
    let mut buf = [0u8; RECORD_LEN];
    for _ in 0..header.lump_count {
        file.read_exact(&mut buf)?;
        records.push(de::parse_record(&buf));
    }
    Ok(records)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            Ok(n) => {
                let tmp = buf;
                buf = &mut tmp[n..];
                offset += n as u64;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::WadKind;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("wad-format-reader-{}-{}", std::process::id(), name))
    }

    fn wad_bytes(kind: u8, lumps: &[(&str, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut directory = Vec::new();
        let mut offset = HEADER_LEN as u32;

        for (name, bytes) in lumps {
            let mut rec = [0u8; RECORD_LEN];
            rec[0..4].copy_from_slice(&offset.to_le_bytes());
            rec[4..8].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
            rec[8..8 + name.len()].copy_from_slice(name.as_bytes());
            directory.extend_from_slice(&rec);
            data.extend_from_slice(bytes);
            offset += bytes.len() as u32;
        }

        let mut out = vec![kind];
        out.extend_from_slice(b"WAD");
        out.extend_from_slice(&(lumps.len() as u32).to_le_bytes());
        out.extend_from_slice(&((HEADER_LEN + data.len()) as u32).to_le_bytes());
        out.extend_from_slice(&data);
        out.extend_from_slice(&directory);
        out
    }

    fn write_wad(name: &str, lumps: &[(&str, &[u8])]) -> PathBuf {
        let path = temp_path(name);
        std::fs::write(&path, wad_bytes(b'I', lumps)).unwrap();
        path
    }

    #[test]
    fn open_builds_index_in_file_order() {
        let path = write_wad(
            "index.wad",
            &[("E1M1", b"x" as &[u8]), ("THINGS", b"abcd"), ("E1M2", b"")],
        );
        let wad = WadFileReader::open(&path).unwrap();

        assert_eq!(wad.header().kind, WadKind::Initial);
        assert_eq!(wad.header().lump_count, 3);

        let names: Vec<_> = wad.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["E1M1", "THINGS", "E1M2"]);
        assert_eq!(wad.records()[0].offset, 12);
        assert_eq!(wad.records()[1].offset, 13);
        assert_eq!(wad.records()[1].length, 4);
        assert_eq!(wad.records()[2].length, 0);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let path = write_wad("twice.wad", &[("A", b"one" as &[u8]), ("B", b"two")]);
        let first = WadFileReader::open(&path).unwrap();
        let second = WadFileReader::open(&path).unwrap();
        assert_eq!(first.records(), second.records());
        assert_eq!(first.header(), second.header());
    }

    #[test]
    fn rejects_bad_magic() {
        let path = temp_path("notawad.wad");
        std::fs::write(&path, b"JUNKJUNKJUNKJUNK").unwrap();
        match WadFileReader::open(&path) {
            Err(OpenError::Format(FormatError::BadMagic(_))) => {}
            other => panic!("expected BadMagic, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_directory_past_eof() {
        let path = temp_path("truncated.wad");
        let mut bytes = wad_bytes(b'P', &[("A", b"data" as &[u8])]);
        bytes.truncate(bytes.len() - 8);
        std::fs::write(&path, bytes).unwrap();
        match WadFileReader::open(&path) {
            Err(OpenError::Format(FormatError::DirectoryOutOfBounds { .. })) => {}
            other => panic!("expected DirectoryOutOfBounds, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn find_returns_first_match() {
        let path = write_wad("dupes.wad", &[("DEMO", b"first" as &[u8]), ("DEMO", b"second")]);
        let wad = WadFileReader::open(&path).unwrap();
        let record = wad.find("DEMO").unwrap();
        assert_eq!(record.offset, 12);
        assert!(wad.find("NOPE").is_none());
    }

    #[test]
    fn read_at_clamps_to_lump() {
        let path = write_wad("clamp.wad", &[("PAD", b"zz" as &[u8]), ("DATA", b"abcd")]);
        let wad = WadFileReader::open(&path).unwrap();
        let record = wad.find("DATA").unwrap();

        assert_eq!(wad.read_at(record, 0, 4).unwrap(), b"abcd");
        assert_eq!(wad.read_at(record, 2, 10).unwrap(), b"cd");
        assert_eq!(wad.read_at(record, 4, 10).unwrap(), b"");
        assert_eq!(wad.read_at(record, 5, 10).unwrap(), b"");
        assert_eq!(wad.read_at(record, 1, 2).unwrap(), b"bc");
    }

    #[test]
    fn read_bytes_streams_whole_lump() {
        let path = write_wad("stream.wad", &[("A", b"skip" as &[u8]), ("B", b"payload")]);
        let wad = WadFileReader::open(&path).unwrap();
        let mut out = Vec::new();
        wad.read_bytes(wad.find("B").unwrap())
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"payload");
    }
}
