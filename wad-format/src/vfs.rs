//! A read-only virtual filesystem over an open archive.
//!
//! The namespace is flat: one root directory containing one regular file per
//! lump, named by its display name. Duplicate names resolve to the first
//! record in directory order, the same policy as [`WadFileReader::find`].

use std::io;
use std::time::SystemTime;

use crate::reader::WadFileReader;
use crate::record::LumpRecord;

/// Non-fatal outcomes of filesystem calls. A host runtime maps these onto
/// its own error codes; none of them tears the filesystem down.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// Requested access for [`Vfs::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    RegularFile,
}

/// Attributes of one node, in host-neutral terms.
#[derive(Debug, Clone, Copy)]
pub struct Attributes {
    pub kind: NodeKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub accessed: SystemTime,
    pub modified: SystemTime,
    pub changed: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// The four operations a host runtime dispatches against a mounted archive.
///
/// All operations take `&self` and must stay correct under arbitrary
/// concurrent interleavings on the same or different paths.
pub trait Vfs {
    fn get_attributes(&self, path: &str) -> Result<Attributes, FsError>;
    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;
    fn open(&self, path: &str, mode: OpenMode) -> Result<(), FsError>;
    fn read(&self, path: &str, size: u32, offset: u64) -> Result<Vec<u8>, FsError>;
}

/// The concrete driver: an immutable index plus the open backing file.
#[derive(Debug)]
pub struct WadFs {
    reader: WadFileReader,
}

impl WadFs {
    pub fn new(reader: WadFileReader) -> WadFs {
        WadFs { reader }
    }

    #[inline(always)]
    pub fn reader(&self) -> &WadFileReader {
        &self.reader
    }

    /// Attributes of the root directory.
    pub fn root_attributes(&self) -> Attributes {
        let times = self.reader.timestamps();
        Attributes {
            kind: NodeKind::Directory,
            size: 0,
            perm: 0o755,
            nlink: 2,
            accessed: times.accessed,
            modified: times.modified,
            changed: times.changed,
        }
    }

    /// Attributes of one lump, presented as a read-only regular file with the
    /// backing file's snapshotted timestamps.
    pub fn lump_attributes(&self, record: &LumpRecord) -> Attributes {
        let times = self.reader.timestamps();
        Attributes {
            kind: NodeKind::RegularFile,
            size: u64::from(record.length),
            perm: 0o444,
            nlink: 1,
            accessed: times.accessed,
            modified: times.modified,
            changed: times.changed,
        }
    }

    fn resolve(&self, path: &str) -> Result<&LumpRecord, FsError> {
        let name = match path.strip_prefix('/') {
            Some(v) => v,
            None => return Err(FsError::NotFound),
        };
        if name.is_empty() || name.contains('/') {
            return Err(FsError::NotFound);
        }
        self.reader.find(name).ok_or(FsError::NotFound)
    }
}

impl Vfs for WadFs {
    fn get_attributes(&self, path: &str) -> Result<Attributes, FsError> {
        if path == "/" {
            return Ok(self.root_attributes());
        }
        self.resolve(path).map(|r| self.lump_attributes(r))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        if path != "/" {
            return Err(FsError::NotFound);
        }

        let mut entries = Vec::with_capacity(self.reader.records().len() + 2);
        entries.push(DirEntry {
            name: ".".to_string(),
            kind: NodeKind::Directory,
        });
        entries.push(DirEntry {
            name: "..".to_string(),
            kind: NodeKind::Directory,
        });
        for record in self.reader.records() {
            entries.push(DirEntry {
                name: record.name.clone(),
                kind: NodeKind::RegularFile,
            });
        }
        Ok(entries)
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<(), FsError> {
        self.resolve(path)?;
        if mode != OpenMode::Read {
            return Err(FsError::PermissionDenied);
        }
        Ok(())
    }

    fn read(&self, path: &str, size: u32, offset: u64) -> Result<Vec<u8>, FsError> {
        let record = self.resolve(path)?;
        Ok(self.reader.read_at(record, offset, size as usize)?)
    }
}
