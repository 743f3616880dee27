use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyOpen, Request,
};
use libc::{EACCES, EINVAL, EIO, ENOENT, O_ACCMODE, O_RDONLY, O_WRONLY};
use structopt::StructOpt;

use wad_format::vfs::{Attributes, FsError, NodeKind, OpenMode, Vfs, WadFs};
use wad_format::WadFileReader;

const TTL: Duration = Duration::from_secs(1);

/// Bridges kernel requests onto the path-based driver.
///
/// Inode scheme: root is 1, the record at directory index `i` is `i + 2`.
/// Operations go through the driver by name, so a duplicate name always
/// resolves to the first record carrying it, whichever inode was asked for.
struct WadFuse {
    vfs: WadFs,
    uid: u32,
    gid: u32,
}

impl WadFuse {
    fn new(vfs: WadFs) -> WadFuse {
        WadFuse {
            vfs,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    fn path(&self, ino: u64) -> Option<String> {
        if ino == 1 {
            return Some("/".to_string());
        }
        let index = (ino as usize).checked_sub(2)?;
        self.vfs
            .reader()
            .records()
            .get(index)
            .map(|r| format!("/{}", r.name))
    }

    /// Inode a name resolves to: that of the first matching record.
    fn ino_for(&self, name: &str) -> Option<u64> {
        self.vfs
            .reader()
            .records()
            .iter()
            .position(|r| r.name == name)
            .map(|i| i as u64 + 2)
    }

    fn file_attr(&self, ino: u64, attrs: &Attributes) -> FileAttr {
        FileAttr {
            ino,
            size: attrs.size,
            blocks: (attrs.size + 511) / 512,
            atime: attrs.accessed,
            mtime: attrs.modified,
            ctime: attrs.changed,
            crtime: attrs.modified,
            kind: match attrs.kind {
                NodeKind::Directory => FileType::Directory,
                NodeKind::RegularFile => FileType::RegularFile,
            },
            perm: attrs.perm,
            nlink: attrs.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

fn errno(err: &FsError) -> i32 {
    match err {
        FsError::NotFound => ENOENT,
        FsError::PermissionDenied => EACCES,
        FsError::Io(_) => EIO,
    }
}

fn open_mode(flags: i32) -> OpenMode {
    match flags & O_ACCMODE {
        O_RDONLY => OpenMode::Read,
        O_WRONLY => OpenMode::Write,
        _ => OpenMode::ReadWrite,
    }
}

impl Filesystem for WadFuse {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != 1 {
            reply.error(ENOENT);
            return;
        }
        let name = match name.to_str() {
            Some(v) => v,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.vfs.get_attributes(&format!("/{}", name)) {
            Ok(attrs) => match self.ino_for(name) {
                Some(ino) => reply.entry(&TTL, &self.file_attr(ino, &attrs), 0),
                None => reply.error(ENOENT),
            },
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let path = match self.path(ino) {
            Some(v) => v,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.vfs.get_attributes(&path) {
            Ok(attrs) => reply.attr(&TTL, &self.file_attr(ino, &attrs)),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path(ino) {
            Some(v) => v,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        let entries = match self.vfs.list_directory(&path) {
            Ok(v) => v,
            Err(e) => {
                reply.error(errno(&e));
                return;
            }
        };

        for (i, entry) in entries.iter().enumerate().skip(offset as usize) {
            // `.` and `..` both point back at the root
            let entry_ino = if i < 2 { 1 } else { i as u64 };
            let kind = match entry.kind {
                NodeKind::Directory => FileType::Directory,
                NodeKind::RegularFile => FileType::RegularFile,
            };
            if reply.add(entry_ino, (i + 1) as i64, kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path(ino) {
            Some(v) => v,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.vfs.open(&path, open_mode(flags)) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.path(ino) {
            Some(v) => v,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        if offset < 0 {
            reply.error(EINVAL);
            return;
        }

        log::debug!("read {} offset={} size={}", path, offset, size);

        match self.vfs.read(&path, size, offset as u64) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno(&e)),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "wadfs", about = "Mount a WAD archive as a read-only filesystem.")]
struct Options {
    #[structopt(name = "wadfile", parse(from_os_str), help = "Path to the WAD archive")]
    wad_file: PathBuf,

    #[structopt(name = "mountpoint", parse(from_os_str), help = "Directory to mount it on")]
    mountpoint: PathBuf,
}

fn main() {
    env_logger::init();
    let opts = Options::from_args();

    let reader = match WadFileReader::open(&opts.wad_file) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("cannot open {}: {}", opts.wad_file.display(), e);
            std::process::exit(1);
        }
    };
    log::debug!(
        "mounting {} with {} lumps",
        opts.wad_file.display(),
        reader.records().len()
    );

    let options = [MountOption::RO, MountOption::FSName("wadfs".to_string())];
    if let Err(e) = fuser::mount2(WadFuse::new(WadFs::new(reader)), &opts.mountpoint, &options) {
        eprintln!("cannot mount on {}: {}", opts.mountpoint.display(), e);
        std::process::exit(1);
    }
}
