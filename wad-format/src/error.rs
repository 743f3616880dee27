use std::io;

/// A structural problem with the archive itself.
///
/// These are fatal: an archive that fails one of these checks is never
/// partially loaded.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("bad magic {0:02x?}, expected `IWAD` or `PWAD`")]
    BadMagic([u8; 4]),

    #[error("unrecognized kind byte {0:#04x}, expected `I` or `P`")]
    UnknownKind(u8),

    #[error("directory ends at byte {directory_end} but the file is only {file_len} bytes")]
    DirectoryOutOfBounds { directory_end: u64, file_len: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("invalid WAD file")]
    Format(#[from] FormatError),

    #[error("failed to read WAD file")]
    Io(#[from] io::Error),
}
