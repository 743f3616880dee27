/// One directory record: a named byte range within the archive.
///
/// Records are immutable once parsed. The format permits several records to
/// share a name or to overlap in the file; nothing here deduplicates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LumpRecord {
    /// Byte offset of the lump's data within the file.
    pub offset: u32,
    /// Length of the lump's data in bytes.
    pub length: u32,
    /// Sanitized display name, at most 8 characters.
    pub name: String,
}

impl LumpRecord {
    /// One past the last byte of the lump's data.
    #[inline(always)]
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.length)
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
