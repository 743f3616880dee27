use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;
use crate::header::{WadHeader, WadKind, HEADER_LEN, MAGIC_TAIL, RECORD_LEN};
use crate::record::LumpRecord;

/// Decode a little-endian u32 at `at`. All multi-byte fields in the format
/// use this encoding.
#[inline(always)]
pub(crate) fn read_u32_le(buf: &[u8], at: usize) -> u32 {
    LittleEndian::read_u32(&buf[at..at + 4])
}

/// Parse the fixed 12-byte header.
///
/// Bytes 1-3 must spell `WAD` and byte 0 must be a recognized kind
/// character (`I` or `P`).
pub fn parse_header(buf: &[u8; HEADER_LEN]) -> Result<WadHeader, FormatError> {
    if &buf[1..4] != MAGIC_TAIL {
        return Err(FormatError::BadMagic([buf[0], buf[1], buf[2], buf[3]]));
    }

    let kind = WadKind::from_byte(buf[0]).ok_or(FormatError::UnknownKind(buf[0]))?;
    let lump_count = read_u32_le(buf, 4);
    let directory_offset = read_u32_le(buf, 8);

    tracing::debug!(?kind, lump_count, directory_offset, "parsed header");

    Ok(WadHeader {
        kind,
        lump_count,
        directory_offset,
    })
}

/// Parse one 16-byte directory record.
pub fn parse_record(buf: &[u8; RECORD_LEN]) -> LumpRecord {
    LumpRecord {
        offset: read_u32_le(buf, 0),
        length: read_u32_le(buf, 4),
        name: sanitize_name(&buf[8..16]),
    }
}

/// Sanitize the 8 raw name bytes into a display name.
///
/// Printable bytes are kept, a NUL terminates the name, and anything else
/// becomes a `?` placeholder.
fn sanitize_name(raw: &[u8]) -> String {
    let mut name = String::with_capacity(raw.len());
    for &byte in raw {
        if byte == 0 {
            break;
        }
        if byte.is_ascii_graphic() || byte == b' ' {
            name.push(byte as char);
        } else {
            name.push('?');
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let bytes: [u8; HEADER_LEN] = [
            b'I', b'W', b'A', b'D', 0x0a, 0x00, 0x00, 0x00, 0x0c, 0x00, 0x00, 0x00,
        ];
        let header = parse_header(&bytes).unwrap();
        assert_eq!(header.kind, WadKind::Initial);
        assert_eq!(header.lump_count, 10);
        assert_eq!(header.directory_offset, 12);
        assert_eq!(header.to_bytes(), bytes);

        let bytes: [u8; HEADER_LEN] = [
            b'P', b'W', b'A', b'D', 0xff, 0x01, 0x00, 0x00, 0x78, 0x56, 0x34, 0x12,
        ];
        let header = parse_header(&bytes).unwrap();
        assert_eq!(header.kind, WadKind::Patch);
        assert_eq!(header.lump_count, 0x1ff);
        assert_eq!(header.directory_offset, 0x1234_5678);
        assert_eq!(header.to_bytes(), bytes);
    }

    #[test]
    fn header_bad_magic() {
        let bytes = *b"IWAX\x00\x00\x00\x00\x00\x00\x00\x00";
        assert!(matches!(
            parse_header(&bytes),
            Err(FormatError::BadMagic(_))
        ));
    }

    #[test]
    fn header_unknown_kind() {
        let bytes = *b"XWAD\x00\x00\x00\x00\x00\x00\x00\x00";
        assert!(matches!(
            parse_header(&bytes),
            Err(FormatError::UnknownKind(b'X'))
        ));
    }

    #[test]
    fn name_stops_at_nul() {
        assert_eq!(
            sanitize_name(&[0x41, 0x42, 0x00, 0xff, 0x00, 0x00, 0x00, 0x00]),
            "AB"
        );
    }

    #[test]
    fn name_replaces_unprintable() {
        assert_eq!(
            sanitize_name(&[0xff, 0x42, 0x43, 0xff, 0x44, 0x45, 0x46, 0x47]),
            "?BC?DEFG"
        );
    }

    #[test]
    fn name_full_width() {
        assert_eq!(sanitize_name(b"E1M1\x00\x00\x00\x00"), "E1M1");
        assert_eq!(sanitize_name(b"DEMO1234"), "DEMO1234");
    }

    #[test]
    fn record_fields() {
        let mut buf = [0u8; RECORD_LEN];
        buf[0..4].copy_from_slice(&0x20u32.to_le_bytes());
        buf[4..8].copy_from_slice(&0x10u32.to_le_bytes());
        buf[8..16].copy_from_slice(b"THINGS\x00\x00");
        let record = parse_record(&buf);
        assert_eq!(record.offset, 0x20);
        assert_eq!(record.length, 0x10);
        assert_eq!(record.name, "THINGS");
    }
}
