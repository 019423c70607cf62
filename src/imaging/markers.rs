//! Byte-level walkers for the containers image metadata hides in.
//!
//! - JPEG marker segments (APP1 EXIF, COM comments)
//! - Photoshop 8BIM image resources (PSD thumbnails)
//! - PNG chunks and RIFF chunks (EXIF blocks)
//! - TIFF IFD chains (EXIF orientation, RAW embedded previews)
//!
//! Every function works on an in-memory buffer and returns `None` instead of
//! failing on truncated or malformed input.

// ---------------------------------------------------------------------------
// JPEG markers
// ---------------------------------------------------------------------------

/// Find the payload of the first JPEG segment with `marker` whose payload
/// starts with `prefix`. The returned slice excludes the prefix.
///
/// Scanning stops at start-of-scan (0xDA); metadata never follows image data.
pub fn find_jpeg_segment<'a>(data: &'a [u8], marker: u8, prefix: &[u8]) -> Option<&'a [u8]> {
    let mut pos = 2; // skip SOI
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let code = data[pos + 1];
        // fill bytes
        if code == 0xFF {
            pos += 1;
            continue;
        }
        if code == 0xDA || code == 0xD9 {
            break;
        }
        // Markers without length field
        if code == 0x01 || (0xD0..=0xD8).contains(&code) {
            pos += 2;
            continue;
        }
        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if seg_len < 2 {
            break;
        }
        let seg_start = pos + 4;
        let seg_end = (pos + 2 + seg_len).min(data.len());
        if code == marker {
            let segment = &data[seg_start..seg_end];
            if let Some(payload) = segment.strip_prefix(prefix) {
                return Some(payload);
            }
        }
        pos += 2 + seg_len;
    }
    None
}

// ---------------------------------------------------------------------------
// Photoshop 8BIM resources
// ---------------------------------------------------------------------------

const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const BIM_MARKER: &[u8] = b"8BIM";

/// Find resource `id` in a block of 8BIM image resources.
///
/// Each resource: "8BIM" (4) + id (2) + Pascal name padded to even length +
/// data length (4) + data padded to even length.
pub fn find_8bim_resource(block: &[u8], id: u16) -> Option<&[u8]> {
    let data = block.strip_prefix(PHOTOSHOP_HEADER).unwrap_or(block);

    let mut pos = 0;
    while pos + 12 <= data.len() {
        if &data[pos..pos + 4] != BIM_MARKER {
            pos += 1;
            continue;
        }
        pos += 4;
        let resource_id = u16::from_be_bytes([data[pos], data[pos + 1]]);
        pos += 2;

        let name_len = *data.get(pos)? as usize;
        pos += 1 + name_len + ((1 + name_len) % 2);

        let len_bytes = data.get(pos..pos + 4)?;
        let res_len =
            u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        pos += 4;

        let payload = data.get(pos..pos.checked_add(res_len)?)?;
        if resource_id == id {
            return Some(payload);
        }
        pos += res_len + (res_len % 2);
    }
    None
}

// ---------------------------------------------------------------------------
// PNG and RIFF chunks
// ---------------------------------------------------------------------------

/// Find the data of the first PNG chunk of type `kind`.
pub fn find_png_chunk<'a>(data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    let mut pos = 8; // signature
    while pos + 8 <= data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        let chunk_type = &data[pos + 4..pos + 8];
        let start = pos + 8;
        let end = start.checked_add(len)?;
        if chunk_type == kind {
            return data.get(start..end);
        }
        if chunk_type == b"IEND" {
            break;
        }
        pos = end.checked_add(4)?; // CRC
    }
    None
}

/// Find the data of the first top-level chunk `kind` inside a RIFF file.
pub fn find_riff_chunk<'a>(data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    let mut pos = 12; // "RIFF" size form-type
    while pos + 8 <= data.len() {
        let chunk_type = &data[pos..pos + 4];
        let len = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
            as usize;
        let start = pos + 8;
        let end = start.checked_add(len)?;
        if chunk_type == kind {
            return data.get(start..end);
        }
        pos = end + (len % 2);
    }
    None
}

// ---------------------------------------------------------------------------
// TIFF IFDs
// ---------------------------------------------------------------------------

/// One 12-byte IFD entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    pub typ: u16,
    pub count: u32,
    /// Offset of the 4-byte value field inside the buffer.
    pub field_offset: usize,
}

/// Endian-aware reader over a TIFF structure held in memory.
pub struct TiffReader<'a> {
    data: &'a [u8],
    big_endian: bool,
}

// TIFF type sizes: count is number of values, not bytes.
fn type_size(typ: u16) -> usize {
    match typ {
        1 | 2 | 6 | 7 => 1,    // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => 2,            // SHORT, SSHORT
        4 | 9 | 11 | 13 => 4,  // LONG, SLONG, FLOAT, IFD
        5 | 10 | 12 => 8,      // RATIONAL, SRATIONAL, DOUBLE
        _ => 1,
    }
}

impl<'a> TiffReader<'a> {
    /// Parse the 8-byte TIFF header. Accepts the standard magic 42 plus the
    /// variants used by Panasonic (0x55) and Olympus (0x4F52, 0x5352) RAW files.
    pub fn new(data: &'a [u8]) -> Option<Self> {
        let big_endian = match data.get(0..2)? {
            b"MM" => true,
            b"II" => false,
            _ => return None,
        };
        let reader = Self { data, big_endian };
        match reader.read_u16(2)? {
            42 | 0x55 | 0x4F52 | 0x5352 => Some(reader),
            _ => None,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let b = self.data.get(offset..offset + 2)?;
        Some(if self.big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    }

    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let b = self.data.get(offset..offset + 4)?;
        Some(if self.big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    pub fn first_ifd(&self) -> Option<usize> {
        self.read_u32(4).map(|o| o as usize).filter(|&o| o > 0)
    }

    /// Entries of the IFD at `offset` plus the offset of the next IFD in the chain.
    pub fn read_ifd(&self, offset: usize) -> Option<(Vec<IfdEntry>, Option<usize>)> {
        let count = self.read_u16(offset)? as usize;
        let entries_start = offset + 2;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let at = entries_start + i * 12;
            entries.push(IfdEntry {
                tag: self.read_u16(at)?,
                typ: self.read_u16(at + 2)?,
                count: self.read_u32(at + 4)?,
                field_offset: at + 8,
            });
        }
        let next = self
            .read_u32(entries_start + count * 12)
            .map(|o| o as usize)
            .filter(|&o| o > 0 && o != offset);
        Some((entries, next))
    }

    /// First value of a SHORT or LONG entry.
    pub fn value(&self, entry: &IfdEntry) -> Option<u32> {
        match entry.typ {
            3 => self.read_u16(entry.field_offset).map(u32::from),
            4 | 13 => self.read_u32(entry.field_offset),
            _ => None,
        }
    }

    /// All values of a SHORT/LONG entry, following the offset when they do
    /// not fit inline.
    pub fn values(&self, entry: &IfdEntry) -> Vec<u32> {
        let size = type_size(entry.typ);
        let count = entry.count as usize;
        let Some(byte_len) = count.checked_mul(size) else {
            return Vec::new();
        };
        let base = if byte_len <= 4 {
            entry.field_offset
        } else {
            match self.read_u32(entry.field_offset) {
                Some(o) => o as usize,
                None => return Vec::new(),
            }
        };
        (0..count)
            .map_while(|i| match entry.typ {
                3 => self.read_u16(base + i * 2).map(u32::from),
                4 | 13 => self.read_u32(base + i * 4),
                _ => None,
            })
            .collect()
    }
}
