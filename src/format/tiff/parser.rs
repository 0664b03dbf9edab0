//! TIFF header and IFD structure parsing.
//!
//! # TIFF Header Structure
//!
//! ## Classic TIFF (8 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42 = 0x002A)
//! Bytes 4-7: Offset to first IFD (4 bytes)
//! ```
//!
//! ## BigTIFF (16 bytes)
//! ```text
//! Bytes 0-1: Byte order
//! Bytes 2-3: Version (43 = 0x002B)
//! Bytes 4-5: Offset byte size (must be 8)
//! Bytes 6-7: Reserved
//! Bytes 8-15: Offset to first IFD (8 bytes)
//! ```

use std::collections::HashMap;

use crate::error::TiffError;

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) declared by a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from the first two bytes of `bytes`.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 2 bytes.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    /// Read a u32 from the first four bytes of `bytes`.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 4 bytes.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    /// Read a u64 from the first eight bytes of `bytes`.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 8 bytes.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }

    #[inline]
    pub const fn is_little_endian(self) -> bool {
        matches!(self, ByteOrder::LittleEndian)
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets)
    pub is_bigtiff: bool,

    /// Offset to the first IFD in the file
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from raw bytes.
    ///
    /// `bytes` must hold at least 8 bytes (16 for BigTIFF). `file_size` is used
    /// to reject a first IFD offset that points past the end of the file.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        let (is_bigtiff, first_ifd_offset) = match version {
            VERSION_TIFF => (false, u64::from(byte_order.read_u32(&bytes[4..8]))),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            _ => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Size of an IFD entry: 12 bytes classic, 20 bytes BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry count field at the start of an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of the next-IFD offset at the end of an IFD, which is also the
    /// size of the value/offset field of each entry.
    #[inline]
    pub const fn value_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Decode an IFD entry count from `ifd_count_size()` bytes.
    pub fn read_entry_count(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            u64::from(self.byte_order.read_u16(bytes))
        }
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// A single 12- or 20-byte IFD entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Numeric tag id
    pub tag_id: u16,

    /// Decoded field type, `None` for types we do not know
    pub field_type: Option<FieldType>,

    /// Raw field type value as stored in the file
    pub field_type_raw: u16,

    /// Number of values
    pub count: u64,

    /// Raw value/offset field (4 or 8 bytes)
    pub value_offset_bytes: Vec<u8>,

    /// Whether the value fits in `value_offset_bytes`
    pub is_inline: bool,
}

impl IfdEntry {
    /// Total byte size of the value, or `None` for unknown field types.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|ft| ft.size_in_bytes() as u64 * self.count)
    }

    /// Interpret the value/offset field as a file offset.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() >= 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            u64::from(byte_order.read_u32(&self.value_offset_bytes))
        }
    }

    /// Read a single inline integer value, widening Byte/Short/Long.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        let bytes = &self.value_offset_bytes;
        match self.field_type? {
            FieldType::Byte | FieldType::Undefined => Some(u64::from(bytes[0])),
            FieldType::Short => Some(u64::from(byte_order.read_u16(bytes))),
            FieldType::Long => Some(u64::from(byte_order.read_u32(bytes))),
            FieldType::Long8 => Some(byte_order.read_u64(bytes)),
            _ => None,
        }
    }

    /// Read a single inline integer value that fits in `u32`.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        self.inline_u64(byte_order)
            .and_then(|v| u32::try_from(v).ok())
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed Image File Directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    /// Entries in file order
    pub entries: Vec<IfdEntry>,

    /// Tag id -> index into `entries`
    pub entries_by_tag: HashMap<u16, usize>,

    /// Offset of the next IFD, 0 for the last one
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Total size in bytes of an IFD with `entry_count` entries.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.value_offset_size()
    }

    /// Parse an IFD from its raw bytes (count, entries and next offset).
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_count = header.read_entry_count(&bytes[..count_size]);
        let required = Self::calculate_size(entry_count, header);
        if bytes.len() < required {
            return Err(TiffError::FileTooSmall {
                required: required as u64,
                actual: bytes.len() as u64,
            });
        }

        let byte_order = header.byte_order;
        let entry_size = header.ifd_entry_size();
        let value_size = header.value_offset_size();

        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut entries_by_tag = HashMap::with_capacity(entry_count as usize);

        for i in 0..entry_count as usize {
            let start = count_size + i * entry_size;
            let raw = &bytes[start..start + entry_size];

            let tag_id = byte_order.read_u16(&raw[0..2]);
            let field_type_raw = byte_order.read_u16(&raw[2..4]);
            let field_type = FieldType::from_u16(field_type_raw);
            let (count, value_bytes) = if header.is_bigtiff {
                (byte_order.read_u64(&raw[4..12]), &raw[12..20])
            } else {
                (u64::from(byte_order.read_u32(&raw[4..8])), &raw[8..12])
            };

            let is_inline = field_type
                .map(|ft| ft.fits_inline(count, header.is_bigtiff))
                .unwrap_or(false);

            entries_by_tag.insert(tag_id, entries.len());
            entries.push(IfdEntry {
                tag_id,
                field_type,
                field_type_raw,
                count,
                value_offset_bytes: value_bytes.to_vec(),
                is_inline,
            });
        }

        let next_start = count_size + entry_count as usize * entry_size;
        let next_bytes = &bytes[next_start..next_start + value_size];
        let next_ifd_offset = if header.is_bigtiff {
            byte_order.read_u64(next_bytes)
        } else {
            u64::from(byte_order.read_u32(next_bytes))
        };

        Ok(Ifd {
            entries,
            entries_by_tag,
            next_ifd_offset,
        })
    }

    /// Look up an entry by tag.
    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entries_by_tag
            .get(&tag.as_u16())
            .and_then(|&idx| self.entries.get(idx))
    }

    /// Inline single-value integer tag, if present.
    pub fn get_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(tag)?.inline_u32(byte_order)
    }

    pub fn is_tiled(&self) -> bool {
        self.get_entry_by_tag(TiffTag::TileOffsets).is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================
