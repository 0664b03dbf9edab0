//! TIFF tag value reading.
//!
//! Values are either stored inline in the IFD entry or at an offset in the
//! file. Arrays are fetched with a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values from a TIFF file, respecting its byte order.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes of an entry's value, inline or fetched from its offset.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size as usize)?)
        }
    }

    /// First value of an integer entry, widened to u64.
    ///
    /// Multi-valued entries such as BitsPerSample for RGB planes repeat the
    /// same value per sample, so the first one is representative.
    pub fn read_first_u64(&self, entry: &IfdEntry, tag: &'static str) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        self.read_u64_array(entry, tag)?
            .first()
            .copied()
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag,
                message: "entry has no values".to_string(),
            })
    }

    /// Integer array (Byte, Short, Long or Long8), widened to u64.
    pub fn read_u64_array(&self, entry: &IfdEntry, tag: &'static str) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        let bytes = self.read_bytes(entry)?;
        parse_u64_array(&bytes, field_type, entry.count, self.header.byte_order, tag)
    }

    /// ASCII value with the trailing NUL (and anything after it) removed.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        let bytes = self.read_bytes(entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Decode `count` integers of `field_type` from `bytes`.
pub fn parse_u64_array(
    bytes: &[u8],
    field_type: FieldType,
    count: u64,
    byte_order: ByteOrder,
    tag: &'static str,
) -> Result<Vec<u64>, TiffError> {
    let width = field_type.size_in_bytes();
    let needed = width * count as usize;
    if bytes.len() < needed {
        return Err(TiffError::InvalidTagValue {
            tag,
            message: format!("expected {} bytes, got {}", needed, bytes.len()),
        });
    }

    let values = bytes[..needed].chunks_exact(width);
    match field_type {
        FieldType::Byte | FieldType::Undefined => Ok(values.map(|c| u64::from(c[0])).collect()),
        FieldType::Short => Ok(values
            .map(|c| u64::from(byte_order.read_u16(c)))
            .collect()),
        FieldType::Long => Ok(values
            .map(|c| u64::from(byte_order.read_u32(c)))
            .collect()),
        FieldType::Long8 => Ok(values.map(|c| byte_order.read_u64(c)).collect()),
        other => Err(TiffError::InvalidTagValue {
            tag,
            message: format!("expected an unsigned integer type, got {:?}", other),
        }),
    }
}
