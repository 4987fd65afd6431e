//! TIFF header and IFD (Image File Directory) parsing.
//!
//! Works on byte slices fetched through range requests, so no `Read + Seek`
//! is needed. Tag values up to 4 bytes live inside the entry; larger
//! values are stored elsewhere in the file and fetched by the caller, then
//! decoded with the same helpers as inline values.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{CloudError, Result};

/// Byte order of the TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffByteOrder {
    LittleEndian,
    BigEndian,
}

/// TIFF tag IDs used by the reader.
pub mod tags {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GEO_DOUBLE_PARAMS: u16 = 34736;
    pub const GDAL_NODATA: u16 = 42113;
}

/// TIFF field type IDs.
pub mod field_type {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const SBYTE: u16 = 6;
    pub const UNDEFINED: u16 = 7;
    pub const SSHORT: u16 = 8;
    pub const SLONG: u16 = 9;
    pub const SRATIONAL: u16 = 10;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;
    pub const LONG8: u16 = 16;
}

/// Size in bytes of one value of a field type.
fn field_size(type_id: u16) -> usize {
    use field_type::*;
    match type_id {
        BYTE | ASCII | SBYTE | UNDEFINED => 1,
        SHORT | SSHORT => 2,
        LONG | SLONG | FLOAT => 4,
        RATIONAL | SRATIONAL | DOUBLE | LONG8 => 8,
        _ => 1,
    }
}

/// One 12-byte IFD entry, value not yet resolved.
#[derive(Debug, Clone)]
pub struct RawTagEntry {
    pub tag: u16,
    pub type_id: u16,
    pub count: u32,
    /// The 4 value bytes exactly as stored (inline value or offset).
    pub value_bytes: [u8; 4],
}

impl RawTagEntry {
    /// Total size of the value in bytes.
    pub fn value_size(&self) -> u64 {
        field_size(self.type_id) as u64 * self.count as u64
    }

    /// Whether the value fits in the entry itself.
    pub fn is_inline(&self) -> bool {
        self.value_size() <= 4
    }

    /// File offset of an out-of-line value.
    pub fn value_offset(&self, order: TiffByteOrder) -> u64 {
        read_u32(order, &self.value_bytes) as u64
    }
}

/// Parsed 8-byte TIFF header.
#[derive(Debug, Clone)]
pub struct TiffHeader {
    pub byte_order: TiffByteOrder,
    pub first_ifd_offset: u64,
}

/// Entries of one IFD and the offset of the next one (0 = end of chain).
#[derive(Debug, Clone)]
pub struct RawIfd {
    pub entries: Vec<RawTagEntry>,
    pub next_ifd_offset: u64,
}

impl RawIfd {
    pub fn entry(&self, tag: u16) -> Option<&RawTagEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }
}

/// Image structure of one IFD (full resolution or an overview).
#[derive(Debug, Clone)]
pub struct IfdInfo {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_offsets: Vec<u64>,
    pub tile_byte_counts: Vec<u64>,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub predictor: u16,
    pub samples_per_pixel: u16,
}

impl IfdInfo {
    /// Bytes in one decompressed tile.
    pub fn tile_bytes(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize * self.bytes_per_sample()
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Reject layouts the reader cannot decode.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CloudError::InvalidTiff {
                reason: format!("empty image {}x{}", self.width, self.height),
            });
        }
        if self.tile_width == 0 || self.tile_height == 0 || self.tile_offsets.is_empty() {
            return Err(CloudError::UnsupportedLayout(
                "striped TIFF (COGs must be tiled)".into(),
            ));
        }
        if self.samples_per_pixel != 1 {
            return Err(CloudError::UnsupportedLayout(format!(
                "{} samples per pixel (single-band only)",
                self.samples_per_pixel
            )));
        }
        if self.tile_offsets.len() != self.tile_byte_counts.len() {
            return Err(CloudError::InvalidTiff {
                reason: format!(
                    "{} tile offsets but {} byte counts",
                    self.tile_offsets.len(),
                    self.tile_byte_counts.len()
                ),
            });
        }
        Ok(())
    }
}

/// Parse the TIFF header.
pub fn parse_header(data: &[u8]) -> Result<TiffHeader> {
    if data.len() < 8 {
        return Err(CloudError::InvalidTiff {
            reason: "header too short".into(),
        });
    }

    let byte_order = match &data[0..2] {
        b"II" => TiffByteOrder::LittleEndian,
        b"MM" => TiffByteOrder::BigEndian,
        _ => {
            return Err(CloudError::InvalidTiff {
                reason: "invalid byte order marker".into(),
            })
        }
    };

    match read_u16(byte_order, &data[2..4]) {
        42 => {}
        43 => return Err(CloudError::UnsupportedLayout("BigTIFF".into())),
        magic => {
            return Err(CloudError::InvalidTiff {
                reason: format!("expected magic 42, got {magic}"),
            })
        }
    }

    Ok(TiffHeader {
        byte_order,
        first_ifd_offset: read_u32(byte_order, &data[4..8]) as u64,
    })
}

/// Number of bytes an IFD with `entry_count` entries occupies.
pub fn ifd_size(entry_count: usize) -> usize {
    2 + entry_count * 12 + 4
}

/// Read the entry count at the start of an IFD.
pub fn ifd_entry_count(order: TiffByteOrder, data: &[u8]) -> Result<usize> {
    if data.len() < 2 {
        return Err(CloudError::InvalidTiff {
            reason: "IFD too short".into(),
        });
    }
    Ok(read_u16(order, &data[0..2]) as usize)
}

/// Parse one IFD; `data` starts at the IFD offset.
pub fn parse_ifd(order: TiffByteOrder, data: &[u8]) -> Result<RawIfd> {
    let count = ifd_entry_count(order, data)?;
    let needed = ifd_size(count);
    if data.len() < needed {
        return Err(CloudError::InvalidTiff {
            reason: format!("IFD needs {} bytes but only {} available", needed, data.len()),
        });
    }

    let entries = data[2..2 + count * 12]
        .chunks_exact(12)
        .map(|e| {
            let mut value_bytes = [0u8; 4];
            value_bytes.copy_from_slice(&e[8..12]);
            RawTagEntry {
                tag: read_u16(order, &e[0..2]),
                type_id: read_u16(order, &e[2..4]),
                count: read_u32(order, &e[4..8]),
                value_bytes,
            }
        })
        .collect();

    Ok(RawIfd {
        entries,
        next_ifd_offset: read_u32(order, &data[needed - 4..needed]) as u64,
    })
}

// ---------------------------------------------------------------------------
// Value decoding
// ---------------------------------------------------------------------------

/// Decode integer values (BYTE, SHORT, LONG, LONG8 and signed variants).
///
/// `data` holds the value bytes: the entry's `value_bytes` when inline,
/// otherwise the bytes fetched from the value offset.
pub fn decode_u64s(order: TiffByteOrder, entry: &RawTagEntry, data: &[u8]) -> Vec<u64> {
    use field_type::*;
    let size = field_size(entry.type_id);
    data.chunks_exact(size)
        .take(entry.count as usize)
        .filter_map(|c| match entry.type_id {
            BYTE | UNDEFINED => Some(c[0] as u64),
            SBYTE => Some(c[0] as i8 as u64),
            SHORT => Some(read_u16(order, c) as u64),
            SSHORT => Some(read_u16(order, c) as i16 as u64),
            LONG => Some(read_u32(order, c) as u64),
            SLONG => Some(read_u32(order, c) as i32 as u64),
            LONG8 => Some(match order {
                TiffByteOrder::LittleEndian => LittleEndian::read_u64(c),
                TiffByteOrder::BigEndian => BigEndian::read_u64(c),
            }),
            _ => None,
        })
        .collect()
}

/// Decode floating point values (FLOAT, DOUBLE).
pub fn decode_f64s(order: TiffByteOrder, entry: &RawTagEntry, data: &[u8]) -> Vec<f64> {
    let size = field_size(entry.type_id);
    data.chunks_exact(size)
        .take(entry.count as usize)
        .filter_map(|c| match (entry.type_id, order) {
            (field_type::DOUBLE, TiffByteOrder::LittleEndian) => Some(LittleEndian::read_f64(c)),
            (field_type::DOUBLE, TiffByteOrder::BigEndian) => Some(BigEndian::read_f64(c)),
            (field_type::FLOAT, TiffByteOrder::LittleEndian) => {
                Some(LittleEndian::read_f32(c) as f64)
            }
            (field_type::FLOAT, TiffByteOrder::BigEndian) => Some(BigEndian::read_f32(c) as f64),
            _ => None,
        })
        .collect()
}

/// Decode a NUL-terminated ASCII value.
pub fn decode_ascii(entry: &RawTagEntry, data: &[u8]) -> String {
    let bytes = &data[..(entry.count as usize).min(data.len())];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Tag values of one IFD, keyed by tag, ready for decoding.
///
/// Inline values are taken from the entry; out-of-line values are added
/// once fetched.
#[derive(Debug, Clone)]
pub struct TagValues {
    order: TiffByteOrder,
    values: HashMap<u16, (RawTagEntry, Vec<u8>)>,
}

impl TagValues {
    /// Collect inline values; returns the entries still to be fetched.
    pub fn from_ifd(order: TiffByteOrder, ifd: &RawIfd) -> (Self, Vec<RawTagEntry>) {
        let mut values = HashMap::new();
        let mut pending = Vec::new();
        for entry in &ifd.entries {
            if entry.is_inline() {
                values.insert(entry.tag, (entry.clone(), entry.value_bytes.to_vec()));
            } else {
                pending.push(entry.clone());
            }
        }
        (Self { order, values }, pending)
    }

    /// Add the fetched bytes of an out-of-line entry.
    pub fn insert(&mut self, entry: RawTagEntry, data: Vec<u8>) {
        self.values.insert(entry.tag, (entry, data));
    }

    pub fn byte_order(&self) -> TiffByteOrder {
        self.order
    }

    pub fn contains(&self, tag: u16) -> bool {
        self.values.contains_key(&tag)
    }

    pub fn u64s(&self, tag: u16) -> Option<Vec<u64>> {
        let (entry, data) = self.values.get(&tag)?;
        Some(decode_u64s(self.order, entry, data)).filter(|v| !v.is_empty())
    }

    /// First integer value of a tag.
    pub fn u64(&self, tag: u16) -> Option<u64> {
        self.u64s(tag)?.first().copied()
    }

    pub fn f64s(&self, tag: u16) -> Option<Vec<f64>> {
        let (entry, data) = self.values.get(&tag)?;
        Some(decode_f64s(self.order, entry, data)).filter(|v| !v.is_empty())
    }

    pub fn ascii(&self, tag: u16) -> Option<String> {
        let (entry, data) = self.values.get(&tag)?;
        Some(decode_ascii(entry, data))
    }
}

pub(crate) fn read_u16(order: TiffByteOrder, data: &[u8]) -> u16 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u16(data),
        TiffByteOrder::BigEndian => BigEndian::read_u16(data),
    }
}

pub(crate) fn read_u32(order: TiffByteOrder, data: &[u8]) -> u32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u32(data),
        TiffByteOrder::BigEndian => BigEndian::read_u32(data),
    }
}
