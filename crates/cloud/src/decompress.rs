//! Tile decoding: decompression, predictor undo and sample conversion.
//!
//! Supports DEFLATE (via `flate2`), LZW (via `weezl`) and uncompressed
//! tiles, with the horizontal differencing predictor for integer samples.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use num_traits::NumCast;
use ndvits_core::RasterElement;

use crate::error::{CloudError, Result};
use crate::ifd::TiffByteOrder;

/// TIFF compression codes.
pub mod compression {
    pub const NONE: u16 = 1;
    pub const LZW: u16 = 5;
    pub const DEFLATE: u16 = 8;
    pub const ADOBE_DEFLATE: u16 = 32946;
}

/// TIFF sample format codes.
pub mod sample_format {
    pub const UNSIGNED_INT: u16 = 1;
    pub const SIGNED_INT: u16 = 2;
    pub const FLOAT: u16 = 3;
}

/// TIFF predictor codes.
pub mod predictor {
    pub const NONE: u16 = 1;
    pub const HORIZONTAL: u16 = 2;
    pub const FLOATING_POINT: u16 = 3;
}

/// Decompress raw tile bytes according to the compression method.
pub fn decompress_tile(data: &[u8], compression_code: u16, expected_raw_size: usize) -> Result<Vec<u8>> {
    #[cfg(not(feature = "deflate"))]
    let _ = expected_raw_size;
    match compression_code {
        compression::NONE => Ok(data.to_vec()),

        #[cfg(feature = "deflate")]
        compression::DEFLATE | compression::ADOBE_DEFLATE => {
            use std::io::Read;
            // Tiles are normally zlib-wrapped; some writers emit raw deflate.
            let mut out = Vec::with_capacity(expected_raw_size);
            if flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
                return Ok(out);
            }
            out.clear();
            flate2::read::DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| CloudError::Decompress(format!("DEFLATE: {e}")))?;
            Ok(out)
        }

        #[cfg(feature = "lzw")]
        compression::LZW => {
            weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                .decode(data)
                .map_err(|e| CloudError::Decompress(format!("LZW: {e}")))
        }

        _ => Err(CloudError::UnsupportedCompression(compression_code)),
    }
}

/// Reverse the TIFF predictor in place.
///
/// `row_samples` is the tile width. Horizontal differencing is undone with
/// wrapping integer addition at the sample width, honouring byte order.
pub fn undo_predictor(
    raw: &mut [u8],
    predictor_code: u16,
    bits_per_sample: u16,
    sample_format_code: u16,
    row_samples: usize,
    order: TiffByteOrder,
) -> Result<()> {
    match predictor_code {
        0 | predictor::NONE => Ok(()),
        predictor::HORIZONTAL if sample_format_code != sample_format::FLOAT => {
            match bits_per_sample {
                8 => {
                    for row in raw.chunks_mut(row_samples) {
                        for i in 1..row.len() {
                            row[i] = row[i].wrapping_add(row[i - 1]);
                        }
                    }
                    Ok(())
                }
                16 => {
                    accumulate(raw, row_samples * 2, 2, |b| read16(order, b), |b, v| write16(order, b, v));
                    Ok(())
                }
                32 => {
                    accumulate(raw, row_samples * 4, 4, |b| read32(order, b), |b, v| write32(order, b, v));
                    Ok(())
                }
                bps => Err(CloudError::UnsupportedPredictor {
                    predictor: predictor_code,
                    bps,
                }),
            }
        }
        _ => Err(CloudError::UnsupportedPredictor {
            predictor: predictor_code,
            bps: bits_per_sample,
        }),
    }
}

fn accumulate<R, W>(raw: &mut [u8], row_bytes: usize, width: usize, read: R, write: W)
where
    R: Fn(&[u8]) -> u32,
    W: Fn(&mut [u8], u32),
{
    let mask = if width == 4 { u32::MAX } else { (1u32 << (width * 8)) - 1 };
    for row in raw.chunks_mut(row_bytes) {
        let mut prev = 0u32;
        for (i, sample) in row.chunks_exact_mut(width).enumerate() {
            let v = if i == 0 {
                read(sample)
            } else {
                read(sample).wrapping_add(prev) & mask
            };
            write(sample, v);
            prev = v;
        }
    }
}

fn read16(order: TiffByteOrder, b: &[u8]) -> u32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u16(b) as u32,
        TiffByteOrder::BigEndian => BigEndian::read_u16(b) as u32,
    }
}

fn write16(order: TiffByteOrder, b: &mut [u8], v: u32) {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::write_u16(b, v as u16),
        TiffByteOrder::BigEndian => BigEndian::write_u16(b, v as u16),
    }
}

fn read32(order: TiffByteOrder, b: &[u8]) -> u32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u32(b),
        TiffByteOrder::BigEndian => BigEndian::read_u32(b),
    }
}

fn write32(order: TiffByteOrder, b: &mut [u8], v: u32) {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::write_u32(b, v),
        TiffByteOrder::BigEndian => BigEndian::write_u32(b, v),
    }
}

/// Convert decoded tile bytes into values of `T`.
///
/// Values that do not fit `T` become `T::fill_value()`.
pub fn bytes_to_typed<T: RasterElement>(
    raw: &[u8],
    bits_per_sample: u16,
    sample_format_code: u16,
    order: TiffByteOrder,
) -> Result<Vec<T>> {
    use sample_format::*;
    let bps = bits_per_sample;
    let sf = sample_format_code;

    let width = (bps as usize).div_ceil(8);
    if width == 0 || raw.len() % width != 0 {
        return Err(CloudError::Decompress(format!(
            "tile length {} not a multiple of {}-bit samples",
            raw.len(),
            bps
        )));
    }

    let le = order == TiffByteOrder::LittleEndian;
    let decode: fn(&[u8], bool) -> f64 = match (bps, sf) {
        (8, UNSIGNED_INT) => |b, _| b[0] as f64,
        (8, SIGNED_INT) => |b, _| b[0] as i8 as f64,
        (16, UNSIGNED_INT) => |b, le| (if le { LittleEndian::read_u16(b) } else { BigEndian::read_u16(b) }) as f64,
        (16, SIGNED_INT) => |b, le| (if le { LittleEndian::read_i16(b) } else { BigEndian::read_i16(b) }) as f64,
        (32, UNSIGNED_INT) => |b, le| (if le { LittleEndian::read_u32(b) } else { BigEndian::read_u32(b) }) as f64,
        (32, SIGNED_INT) => |b, le| (if le { LittleEndian::read_i32(b) } else { BigEndian::read_i32(b) }) as f64,
        (32, FLOAT) => |b, le| (if le { LittleEndian::read_f32(b) } else { BigEndian::read_f32(b) }) as f64,
        (64, FLOAT) => |b, le| if le { LittleEndian::read_f64(b) } else { BigEndian::read_f64(b) },
        _ => return Err(CloudError::UnsupportedDataType { bps, sf }),
    };

    Ok(raw
        .chunks_exact(width)
        .map(|b| NumCast::from(decode(b, le)).unwrap_or_else(T::fill_value))
        .collect())
}
