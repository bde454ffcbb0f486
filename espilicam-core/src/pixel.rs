//! Scanline conversion from the sensor's packed encoding to RGB565.
//!
//! The camera DMA stores two horizontally adjacent pixels per 32-bit little-endian
//! word. For YUV422 the word bytes are `Y1 V Y2 U`; for RGB565 each pixel is
//! stored high byte first and the pair is packed second-pixel-first.
//! Output pixels are written little-endian, the byte order BMP565 expects.

use espilicam_shared::PixelFormat;

use crate::error::ConvertError;

/// Bytes per output pixel
pub const RGB565_BYTES: usize = 2;

#[inline]
pub fn clamp(n: i32) -> u8 {
    n.clamp(0, 255) as u8
}

/// Pack 8-bit channels into a 5-6-5 value
#[inline]
pub fn color565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// Fixed-point BT.601 conversion, 10 fractional bits
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let a0 = 1192 * c;
    let r = (a0 + 1634 * e) >> 10;
    let g = (a0 - 832 * e - 400 * d) >> 10;
    let b = (a0 + 2066 * d) >> 10;
    (clamp(r), clamp(g), clamp(b))
}

#[inline]
pub fn yuv_to_rgb565(y: u8, u: u8, v: u8) -> u16 {
    let (r, g, b) = yuv_to_rgb(y, u, v);
    color565(r, g, b)
}

/// Floating point variant of [`yuv_to_rgb565`]. Slower on the target, same result within 1 LSB.
pub fn yuv_to_rgb565_float(y: u8, u: u8, v: u8) -> u16 {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;

    let r = clamp((1.164 * c + 1.596 * e) as i32);
    let g = clamp((1.164 * c - 0.392 * d - 0.813 * e) as i32);
    let b = clamp((1.164 * c + 2.017 * d) as i32);
    color565(r, g, b)
}

#[inline]
fn unpack(byte_number: u32, value: u32) -> u8 {
    (value >> (byte_number * 8)) as u8
}

/// Convert one scanline of `width` pixels.
///
/// `src` must hold at least `width / 2` packed words and `dst` at least
/// `width * 2` bytes. Nothing beyond those lengths is read or written.
pub fn convert_scanline(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    format: PixelFormat,
) -> Result<(), ConvertError> {
    if width % 2 != 0 {
        return Err(ConvertError::OddWidth(width));
    }
    let needed = width * RGB565_BYTES;
    if src.len() < needed {
        return Err(ConvertError::SourceTooShort {
            needed,
            available: src.len(),
        });
    }
    if dst.len() < needed {
        return Err(ConvertError::DestinationTooShort {
            needed,
            available: dst.len(),
        });
    }

    let words = src[..needed].chunks_exact(4);
    let pairs = dst[..needed].chunks_exact_mut(4);

    match format {
        PixelFormat::Yuv422 => {
            for (word, out) in words.zip(pairs) {
                let long2px = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                let y1 = unpack(0, long2px);
                let v = unpack(1, long2px);
                let y2 = unpack(2, long2px);
                let u = unpack(3, long2px);

                out[..2].copy_from_slice(&yuv_to_rgb565(y1, u, v).to_le_bytes());
                out[2..].copy_from_slice(&yuv_to_rgb565(y2, u, v).to_le_bytes());
            }
        }
        PixelFormat::Rgb565 => {
            for (word, out) in words.zip(pairs) {
                let long2px = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                let first = (unpack(2, long2px) as u16) << 8 | unpack(3, long2px) as u16;
                let second = (unpack(0, long2px) as u16) << 8 | unpack(1, long2px) as u16;

                out[..2].copy_from_slice(&first.to_le_bytes());
                out[2..].copy_from_slice(&second.to_le_bytes());
            }
        }
        other => return Err(ConvertError::UnsupportedFormat(other)),
    }
    Ok(())
}

/// Rewrite a frame delivered in pixel order into the packed words [`convert_scanline`] reads.
///
/// Drivers that emit pixels in order store RGB565 high byte first,
/// `P0 P1` per pair, and YUV422 as `Y0 U Y1 V`. Other formats are left untouched.
pub fn repack_pixel_order(data: &mut [u8], format: PixelFormat) {
    match format {
        PixelFormat::Rgb565 => {
            for word in data.chunks_exact_mut(4) {
                word.rotate_left(2);
            }
        }
        PixelFormat::Yuv422 => {
            for word in data.chunks_exact_mut(4) {
                word.swap(1, 3);
            }
        }
        PixelFormat::Jpeg | PixelFormat::Grayscale => {}
    }
}
