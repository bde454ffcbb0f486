#![cfg_attr(not(feature = "std"), no_std)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Pixel encodings the sensor can deliver into the frame buffer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb565,
    Yuv422,
    Jpeg,
    Grayscale,
}

impl PixelFormat {
    /// Bytes per pixel of the raw encoding, `None` for compressed formats
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => Some(2),
            PixelFormat::Grayscale => Some(1),
            PixelFormat::Jpeg => None,
        }
    }

    /// Whether frames in this format are served as BMP565
    pub fn converts_to_rgb565(&self) -> bool {
        matches!(self, PixelFormat::Rgb565 | PixelFormat::Yuv422)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Yuv422 => "YUV422",
            PixelFormat::Jpeg => "JPEG",
            PixelFormat::Grayscale => "GRAYSCALE",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a pixel format name is not recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPixelFormat;

impl fmt::Display for UnknownPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown pixel format (expected rgb565, yuv422, jpeg or grayscale)")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UnknownPixelFormat {}

impl FromStr for PixelFormat {
    type Err = UnknownPixelFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("rgb565") {
            Ok(PixelFormat::Rgb565)
        } else if s.eq_ignore_ascii_case("yuv422") {
            Ok(PixelFormat::Yuv422)
        } else if s.eq_ignore_ascii_case("jpeg") || s.eq_ignore_ascii_case("jpg") {
            Ok(PixelFormat::Jpeg)
        } else if s.eq_ignore_ascii_case("grayscale") || s.eq_ignore_ascii_case("gray") {
            Ok(PixelFormat::Grayscale)
        } else {
            Err(UnknownPixelFormat)
        }
    }
}

/// Geometry and encoding of a captured frame
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameGeometry {
    pub const QVGA_WIDTH: u32 = 320;
    pub const QVGA_HEIGHT: u32 = 240;

    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// 320x240, the reference geometry of the OV7670/OV7725 sensors
    pub fn qvga(format: PixelFormat) -> Self {
        Self::new(Self::QVGA_WIDTH, Self::QVGA_HEIGHT, format)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of an uncompressed frame, `None` for JPEG whose size varies per frame
    pub fn raw_byte_size(&self) -> Option<usize> {
        self.format
            .bytes_per_pixel()
            .map(|bpp| self.pixel_count() * bpp)
    }

    /// Size of the frame after conversion to 16-bit RGB565
    pub fn rgb565_byte_size(&self) -> usize {
        self.pixel_count() * 2
    }
}

/// Capture pipeline status reported by the command console
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraStatus {
    pub geometry: FrameGeometry,
    pub movie_mode: bool,
    pub frames_captured: u64,
    pub capture_failures: u64,
    /// Sequence number of the frame currently served, 0 before the first capture
    pub sequence: u64,
    pub frame_len: usize,
}
