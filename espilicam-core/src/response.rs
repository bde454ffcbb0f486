//! Rendering a captured frame as an HTTP body or multipart part.

use std::io::{self, Write};

use espilicam_shared::PixelFormat;

use crate::bitmap::bmp565_header;
use crate::frame::Frame;
use crate::http::{
    Route, BITMAP_CONTENT_TYPE, HTTP_OK, JPEG_CONTENT_TYPE, PGM_CONTENT_TYPE, STREAM_BOUNDARY_LINE,
    TEXT_CONTENT_TYPE,
};
use crate::pixel::{convert_scanline, RGB565_BYTES};

/// How a frame is put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Body {
    /// BMP565 header followed by converted scanlines
    Bitmap,
    Jpeg,
    /// PGM header followed by the 8-bit samples
    Pgm,
    /// Frame buffer bytes as a file download
    Download,
    /// Plain text description of the frame
    Info,
}

impl Body {
    /// Pick the body for `route` given the frame that is about to be served
    pub fn select(route: Route, frame: &Frame) -> Self {
        let format = frame.geometry().format;
        let body = match (route, format) {
            (Route::Pgm, PixelFormat::Grayscale) => Body::Pgm,
            (Route::Pgm, _) => Body::Info,
            (_, PixelFormat::Rgb565 | PixelFormat::Yuv422) => Body::Bitmap,
            (Route::Raw, _) => Body::Download,
            (_, PixelFormat::Jpeg) => Body::Jpeg,
            (_, PixelFormat::Grayscale) => Body::Pgm,
        };

        // A frame that cannot be converted is described rather than sent half-filled
        match body {
            Body::Bitmap if !bitmap_ready(frame) => Body::Info,
            Body::Pgm if frame.len() < frame.geometry().pixel_count() => Body::Info,
            other => other,
        }
    }
}

/// Whether every scanline of `frame` is present and convertible
fn bitmap_ready(frame: &Frame) -> bool {
    let geometry = frame.geometry();
    geometry.width % 2 == 0
        && geometry.format.converts_to_rgb565()
        && frame.len() >= geometry.rgb565_byte_size()
}

/// One-line description of the frame, used for the text fallback and the download header
pub fn mime_info(frame: &Frame) -> String {
    let geometry = frame.geometry();
    format!(
        "format={} width={} height={} length={} sequence={}",
        geometry.format,
        geometry.width,
        geometry.height,
        frame.len(),
        frame.sequence()
    )
}

/// Write a complete single-image response, status line included
pub fn write_single<W: Write>(
    out: &mut W,
    route: Route,
    frame: &Frame,
    line: &mut Vec<u8>,
) -> io::Result<Body> {
    let body = Body::select(route, frame);
    out.write_all(HTTP_OK)?;
    if body == Body::Download {
        write_download_headers(out, frame)?;
        out.write_all(frame.data())?;
    } else {
        write_body(out, body, frame, line)?;
    }
    out.flush()?;
    Ok(body)
}

/// Write one multipart part: boundary line, content type, payload, CRLF
pub fn write_stream_part<W: Write>(
    out: &mut W,
    frame: &Frame,
    line: &mut Vec<u8>,
) -> io::Result<Body> {
    let body = Body::select(Route::Stream, frame);
    out.write_all(STREAM_BOUNDARY_LINE)?;
    write_body(out, body, frame, line)?;
    out.write_all(b"\r\n")?;
    out.flush()?;
    Ok(body)
}

/// Content type line and payload for `body`. `Download` is only reachable on `/get`.
fn write_body<W: Write>(out: &mut W, body: Body, frame: &Frame, line: &mut Vec<u8>) -> io::Result<()> {
    match body {
        Body::Bitmap => {
            out.write_all(BITMAP_CONTENT_TYPE)?;
            write_bitmap(out, frame, line)
        }
        Body::Jpeg => {
            out.write_all(JPEG_CONTENT_TYPE)?;
            out.write_all(frame.data())
        }
        Body::Pgm => {
            out.write_all(PGM_CONTENT_TYPE)?;
            write_pgm(out, frame)
        }
        Body::Info | Body::Download => {
            out.write_all(TEXT_CONTENT_TYPE)?;
            writeln!(out, "{}", mime_info(frame))
        }
    }
}

fn write_download_headers<W: Write>(out: &mut W, frame: &Frame) -> io::Result<()> {
    let extension = match frame.geometry().format {
        PixelFormat::Jpeg => "jpg",
        _ => "raw",
    };
    write!(
        out,
        "Content-type: application/octet-stream\r\n\
         Content-Disposition: attachment; filename=\"frame.{}\"\r\n\
         X-Frame-Info: {}\r\n\r\n",
        extension,
        mime_info(frame)
    )
}

/// BMP565 header followed by every scanline converted through `line`.
///
/// `line` is resized for the frame width and reused across frames.
pub fn write_bitmap<W: Write>(out: &mut W, frame: &Frame, line: &mut Vec<u8>) -> io::Result<()> {
    let geometry = frame.geometry();
    let width = geometry.width as usize;
    line.resize(width * RGB565_BYTES, 0);

    out.write_all(&bmp565_header(geometry.width, geometry.height))?;
    for row in 0..geometry.height as usize {
        let src = frame.scanline(row).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, format!("frame ends before row {row}"))
        })?;
        convert_scanline(src, line, width, geometry.format)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        out.write_all(line)?;
    }
    Ok(())
}

pub fn write_pgm<W: Write>(out: &mut W, frame: &Frame) -> io::Result<()> {
    let geometry = frame.geometry();
    writeln!(out, "P5 {} {} 255", geometry.width, geometry.height)?;
    out.write_all(&frame.data()[..geometry.pixel_count().min(frame.len())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::BMP565_HEADER_SIZE;
    use crate::error::CaptureError;
    use crate::frame::{FrameInfo, FrameStore};
    use espilicam_shared::FrameGeometry;
    use std::sync::Arc;

    /// Publish one frame with `data` and return it
    fn frame(geometry: FrameGeometry, data: &[u8]) -> Arc<Frame> {
        let store = FrameStore::new(data.len().max(1), geometry).unwrap();
        store
            .capture_with(|buf: &mut [u8]| -> Result<FrameInfo, CaptureError> {
                buf[..data.len()].copy_from_slice(data);
                Ok(FrameInfo {
                    len: data.len(),
                    geometry,
                })
            })
            .unwrap();
        store.latest()
    }

    fn split_body(response: &[u8]) -> (&str, &[u8]) {
        let end = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .unwrap();
        (
            std::str::from_utf8(&response[..end]).unwrap(),
            &response[end + 4..],
        )
    }

    #[test]
    fn test_body_selection() {
        let rgb = frame(FrameGeometry::new(2, 1, PixelFormat::Rgb565), &[0; 4]);
        let jpeg = frame(FrameGeometry::new(2, 1, PixelFormat::Jpeg), &[0xFF, 0xD8]);
        let gray = frame(FrameGeometry::new(2, 1, PixelFormat::Grayscale), &[1, 2]);

        assert_eq!(Body::select(Route::Default, &rgb), Body::Bitmap);
        assert_eq!(Body::select(Route::Raw, &rgb), Body::Bitmap);
        assert_eq!(Body::select(Route::Pgm, &rgb), Body::Info);
        assert_eq!(Body::select(Route::Bitmap, &jpeg), Body::Jpeg);
        assert_eq!(Body::select(Route::Stream, &jpeg), Body::Jpeg);
        assert_eq!(Body::select(Route::Raw, &jpeg), Body::Download);
        assert_eq!(Body::select(Route::Pgm, &gray), Body::Pgm);
        assert_eq!(Body::select(Route::Default, &gray), Body::Pgm);
        assert_eq!(Body::select(Route::Raw, &gray), Body::Download);
    }

    #[test]
    fn test_truncated_frame_falls_back_to_info() {
        let short = frame(FrameGeometry::new(4, 2, PixelFormat::Rgb565), &[0; 8]);
        assert_eq!(Body::select(Route::Bitmap, &short), Body::Info);

        let odd = frame(FrameGeometry::new(3, 1, PixelFormat::Rgb565), &[0; 6]);
        assert_eq!(Body::select(Route::Bitmap, &odd), Body::Info);
    }

    #[test]
    fn test_single_bitmap_response() {
        let rgb = frame(
            FrameGeometry::new(2, 2, PixelFormat::Rgb565),
            &[0xAA, 0xBB, 0xCC, 0xDD, 0x11, 0x22, 0x33, 0x44],
        );
        let mut out = Vec::new();
        let mut line = Vec::new();
        assert_eq!(
            write_single(&mut out, Route::Bitmap, &rgb, &mut line).unwrap(),
            Body::Bitmap
        );

        let (head, body) = split_body(&out);
        assert_eq!(head, "HTTP/1.1 200 OK\r\nContent-type: image/bitmap");
        assert_eq!(body.len(), BMP565_HEADER_SIZE + 8);
        assert_eq!(&body[..2], b"BM");
        // Word packing swaps the two pixels of each pair
        assert_eq!(
            &body[BMP565_HEADER_SIZE..],
            &[0xDD, 0xCC, 0xBB, 0xAA, 0x44, 0x33, 0x22, 0x11]
        );
    }

    #[test]
    fn test_single_pgm_response() {
        let gray = frame(FrameGeometry::new(3, 2, PixelFormat::Grayscale), &[1, 2, 3, 4, 5, 6]);
        let mut out = Vec::new();
        write_single(&mut out, Route::Pgm, &gray, &mut Vec::new()).unwrap();

        let (head, body) = split_body(&out);
        assert!(head.ends_with("Content-type: image/x-portable-graymap"));
        assert_eq!(body, b"P5 3 2 255\n\x01\x02\x03\x04\x05\x06");
    }

    #[test]
    fn test_download_carries_frame_info() {
        let jpeg = frame(FrameGeometry::new(2, 1, PixelFormat::Jpeg), &[0xFF, 0xD8, 0xFF, 0xD9]);
        let mut out = Vec::new();
        write_single(&mut out, Route::Raw, &jpeg, &mut Vec::new()).unwrap();

        let (head, body) = split_body(&out);
        assert!(head.contains("Content-type: application/octet-stream\r\n"));
        assert!(head.contains("filename=\"frame.jpg\""));
        assert!(head.contains("X-Frame-Info: format=JPEG width=2 height=1 length=4 sequence=1"));
        assert_eq!(body, &[0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn test_pgm_route_on_color_frame_is_text() {
        let rgb = frame(FrameGeometry::new(2, 1, PixelFormat::Yuv422), &[0; 4]);
        let mut out = Vec::new();
        write_single(&mut out, Route::Pgm, &rgb, &mut Vec::new()).unwrap();

        let (head, body) = split_body(&out);
        assert!(head.ends_with("Content-type: text/plain"));
        assert_eq!(body, b"format=YUV422 width=2 height=1 length=4 sequence=1\n");
    }

    #[test]
    fn test_stream_part_framing() {
        let jpeg = frame(FrameGeometry::new(2, 1, PixelFormat::Jpeg), &[0xFF, 0xD8]);
        let mut out = Vec::new();
        write_stream_part(&mut out, &jpeg, &mut Vec::new()).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(STREAM_BOUNDARY_LINE);
        expected.extend_from_slice(JPEG_CONTENT_TYPE);
        expected.extend_from_slice(&[0xFF, 0xD8]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(out, expected);
    }

    #[test]
    fn test_line_buffer_follows_width() {
        let wide = frame(FrameGeometry::new(4, 1, PixelFormat::Rgb565), &[0; 8]);
        let narrow = frame(FrameGeometry::new(2, 1, PixelFormat::Rgb565), &[0; 4]);
        let mut line = Vec::new();

        write_bitmap(&mut Vec::new(), &wide, &mut line).unwrap();
        assert_eq!(line.len(), 8);
        write_bitmap(&mut Vec::new(), &narrow, &mut line).unwrap();
        assert_eq!(line.len(), 4);
    }
}
