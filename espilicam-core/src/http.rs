//! Request line parsing and the fixed response fragments of the HTTP surface.
//!
//! Only the request line is looked at; headers are ignored and every
//! response closes the connection.

use std::io::{self, Read};

pub const HTTP_OK: &[u8] = b"HTTP/1.1 200 OK\r\n";

pub const STREAM_BOUNDARY: &str = "123456789000000000000987654321";
pub const STREAM_CONTENT_TYPE: &[u8] =
    b"Content-type: multipart/x-mixed-replace; boundary=123456789000000000000987654321\r\n\r\n";
pub const STREAM_BOUNDARY_LINE: &[u8] = b"--123456789000000000000987654321\r\n";

pub const BITMAP_CONTENT_TYPE: &[u8] = b"Content-type: image/bitmap\r\n\r\n";
pub const JPEG_CONTENT_TYPE: &[u8] = b"Content-type: image/jpg\r\n\r\n";
pub const PGM_CONTENT_TYPE: &[u8] = b"Content-type: image/x-portable-graymap\r\n\r\n";
pub const TEXT_CONTENT_TYPE: &[u8] = b"Content-type: text/plain\r\n\r\n";

/// What a request path asks for, matched by prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/stream`: multipart stream of frames
    Stream,
    /// `/bmp`: one frame as BMP565 (or the sensor's native image format)
    Bitmap,
    /// `/get`: the frame buffer contents
    Raw,
    /// `/pgm`: one grayscale frame as PGM
    Pgm,
    /// Any other path
    Default,
}

impl Route {
    pub fn from_path(path: &str) -> Self {
        if path.starts_with("/stream") {
            Route::Stream
        } else if path.starts_with("/bmp") {
            Route::Bitmap
        } else if path.starts_with("/get") {
            Route::Raw
        } else if path.starts_with("/pgm") {
            Route::Pgm
        } else {
            Route::Default
        }
    }
}

/// A parsed `GET` request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub path: &'a str,
    pub route: Route,
}

impl<'a> Request<'a> {
    /// Parse `GET <path> [HTTP/x.y]`. Anything else yields `None`.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let end = data
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(data.len());
        let line = std::str::from_utf8(&data[..end]).ok()?;

        let mut parts = line.split(' ').filter(|p| !p.is_empty());
        let method = parts.next()?;
        let path = parts.next()?;
        if let Some(version) = parts.next() {
            if !version.starts_with("HTTP/") {
                return None;
            }
        }
        if parts.next().is_some() || method != "GET" || !path.starts_with('/') {
            return None;
        }

        Some(Request {
            path,
            route: Route::from_path(path),
        })
    }
}

/// Read until the request line is complete, the peer stops sending, or `limit` bytes arrived
pub fn read_request_head<R: Read>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>> {
    let mut data = vec![0u8; limit];
    let mut filled = 0;

    while filled < limit {
        let n = match reader.read(&mut data[filled..]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            break;
        }
        let had_line = data[filled..filled + n].contains(&b'\n');
        filled += n;
        if had_line {
            break;
        }
    }

    data.truncate(filled);
    Ok(data)
}
