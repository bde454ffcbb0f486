//! Host side access to an ESPILICAM camera: HTTP snapshots, the multipart
//! stream and the line-oriented command console.

use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use espilicam_shared::CameraStatus;
use serde::Serialize;

/// Boundary token of the camera's `multipart/x-mixed-replace` stream
pub const STREAM_BOUNDARY: &str = "123456789000000000000987654321";

/// One image as served by the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Image {
    /// File extension matching the content type
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_deref() {
            Some("image/bitmap") | Some("image/bmp") => "bmp",
            Some("image/jpg") | Some("image/jpeg") => "jpg",
            Some("image/x-portable-graymap") => "pgm",
            Some("text/plain") => "txt",
            _ => "bin",
        }
    }
}

/// Entry of the manifest written next to recorded frames
#[derive(Debug, Serialize)]
pub struct RecordedFrame {
    pub file: String,
    pub content_type: Option<String>,
    pub bytes: usize,
}

pub struct CameraClient {
    server_url: String,
    http: reqwest::blocking::Client,
}

impl CameraClient {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    /// Fetch a single image from `path` (`/bmp`, `/get`, `/pgm` or `/`)
    pub fn snapshot(&self, path: &str) -> Result<Image> {
        let url = self.url(path);
        log::debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("Request to {} failed", url))?;
        if !response.status().is_success() {
            bail!("Server returned error: {}", response.status());
        }

        let content_type = content_type_of(&response);
        let body = response.bytes().context("Failed to read image body")?.to_vec();
        log::info!("Received {} bytes ({:?})", body.len(), content_type);
        Ok(Image { content_type, body })
    }

    /// Open `/stream` and return a reader yielding one image per part
    pub fn open_stream(&self) -> Result<MultipartReader<reqwest::blocking::Response>> {
        let url = self.url("/stream");
        log::info!("Opening stream {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("Request to {} failed", url))?;
        if !response.status().is_success() {
            bail!("Server returned error: {}", response.status());
        }

        let boundary = content_type_of(&response)
            .as_deref()
            .and_then(boundary_of)
            .unwrap_or_else(|| STREAM_BOUNDARY.to_string());
        Ok(MultipartReader::new(response, &boundary))
    }
}

fn content_type_of(response: &reqwest::blocking::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// `boundary=` parameter of a multipart content type
fn boundary_of(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|p| p.trim().strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .next()
}

/// Splits a `multipart/x-mixed-replace` body into its parts.
///
/// The camera sends no part lengths, so a part ends where the next
/// boundary line starts or where the stream ends.
pub struct MultipartReader<R> {
    reader: BufReader<R>,
    delimiter: Vec<u8>,
    buf: Vec<u8>,
    in_part: bool,
}

impl<R: Read> MultipartReader<R> {
    pub fn new(reader: R, boundary: &str) -> Self {
        Self {
            reader: BufReader::new(reader),
            delimiter: format!("--{}\r\n", boundary).into_bytes(),
            buf: Vec::new(),
            in_part: false,
        }
    }

    /// Next complete part, `None` once the stream has ended
    pub fn next_part(&mut self) -> io::Result<Option<Image>> {
        if !self.in_part {
            // Skip anything before the first boundary
            loop {
                if let Some(pos) = find(&self.buf, &self.delimiter, 0) {
                    self.buf.drain(..pos + self.delimiter.len());
                    self.in_part = true;
                    break;
                }
                if !self.fill()? {
                    return Ok(None);
                }
            }
        }

        let header_end = loop {
            if let Some(pos) = find(&self.buf, b"\r\n\r\n", 0) {
                break pos;
            }
            if !self.fill()? {
                return Ok(None);
            }
        };
        let content_type = String::from_utf8_lossy(&self.buf[..header_end])
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.trim().to_string());
        self.buf.drain(..header_end + 4);

        let mut searched = 0;
        let mut body = loop {
            if let Some(pos) = find(&self.buf, &self.delimiter, searched) {
                let body = self.buf[..pos].to_vec();
                self.buf.drain(..pos + self.delimiter.len());
                break body;
            }
            searched = self.buf.len().saturating_sub(self.delimiter.len() - 1);
            if !self.fill()? {
                break std::mem::take(&mut self.buf);
            }
        };
        if body.ends_with(b"\r\n") {
            body.truncate(body.len() - 2);
        }

        Ok(Some(Image { content_type, body }))
    }

    fn fill(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; 4096];
        let n = loop {
            match self.reader.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n > 0)
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// Send one console line to `addr` and return the whole reply
pub fn send_console_command(addr: &str, line: &str, timeout: Duration) -> Result<String> {
    let mut stream =
        TcpStream::connect(addr).with_context(|| format!("Failed to connect to {}", addr))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    stream.write_all(line.trim_end().as_bytes())?;
    stream.write_all(b"\r\n")?;
    // End of input makes the console answer and hang up
    stream.shutdown(Shutdown::Write)?;

    let mut reply = String::new();
    stream
        .read_to_string(&mut reply)
        .context("Failed to read console reply")?;
    Ok(reply)
}

/// Ask the console for the capture status
pub fn fetch_status(addr: &str, timeout: Duration) -> Result<CameraStatus> {
    let reply = send_console_command(addr, "--status", timeout)?;
    serde_json::from_str(reply.trim())
        .with_context(|| format!("Unexpected status reply: {:?}", reply.trim()))
}
