use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use espilicam_core::bitmap::{bmp565_header, BMP565_HEADER_SIZE};
use espilicam_core::{
    CaptureCoordinator, CaptureError, CaptureTask, FrameGeometry, FrameInfo, FrameSource,
    FrameStore, PixelFormat, ServerConfig, StreamServer,
};

const WIDTH: u32 = 4;
const HEIGHT: u32 = 2;
const BOUNDARY_LINE: &[u8] = b"--123456789000000000000987654321\r\n";

/// Camera stand-in producing a deterministic frame in whatever format is selected
struct FakeCamera {
    format: Arc<Mutex<PixelFormat>>,
    captures: Arc<AtomicU64>,
}

impl FrameSource for FakeCamera {
    fn capture(&mut self, buf: &mut [u8]) -> Result<FrameInfo, CaptureError> {
        // Exposure time
        thread::sleep(Duration::from_millis(1));
        let n = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        let format = *self.format.lock().unwrap();
        let geometry = FrameGeometry::new(WIDTH, HEIGHT, format);

        let len = match format {
            PixelFormat::Jpeg => {
                let jpeg = [0xFF, 0xD8, n as u8, 0xFF, 0xD9];
                buf[..jpeg.len()].copy_from_slice(&jpeg);
                jpeg.len()
            }
            _ => {
                let len = geometry.raw_byte_size().unwrap();
                for (i, b) in buf[..len].iter_mut().enumerate() {
                    *b = i as u8;
                }
                len
            }
        };
        Ok(FrameInfo { len, geometry })
    }
}

struct Harness {
    addr: SocketAddr,
    coordinator: Arc<CaptureCoordinator>,
    format: Arc<Mutex<PixelFormat>>,
    captures: Arc<AtomicU64>,
}

impl Harness {
    fn start(format: PixelFormat) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let geometry = FrameGeometry::new(WIDTH, HEIGHT, format);
        let store = FrameStore::new(WIDTH as usize * HEIGHT as usize * 2, geometry).unwrap();
        let coordinator = Arc::new(CaptureCoordinator::new(store));

        let format = Arc::new(Mutex::new(format));
        let captures = Arc::new(AtomicU64::new(0));
        let camera = FakeCamera {
            format: format.clone(),
            captures: captures.clone(),
        };
        let task = CaptureTask::new(camera, coordinator.clone());
        thread::spawn(move || task.run());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            http_port: addr.port(),
            frame_interval: Duration::from_millis(2),
            read_timeout: Some(Duration::from_secs(2)),
            write_timeout: Some(Duration::from_secs(2)),
            ..ServerConfig::default()
        };
        let server = StreamServer::new(coordinator.clone(), config);
        thread::spawn(move || server.serve(listener));

        Self {
            addr,
            coordinator,
            format,
            captures,
        }
    }

    fn connect(&self, request: &str) -> TcpStream {
        let mut stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        stream
    }

    fn get(&self, path: &str) -> Vec<u8> {
        let mut stream = self.connect(&format!("GET {path} HTTP/1.1\r\nHost: cam\r\n\r\n"));
        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        response
    }
}

fn split_head(response: &[u8]) -> (String, &[u8]) {
    let end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    (
        String::from_utf8_lossy(&response[..end]).into_owned(),
        &response[end + 4..],
    )
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

/// Pixel bytes the server sends for the fake RGB565 frame: each packed word reversed
fn expected_bitmap_pixels() -> Vec<u8> {
    let raw: Vec<u8> = (0..WIDTH * HEIGHT * 2).map(|i| i as u8).collect();
    raw.chunks(4).flat_map(|w| w.iter().rev().copied()).collect()
}

#[test]
fn test_bitmap_response_bytes() {
    let harness = Harness::start(PixelFormat::Rgb565);
    let response = harness.get("/bmp");

    let (head, body) = split_head(&response);
    assert_eq!(head, "HTTP/1.1 200 OK\r\nContent-type: image/bitmap");
    assert_eq!(body.len(), BMP565_HEADER_SIZE + (WIDTH * HEIGHT * 2) as usize);
    assert_eq!(&body[..BMP565_HEADER_SIZE], &bmp565_header(WIDTH, HEIGHT)[..]);
    assert_eq!(&body[BMP565_HEADER_SIZE..], &expected_bitmap_pixels()[..]);

    // Exactly one capture was made for the request
    assert_eq!(harness.captures.load(Ordering::SeqCst), 1);
    assert_eq!(harness.coordinator.latest_frame().sequence(), 1);
}

#[test]
fn test_every_single_image_is_captured_after_its_request() {
    let harness = Harness::start(PixelFormat::Jpeg);
    for n in 1..=5u8 {
        let response = harness.get("/");
        let (head, body) = split_head(&response);
        assert!(head.ends_with("Content-type: image/jpg"));
        assert_eq!(body, &[0xFF, 0xD8, n, 0xFF, 0xD9]);
    }
}

#[test]
fn test_stream_disconnect_frees_the_server() {
    let harness = Harness::start(PixelFormat::Yuv422);
    {
        let mut stream = harness.connect("GET /stream HTTP/1.1\r\n\r\n");
        let mut received = Vec::new();
        let mut chunk = [0u8; 4096];
        while count(&received, BOUNDARY_LINE) < 3 {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "stream closed early");
            received.extend_from_slice(&chunk[..n]);
        }

        let (head, parts) = split_head(&received);
        assert_eq!(
            head,
            "HTTP/1.1 200 OK\r\nContent-type: multipart/x-mixed-replace; boundary=123456789000000000000987654321"
        );
        assert!(parts.starts_with(BOUNDARY_LINE));
        assert!(count(parts, b"Content-type: image/bitmap\r\n\r\nBM") >= 2);
    }

    // The stream loop notices the closed peer and the next client is served
    let (head, _) = split_head(&harness.get("/bmp"));
    assert_eq!(head, "HTTP/1.1 200 OK\r\nContent-type: image/bitmap");
    assert!(!harness.coordinator.is_movie_mode_on());
}

#[test]
fn test_movie_mode_survives_a_request() {
    let harness = Harness::start(PixelFormat::Rgb565);
    harness.coordinator.set_movie_mode(true);

    let (head, _) = split_head(&harness.get("/bmp"));
    assert_eq!(head, "HTTP/1.1 200 OK\r\nContent-type: image/bitmap");
    assert!(harness.coordinator.is_movie_mode_on());

    // Free-running again: frames keep arriving without requests
    let seen = harness.coordinator.latest_frame().sequence();
    let deadline = Instant::now() + Duration::from_secs(5);
    while harness.coordinator.latest_frame().sequence() < seen + 3 {
        assert!(Instant::now() < deadline, "capture task stopped after request");
        thread::sleep(Duration::from_millis(5));
    }
}

fn read_until_parts(stream: &mut TcpStream, received: &mut Vec<u8>, parts: usize) {
    let mut chunk = [0u8; 4096];
    while count(received, BOUNDARY_LINE) < parts {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "stream closed early");
        received.extend_from_slice(&chunk[..n]);
    }
}

#[test]
fn test_movie_mode_switched_during_stream() {
    let harness = Harness::start(PixelFormat::Jpeg);
    let mut stream = harness.connect("GET /stream HTTP/1.1\r\n\r\n");
    let mut received = Vec::new();
    read_until_parts(&mut stream, &mut received, 2);

    // Console turns video on and changes a frame-layout setting meanwhile
    harness.coordinator.set_movie_mode(true);
    let console = {
        let coordinator = harness.coordinator.clone();
        thread::spawn(move || {
            let _movie_mode = coordinator.suspend_movie_mode();
            coordinator.capture_now()
        })
    };
    console.join().unwrap();
    assert!(!harness.coordinator.is_movie_mode_on());

    // Each part is still a fresh capture made for the stream
    let before = harness.captures.load(Ordering::SeqCst);
    read_until_parts(&mut stream, &mut received, 8);
    assert!(harness.captures.load(Ordering::SeqCst) > before);
    drop(stream);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !harness.coordinator.is_movie_mode_on() {
        assert!(Instant::now() < deadline, "movie mode not resumed after the stream");
        thread::sleep(Duration::from_millis(5));
    }

    let seen = harness.coordinator.latest_frame().sequence();
    while harness.coordinator.latest_frame().sequence() < seen + 3 {
        assert!(Instant::now() < deadline, "capture task not free-running");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_grayscale_routes() {
    let harness = Harness::start(PixelFormat::Grayscale);

    let response = harness.get("/pgm");
    let (head, body) = split_head(&response);
    assert!(head.ends_with("Content-type: image/x-portable-graymap"));
    let mut expected = b"P5 4 2 255\n".to_vec();
    expected.extend(0..8u8);
    assert_eq!(body, &expected[..]);

    let response = harness.get("/get");
    let (head, body) = split_head(&response);
    assert!(head.contains("Content-type: application/octet-stream"));
    assert!(head.contains("X-Frame-Info: format=GRAYSCALE width=4 height=2 length=8"));
    assert_eq!(body, &(0..8u8).collect::<Vec<_>>()[..]);
}

#[test]
fn test_format_change_is_picked_up_by_next_request() {
    let harness = Harness::start(PixelFormat::Rgb565);
    let (head, _) = split_head(&harness.get("/"));
    assert!(head.ends_with("image/bitmap"));

    *harness.format.lock().unwrap() = PixelFormat::Jpeg;
    let (head, _) = split_head(&harness.get("/"));
    assert!(head.ends_with("image/jpg"));

    // PGM asked of a JPEG frame is answered with the frame description
    let response = harness.get("/pgm");
    let (head, body) = split_head(&response);
    assert!(head.ends_with("Content-type: text/plain"));
    assert!(String::from_utf8_lossy(body).starts_with("format=JPEG width=4 height=2"));
}

#[test]
fn test_malformed_request_closes_without_response() {
    let harness = Harness::start(PixelFormat::Rgb565);

    let mut stream = harness.connect("DELETE /bmp HTTP/1.1\r\n\r\n");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    assert!(response.is_empty());
    assert_eq!(harness.captures.load(Ordering::SeqCst), 0);

    // Still serving
    assert!(harness.get("/bmp").starts_with(b"HTTP/1.1 200 OK\r\n"));
}
