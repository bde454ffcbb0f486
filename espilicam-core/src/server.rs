use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::coordinator::{CaptureCoordinator, CaptureOutcome};
use crate::error::Result;
use crate::http::{read_request_head, Request, Route, HTTP_OK, STREAM_CONTENT_TYPE};
use crate::response;

/// Sequential HTTP server for single images and the multipart stream.
///
/// Connections are served one at a time on the calling thread; a stream
/// occupies the server until its client goes away.
pub struct StreamServer {
    coordinator: Arc<CaptureCoordinator>,
    config: ServerConfig,
}

impl StreamServer {
    pub fn new(coordinator: Arc<CaptureCoordinator>, config: ServerConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind `0.0.0.0:<http_port>` and serve forever
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.http_port))?;
        info!("HTTP server listening on port {}", self.config.http_port);
        self.serve(listener)
    }

    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.handle_connection(stream) {
                        warn!("Error handling client: {}", e);
                    }
                }
                Err(e) => {
                    error!("Connection error: {}", e);
                }
            }
        }
        Ok(())
    }

    pub fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        stream.set_read_timeout(self.config.read_timeout)?;
        stream.set_write_timeout(self.config.write_timeout)?;
        let peer = stream.peer_addr()?;
        info!("Client connected: {}", peer);

        let result = self.respond(&mut stream);
        // The peer may already be gone
        let _ = stream.shutdown(Shutdown::Both);

        info!("Client disconnected: {}", peer);
        result
    }

    /// Read one request from `conn` and answer it
    pub fn respond<C: Read + Write>(&self, conn: &mut C) -> Result<()> {
        let limit = self.config.request_buffer_size;
        let head = read_request_head(conn, limit)?;
        if head.len() >= limit && !head.contains(&b'\n') {
            debug!("Ignoring request line longer than {} bytes", limit);
            return Ok(());
        }
        let Some(request) = Request::parse(&head) else {
            debug!("Ignoring malformed request ({} bytes)", head.len());
            return Ok(());
        };
        info!("Request: GET {}", request.path);

        match request.route {
            Route::Stream => self.serve_stream(conn),
            route => self.serve_image(conn, route),
        }
    }

    fn serve_image<W: Write>(&self, out: &mut W, route: Route) -> Result<()> {
        let _movie_mode = self.coordinator.suspend_movie_mode();
        self.capture_fresh_frame();

        let frame = self.coordinator.latest_frame();
        let mut line = Vec::new();
        let body = response::write_single(out, route, &frame, &mut line)?;
        debug!("Served frame {} as {:?}", frame.sequence(), body);
        Ok(())
    }

    fn serve_stream<W: Write>(&self, out: &mut W) -> Result<()> {
        let _movie_mode = self.coordinator.suspend_movie_mode();
        out.write_all(HTTP_OK)?;
        out.write_all(STREAM_CONTENT_TYPE)?;
        info!("Stream started");

        let mut line = Vec::new();
        let mut sent = 0u64;
        let reason = loop {
            self.capture_fresh_frame();
            let frame = self.coordinator.latest_frame();
            match response::write_stream_part(out, &frame, &mut line) {
                Ok(body) => debug!("Streamed frame {} as {:?}", frame.sequence(), body),
                Err(e) => break e,
            }
            sent += 1;
            thread::sleep(self.config.frame_interval);
        };

        info!("Stream ended after {} frames: {}", sent, reason);
        Ok(())
    }

    fn capture_fresh_frame(&self) {
        if self.coordinator.capture_now() == CaptureOutcome::Stale {
            warn!("Camera capture failed, serving the previous frame");
        }
    }
}
