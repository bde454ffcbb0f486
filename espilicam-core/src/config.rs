use std::time::Duration;

/// Network and pacing parameters of the HTTP and console servers
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub console_port: u16,
    /// Pause between two multipart frames, bounds the stream frame rate
    pub frame_interval: Duration,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// Upper bound on the request line, longer requests are dropped
    pub request_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 80,
            console_port: 23,
            frame_interval: Duration::from_millis(30),
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: None,
            request_buffer_size: 1024,
        }
    }
}
