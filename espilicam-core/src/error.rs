use thiserror::Error;

/// Failure of a single capture attempt. Recoverable: the previous frame stays current.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("driver returned no frame buffer")]
    NoFrameBuffer,

    #[error("driver error code 0x{0:x}")]
    Driver(i32),

    #[error("frame of {needed} bytes does not fit the {capacity} byte frame buffer")]
    FrameTooLarge { needed: usize, capacity: usize },

    #[error("no memory left for a {0} byte capture buffer")]
    OutOfMemory(usize),

    #[error("driver delivered a frame in unknown pixel format {0}")]
    UnknownPixelFormat(u32),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConvertError {
    #[error("scanline width {0} is not a whole number of pixel pairs")]
    OddWidth(usize),

    #[error("source scanline holds {available} bytes, {needed} required")]
    SourceTooShort { needed: usize, available: usize },

    #[error("destination scanline holds {available} bytes, {needed} required")]
    DestinationTooShort { needed: usize, available: usize },

    #[error("{0} frames cannot be converted to RGB565")]
    UnsupportedFormat(espilicam_shared::PixelFormat),
}

/// Rejected sensor setting. Reported to the console, no state is changed.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("{0} is not supported by this sensor")]
    Unsupported(&'static str),

    #[error("value {value} out of range for {setting}")]
    OutOfRange { setting: &'static str, value: i32 },

    #[error("sensor driver rejected {setting} (code {code})")]
    Driver { setting: &'static str, code: i32 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("not enough memory to allocate a {0} byte frame buffer")]
    FrameBufferAlloc(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),
}

pub type Result<T> = std::result::Result<T, Error>;
