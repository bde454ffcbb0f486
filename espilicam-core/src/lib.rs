//! Frame capture and HTTP streaming pipeline of the ESPILICAM camera.
//!
//! Hardware is reached through two traits, [`FrameSource`] for captures and
//! [`SensorControl`] for register settings, so everything here runs on the
//! host as well as on the ESP32.

pub mod bitmap;
pub mod capture;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod error;
pub mod frame;
pub mod http;
pub mod pixel;
pub mod response;
pub mod sensor;
pub mod server;

pub use capture::{CaptureTask, FrameSource};
pub use config::ServerConfig;
pub use console::Console;
pub use coordinator::{CaptureCoordinator, CaptureOutcome, CaptureState, MovieModeGuard};
pub use error::{CaptureError, ConvertError, Error, Result, SensorError};
pub use frame::{Frame, FrameInfo, FrameStore};
pub use sensor::{SensorControl, SensorSetting};
pub use server::StreamServer;

pub use espilicam_shared::{CameraStatus, FrameGeometry, PixelFormat};
