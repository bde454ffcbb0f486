use espilicam_shared::PixelFormat;

use crate::error::SensorError;

/// A single sensor register setting, passed through to the driver unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSetting {
    PixelFormat(PixelFormat),
    ClockMhz(u32),
    Framerate(u8),
    Colorbar(bool),
    Saturation(i32),
    Hue(i32),
    Brightness(i32),
    Contrast(i32),
    HorizontalFlip(bool),
    VerticalFlip(bool),
    LightMode(u8),
    NightMode(u8),
    SpecialEffect(u8),
    Gamma(u8),
    WhiteBalance(u8),
}

impl SensorSetting {
    pub fn name(&self) -> &'static str {
        match self {
            SensorSetting::PixelFormat(_) => "pixformat",
            SensorSetting::ClockMhz(_) => "clock",
            SensorSetting::Framerate(_) => "framerate",
            SensorSetting::Colorbar(_) => "colorbar",
            SensorSetting::Saturation(_) => "saturation",
            SensorSetting::Hue(_) => "hue",
            SensorSetting::Brightness(_) => "brightness",
            SensorSetting::Contrast(_) => "contrast",
            SensorSetting::HorizontalFlip(_) => "hflip",
            SensorSetting::VerticalFlip(_) => "vflip",
            SensorSetting::LightMode(_) => "light",
            SensorSetting::NightMode(_) => "night",
            SensorSetting::SpecialEffect(_) => "effect",
            SensorSetting::Gamma(_) => "gamma",
            SensorSetting::WhiteBalance(_) => "whitebalance",
        }
    }

    /// Settings that change the frame layout and must not race a capture
    pub fn changes_frame_layout(&self) -> bool {
        matches!(self, SensorSetting::PixelFormat(_) | SensorSetting::ClockMhz(_))
    }
}

/// Sensor driver control surface used by the command console
pub trait SensorControl: Send + Sync {
    fn apply(&self, setting: SensorSetting) -> Result<(), SensorError>;
}
