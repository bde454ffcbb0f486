use std::os::raw::c_int;

use espilicam_core::{SensorControl, SensorError, SensorSetting};
use esp_idf_sys::{self as sys, camera};

use crate::camera::pixel_format_to_driver;

/// Register access through the driver's `sensor_t` function table
pub struct EspSensor;

// The sensor handle is owned by the driver and only reached through
// esp_camera_sensor_get(), which is safe to call from any task
unsafe impl Send for EspSensor {}
unsafe impl Sync for EspSensor {}

type SetInt = unsafe extern "C" fn(*mut camera::sensor_t, c_int) -> c_int;

impl EspSensor {
    pub fn new() -> Self {
        Self
    }

    fn sensor(&self, setting: &'static str) -> Result<*mut camera::sensor_t, SensorError> {
        let sensor = unsafe { camera::esp_camera_sensor_get() };
        if sensor.is_null() {
            Err(SensorError::Unsupported(setting))
        } else {
            Ok(sensor)
        }
    }

    fn set_int(
        &self,
        setting: &'static str,
        select: impl FnOnce(&camera::sensor_t) -> Option<SetInt>,
        value: c_int,
    ) -> Result<(), SensorError> {
        let sensor = self.sensor(setting)?;
        let func = select(unsafe { &*sensor }).ok_or(SensorError::Unsupported(setting))?;
        check(setting, unsafe { func(sensor, value) })
    }
}

impl Default for EspSensor {
    fn default() -> Self {
        Self::new()
    }
}

fn check(setting: &'static str, code: c_int) -> Result<(), SensorError> {
    if code == 0 {
        Ok(())
    } else {
        Err(SensorError::Driver { setting, code })
    }
}

impl SensorControl for EspSensor {
    fn apply(&self, setting: SensorSetting) -> Result<(), SensorError> {
        let name = setting.name();
        log::debug!("Applying sensor setting {:?}", setting);

        match setting {
            SensorSetting::PixelFormat(format) => {
                let sensor = self.sensor(name)?;
                let func = unsafe { (*sensor).set_pixformat }.ok_or(SensorError::Unsupported(name))?;
                check(name, unsafe { func(sensor, pixel_format_to_driver(format)) })
            }
            SensorSetting::ClockMhz(mhz) => {
                let sensor = self.sensor(name)?;
                let func = unsafe { (*sensor).set_xclk }.ok_or(SensorError::Unsupported(name))?;
                let timer = sys::ledc_timer_t_LEDC_TIMER_0 as c_int;
                check(name, unsafe { func(sensor, timer, mhz as c_int) })
            }
            SensorSetting::Colorbar(on) => self.set_int(name, |s| s.set_colorbar, on as c_int),
            SensorSetting::Saturation(level) => self.set_int(name, |s| s.set_saturation, level),
            SensorSetting::Brightness(level) => self.set_int(name, |s| s.set_brightness, level),
            SensorSetting::Contrast(level) => self.set_int(name, |s| s.set_contrast, level),
            SensorSetting::HorizontalFlip(on) => self.set_int(name, |s| s.set_hmirror, on as c_int),
            SensorSetting::VerticalFlip(on) => self.set_int(name, |s| s.set_vflip, on as c_int),
            SensorSetting::SpecialEffect(effect) => {
                self.set_int(name, |s| s.set_special_effect, effect.into())
            }
            SensorSetting::WhiteBalance(mode) => self.set_int(name, |s| s.set_wb_mode, mode.into()),
            SensorSetting::Gamma(on) => self.set_int(name, |s| s.set_raw_gma, on.into()),
            // No driver hook for these on the esp32-camera sensor table
            SensorSetting::Hue(_)
            | SensorSetting::Framerate(_)
            | SensorSetting::LightMode(_)
            | SensorSetting::NightMode(_) => Err(SensorError::Unsupported(name)),
        }
    }
}
