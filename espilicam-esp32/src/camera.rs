// Camera driver binding for the esp32-camera component.
//
// Frame buffer handling adapted from:
// https://github.com/Kezii/esp32cam_rs
// Copyright (c) Kezii
// Used under MIT license with attribution as required

use std::marker::PhantomData;

use espilicam_core::{pixel, CaptureError, FrameInfo, FrameSource};
use espilicam_shared::{FrameGeometry, PixelFormat};
use esp_idf_sys::{self as sys, camera, esp, EspError};

use crate::config::CONFIG;

/// Sensor product ids as reported by the SCCB probe
pub const OV7670_PID: u16 = 0x76;
pub const OV7725_PID: u16 = 0x77;
pub const OV2640_PID: u16 = 0x26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorModel {
    Ov7670,
    Ov7725,
    Ov2640,
}

impl SensorModel {
    pub fn from_pid(pid: u16) -> Option<Self> {
        match pid {
            OV7670_PID => Some(SensorModel::Ov7670),
            OV7725_PID => Some(SensorModel::Ov7725),
            OV2640_PID => Some(SensorModel::Ov2640),
            _ => None,
        }
    }

    /// Pixel format, frame size and JPEG quality the sensor starts with
    pub fn capture_mode(&self) -> CaptureMode {
        match self {
            SensorModel::Ov7670 | SensorModel::Ov7725 => CaptureMode {
                pixel_format: camera::pixformat_t_PIXFORMAT_RGB565,
                frame_size: camera::framesize_t_FRAMESIZE_QVGA,
                jpeg_quality: 12,
            },
            SensorModel::Ov2640 => CaptureMode {
                pixel_format: camera::pixformat_t_PIXFORMAT_JPEG,
                frame_size: camera::framesize_t_FRAMESIZE_VGA,
                jpeg_quality: 15,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureMode {
    pub pixel_format: camera::pixformat_t,
    pub frame_size: camera::framesize_t,
    pub jpeg_quality: i32,
}

pub fn pixel_format_from_driver(format: camera::pixformat_t) -> Option<PixelFormat> {
    match format {
        camera::pixformat_t_PIXFORMAT_RGB565 => Some(PixelFormat::Rgb565),
        camera::pixformat_t_PIXFORMAT_YUV422 => Some(PixelFormat::Yuv422),
        camera::pixformat_t_PIXFORMAT_JPEG => Some(PixelFormat::Jpeg),
        camera::pixformat_t_PIXFORMAT_GRAYSCALE => Some(PixelFormat::Grayscale),
        _ => None,
    }
}

pub fn pixel_format_to_driver(format: PixelFormat) -> camera::pixformat_t {
    match format {
        PixelFormat::Rgb565 => camera::pixformat_t_PIXFORMAT_RGB565,
        PixelFormat::Yuv422 => camera::pixformat_t_PIXFORMAT_YUV422,
        PixelFormat::Jpeg => camera::pixformat_t_PIXFORMAT_JPEG,
        PixelFormat::Grayscale => camera::pixformat_t_PIXFORMAT_GRAYSCALE,
    }
}

pub struct FrameBuffer<'a> {
    fb: *mut camera::camera_fb_t,
    _p: PhantomData<&'a camera::camera_fb_t>,
}

impl<'a> FrameBuffer<'a> {
    pub fn data(&self) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts((*self.fb).buf, (*self.fb).len) }
    }

    pub fn width(&self) -> usize {
        unsafe { (*self.fb).width }
    }

    pub fn height(&self) -> usize {
        unsafe { (*self.fb).height }
    }

    pub fn format(&self) -> camera::pixformat_t {
        unsafe { (*self.fb).format }
    }
}

impl Drop for FrameBuffer<'_> {
    fn drop(&mut self) {
        unsafe { camera::esp_camera_fb_return(self.fb) }
    }
}

/// The initialised driver. Only one may exist at a time.
pub struct Camera {
    _p: PhantomData<*const ()>,
}

// The driver is a process-wide singleton guarded by its own locks
unsafe impl Send for Camera {}

impl Camera {
    /// Initialise the driver with the pinout from cfg.toml
    pub fn new(mode: CaptureMode) -> Result<Self, EspError> {
        let config = camera::camera_config_t {
            pin_pwdn: CONFIG.pin_pwdn,
            pin_reset: CONFIG.pin_reset,
            pin_xclk: CONFIG.pin_xclk,

            pin_d0: CONFIG.pin_d0,
            pin_d1: CONFIG.pin_d1,
            pin_d2: CONFIG.pin_d2,
            pin_d3: CONFIG.pin_d3,
            pin_d4: CONFIG.pin_d4,
            pin_d5: CONFIG.pin_d5,
            pin_d6: CONFIG.pin_d6,
            pin_d7: CONFIG.pin_d7,
            pin_vsync: CONFIG.pin_vsync,
            pin_href: CONFIG.pin_href,
            pin_pclk: CONFIG.pin_pclk,

            xclk_freq_hz: CONFIG.xclk_mhz * 1_000_000,
            ledc_timer: sys::ledc_timer_t_LEDC_TIMER_0,
            ledc_channel: sys::ledc_channel_t_LEDC_CHANNEL_0,

            pixel_format: mode.pixel_format,
            frame_size: mode.frame_size,

            jpeg_quality: mode.jpeg_quality,
            fb_count: 1,
            grab_mode: camera::camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY,

            fb_location: camera::camera_fb_location_t_CAMERA_FB_IN_PSRAM,

            __bindgen_anon_1: camera::camera_config_t__bindgen_ty_1 {
                pin_sccb_sda: CONFIG.pin_sda,
            },
            __bindgen_anon_2: camera::camera_config_t__bindgen_ty_2 {
                pin_sccb_scl: CONFIG.pin_scl,
            },

            ..Default::default()
        };

        esp!(unsafe { camera::esp_camera_init(&config) })?;
        Ok(Self { _p: PhantomData })
    }

    /// Product id of the detected sensor
    pub fn sensor_pid(&self) -> Option<u16> {
        let sensor = unsafe { camera::esp_camera_sensor_get() };
        if sensor.is_null() {
            None
        } else {
            Some(unsafe { (*sensor).id.PID }.into())
        }
    }

    pub fn framebuffer(&self) -> Option<FrameBuffer<'_>> {
        let fb = unsafe { camera::esp_camera_fb_get() };
        if fb.is_null() {
            None
        } else {
            Some(FrameBuffer {
                fb,
                _p: PhantomData,
            })
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Err(e) = esp!(unsafe { camera::esp_camera_deinit() }) {
            log::error!("esp_camera_deinit failed: {}", e);
        }
    }
}

impl FrameSource for Camera {
    fn capture(&mut self, buf: &mut [u8]) -> Result<FrameInfo, CaptureError> {
        let fb = self.framebuffer().ok_or(CaptureError::NoFrameBuffer)?;
        let data = fb.data();
        if data.len() > buf.len() {
            return Err(CaptureError::FrameTooLarge {
                needed: data.len(),
                capacity: buf.len(),
            });
        }

        let format = pixel_format_from_driver(fb.format())
            .ok_or(CaptureError::UnknownPixelFormat(fb.format()))?;
        let frame = &mut buf[..data.len()];
        frame.copy_from_slice(data);
        // esp32-camera emits pixels in order, the converter reads packed pairs
        pixel::repack_pixel_order(frame, format);

        Ok(FrameInfo {
            len: data.len(),
            geometry: FrameGeometry::new(fb.width() as u32, fb.height() as u32, format),
        })
    }
}
