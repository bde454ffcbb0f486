mod camera;
mod config;
mod sensor;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use esp_idf_hal::cpu::Core;
use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys as sys;
use log::{error, info};

use espilicam_core::{
    CaptureCoordinator, CaptureTask, Console, FrameStore, ServerConfig, StreamServer,
};
use espilicam_shared::{FrameGeometry, PixelFormat};

use crate::camera::{Camera, SensorModel};
use crate::config::CONFIG;
use crate::sensor::EspSensor;

const TASK_STACK_SIZE: usize = 8 * 1024;

fn main() -> Result<()> {
    sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    unsafe {
        sys::esp_log_level_set(c"wifi".as_ptr(), sys::esp_log_level_t_ESP_LOG_WARN);
        sys::esp_log_level_set(c"gpio".as_ptr(), sys::esp_log_level_t_ESP_LOG_WARN);
    }

    info!("ESPILICAM starting");

    if let Err(e) = run() {
        error!("Startup failed: {:#}", e);
        return Err(e);
    }

    loop {
        thread::sleep(Duration::from_secs(1));
    }
}

fn run() -> Result<()> {
    let geometry = FrameGeometry::qvga(PixelFormat::Rgb565);
    let frames = FrameStore::new(geometry.rgb565_byte_size(), geometry)
        .context("Failed to allocate the frame store")?;
    let coordinator = Arc::new(CaptureCoordinator::new(frames));

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let wifi = connect_wifi(peripherals.modem, sys_loop, nvs)?;
    let ip = wifi.wifi().sta_netif().get_ip_info()?.ip;
    info!("Wi-Fi connected, IP: {}", ip);

    let camera = init_camera()?;

    let config = ServerConfig {
        write_timeout: Some(Duration::from_secs(10)),
        ..ServerConfig::default()
    };

    let task = CaptureTask::new(camera, coordinator.clone());
    spawn_pinned(b"capture\0", move || task.run())?;

    let server = StreamServer::new(coordinator.clone(), config.clone());
    spawn_pinned(b"http\0", move || {
        if let Err(e) = server.run() {
            error!("HTTP server stopped: {}", e);
        }
    })?;

    let console = Console::new(coordinator, Arc::new(EspSensor::new()));
    let console_port = config.console_port;
    spawn_pinned(b"console\0", move || {
        if let Err(e) = console.run(console_port) {
            error!("Console stopped: {}", e);
        }
    })?;

    info!("Camera ready");
    info!("  single bitmap: http://{}/bmp", ip);
    info!("  stream:        http://{}/stream", ip);
    info!("  raw frame:     http://{}/get", ip);
    info!("  console:       telnet {} {}", ip, console_port);

    // The station has to stay up for the lifetime of the firmware
    std::mem::forget(wifi);
    Ok(())
}

fn connect_wifi(
    modem: esp_idf_svc::hal::modem::Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    if CONFIG.wifi_ssid.is_empty() {
        bail!("Wi-Fi SSID is not set, copy cfg.toml.example to cfg.toml");
    }

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;

    let auth_method = if CONFIG.wifi_psk.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: CONFIG
            .wifi_ssid
            .try_into()
            .map_err(|_| anyhow!("Wi-Fi SSID is too long"))?,
        password: CONFIG
            .wifi_psk
            .try_into()
            .map_err(|_| anyhow!("Wi-Fi password is too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("Connecting to {}", CONFIG.wifi_ssid);
    wifi.connect()?;
    wifi.wait_netif_up()?;
    Ok(wifi)
}

/// Bring the driver up in RGB565, then switch to the mode the detected sensor needs
fn init_camera() -> Result<Camera> {
    let probe = SensorModel::Ov7670.capture_mode();
    let camera = Camera::new(probe).context("Camera init failed")?;

    let pid = camera.sensor_pid().ok_or_else(|| anyhow!("No camera sensor detected"))?;
    let model = SensorModel::from_pid(pid)
        .ok_or_else(|| anyhow!("Unsupported camera sensor, PID 0x{:02x}", pid))?;
    info!("Detected sensor {:?} (PID 0x{:02x})", model, pid);

    match model {
        SensorModel::Ov7670 | SensorModel::Ov7725 => Ok(camera),
        SensorModel::Ov2640 => {
            drop(camera);
            Camera::new(model.capture_mode()).context("Camera re-init for JPEG failed")
        }
    }
}

fn spawn_pinned<F>(name: &'static [u8], f: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    ThreadSpawnConfiguration {
        name: Some(name),
        stack_size: TASK_STACK_SIZE,
        pin_to_core: Some(Core::Core1),
        ..Default::default()
    }
    .set()?;

    let spawned = thread::Builder::new().stack_size(TASK_STACK_SIZE).spawn(f);
    ThreadSpawnConfiguration::default().set()?;
    spawned.context("Failed to spawn task")?;
    Ok(())
}
