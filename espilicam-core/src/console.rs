//! Line-oriented command console for movie mode and sensor settings.
//!
//! Every line is parsed like a command line, e.g. `--video 1` or
//! `--brightness 2 --contrast -1`, and answered with one reply block.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use espilicam_shared::PixelFormat;
use log::{debug, error, info, warn};

use crate::coordinator::CaptureCoordinator;
use crate::error::Result;
use crate::sensor::{SensorControl, SensorSetting};

/// Telnet "interpret as command" byte, starts a negotiation sequence
const IAC: u8 = 0xFF;
const SE: u8 = 0xF0;
const SB: u8 = 0xFA;
const WILL: u8 = 0xFB;
const DONT: u8 = 0xFE;

#[derive(Parser, Debug)]
#[command(
    name = "ESPILICAM",
    about = "ESPILICAM command console",
    no_binary_name = true,
    disable_version_flag = true
)]
struct ConsoleArgs {
    /// video mode (0=off, 1=on)
    #[arg(long, value_name = "0|1", value_parser = parse_switch)]
    video: Option<bool>,

    /// print capture status as JSON
    #[arg(short, long)]
    status: bool,

    /// set camera xclock frequency in MHz
    #[arg(long, value_name = "MHZ", value_parser = clap::value_parser!(u32).range(1..=40))]
    clock: Option<u32>,

    /// set pixel format (rgb565, yuv422, jpeg, grayscale)
    #[arg(long)]
    pixformat: Option<PixelFormat>,

    /// set framerate (14, 15, 25, 30)
    #[arg(long, value_name = "FPS", value_parser = parse_framerate)]
    framerate: Option<u8>,

    /// set test pattern (0=off, 1=on)
    #[arg(long, value_name = "0|1", value_parser = parse_switch)]
    colorbar: Option<bool>,

    /// set saturation (1 to 256)
    #[arg(long, value_parser = clap::value_parser!(i32).range(1..=256))]
    saturation: Option<i32>,

    /// set hue (-180 to 180)
    #[arg(long, allow_negative_numbers = true, value_parser = clap::value_parser!(i32).range(-180..=180))]
    hue: Option<i32>,

    /// set brightness (-4 to 4)
    #[arg(long, allow_negative_numbers = true, value_parser = clap::value_parser!(i32).range(-4..=4))]
    brightness: Option<i32>,

    /// set contrast (-4 to 4)
    #[arg(long, allow_negative_numbers = true, value_parser = clap::value_parser!(i32).range(-4..=4))]
    contrast: Option<i32>,

    /// flip horizontal (0=off, 1=on)
    #[arg(long, value_name = "0|1", value_parser = parse_switch)]
    hflip: Option<bool>,

    /// flip vertical (0=off, 1=on)
    #[arg(long, value_name = "0|1", value_parser = parse_switch)]
    vflip: Option<bool>,

    /// light mode (0 to 5)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    light: Option<u8>,

    /// night mode (0 to 3)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
    night: Option<u8>,

    /// special effects (0 to 8)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=8))]
    effect: Option<u8>,

    /// gamma mode (0=disabled, 1=slope1)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    gamma: Option<u8>,

    /// white balance (0, 1, 2)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    whitebalance: Option<u8>,
}

impl ConsoleArgs {
    /// Requested sensor settings in the order they are applied
    fn settings(&self) -> Vec<SensorSetting> {
        [
            self.clock.map(SensorSetting::ClockMhz),
            self.pixformat.map(SensorSetting::PixelFormat),
            self.framerate.map(SensorSetting::Framerate),
            self.colorbar.map(SensorSetting::Colorbar),
            self.saturation.map(SensorSetting::Saturation),
            self.hue.map(SensorSetting::Hue),
            self.brightness.map(SensorSetting::Brightness),
            self.contrast.map(SensorSetting::Contrast),
            self.hflip.map(SensorSetting::HorizontalFlip),
            self.vflip.map(SensorSetting::VerticalFlip),
            self.light.map(SensorSetting::LightMode),
            self.night.map(SensorSetting::NightMode),
            self.effect.map(SensorSetting::SpecialEffect),
            self.gamma.map(SensorSetting::Gamma),
            self.whitebalance.map(SensorSetting::WhiteBalance),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn parse_switch(s: &str) -> std::result::Result<bool, String> {
    match s {
        "0" | "off" => Ok(false),
        "1" | "on" => Ok(true),
        other => Err(format!("expected 0 or 1, got '{other}'")),
    }
}

fn parse_framerate(s: &str) -> std::result::Result<u8, String> {
    match s.parse::<u8>() {
        Ok(fps @ (14 | 15 | 25 | 30)) => Ok(fps),
        _ => Err(format!("expected one of 14, 15, 25, 30, got '{s}'")),
    }
}

pub struct Console {
    coordinator: Arc<CaptureCoordinator>,
    sensor: Arc<dyn SensorControl>,
}

impl Console {
    pub fn new(coordinator: Arc<CaptureCoordinator>, sensor: Arc<dyn SensorControl>) -> Self {
        Self {
            coordinator,
            sensor,
        }
    }

    /// Run one console line and return the reply text
    pub fn execute(&self, line: &str) -> String {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return String::new();
        }
        if words == ["help"] {
            return ConsoleArgs::command().render_help().to_string();
        }

        let args = match ConsoleArgs::try_parse_from(words.iter().copied()) {
            Ok(args) => args,
            Err(e) if e.kind() == ErrorKind::DisplayHelp => return e.render().to_string(),
            Err(e) => {
                debug!("Rejected console line {:?}: {}", line, e.kind());
                return e.render().to_string();
            }
        };

        let mut reply = String::new();
        for setting in args.settings() {
            reply.push_str(&self.apply(setting));
            reply.push('\n');
        }
        if let Some(enabled) = args.video {
            reply.push_str(self.switch_video(enabled));
            reply.push('\n');
        }
        if args.status {
            match serde_json::to_string(&self.coordinator.status()) {
                Ok(json) => reply.push_str(&json),
                Err(e) => reply.push_str(&format!("error: {e}")),
            }
            reply.push('\n');
        }
        if reply.is_empty() {
            reply.push_str("nothing to do, type help for commands\n");
        }
        reply
    }

    fn switch_video(&self, enabled: bool) -> &'static str {
        self.coordinator.set_movie_mode(enabled);
        if enabled {
            "video mode on"
        } else {
            // Let an in-flight request finish before reporting
            self.coordinator.wait_for_completion();
            "video mode off"
        }
    }

    fn apply(&self, setting: SensorSetting) -> String {
        let result = if setting.changes_frame_layout() {
            // No capture may be running while the frame layout changes
            let _movie_mode = self.coordinator.suspend_movie_mode();
            self.coordinator.capture_now();
            self.sensor.apply(setting)
        } else {
            self.sensor.apply(setting)
        };

        match result {
            Ok(()) => {
                info!("Sensor setting applied: {:?}", setting);
                format!("{} set", setting.name())
            }
            Err(e) => {
                warn!("Sensor setting {:?} failed: {}", setting, e);
                format!("error: {e}")
            }
        }
    }

    /// Bind `0.0.0.0:<port>` and serve console clients one at a time
    pub fn run(&self, port: u16) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        info!("Command console listening on port {}", port);
        self.serve(listener)
    }

    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.handle_client(stream) {
                        warn!("Console client error: {}", e);
                    }
                }
                Err(e) => error!("Console connection error: {}", e),
            }
        }
        Ok(())
    }

    fn handle_client(&self, stream: TcpStream) -> Result<()> {
        let peer = stream.peer_addr()?;
        info!("Console client connected: {}", peer);

        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            let line = strip_telnet_commands(&raw);
            let reply = self.execute(&line);
            if !reply.is_empty() {
                writer.write_all(reply.as_bytes())?;
                writer.flush()?;
            }
        }

        info!("Console client disconnected: {}", peer);
        Ok(())
    }
}

/// Drop telnet commands, option negotiation and subnegotiation blocks, decode the rest
fn strip_telnet_commands(raw: &[u8]) -> String {
    let mut text = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter().copied();
    while let Some(b) = bytes.next() {
        if b != IAC {
            text.push(b);
            continue;
        }
        match bytes.next() {
            Some(IAC) => text.push(IAC),
            // IAC SB <option> ... IAC SE
            Some(SB) => {
                let mut prev = 0;
                for b in bytes.by_ref() {
                    if prev == IAC && b == SE {
                        break;
                    }
                    // An escaped IAC inside the block must not pair with SE
                    prev = if prev == IAC && b == IAC { 0 } else { b };
                }
            }
            Some(WILL..=DONT) => {
                bytes.next();
            }
            // Two-byte commands (NOP, GA, ...) or a trailing IAC
            _ => {}
        }
    }
    String::from_utf8_lossy(&text).into_owned()
}
