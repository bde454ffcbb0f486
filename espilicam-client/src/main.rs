use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use espilicam_client::{fetch_status, send_console_command, CameraClient, RecordedFrame};

#[derive(Parser, Debug)]
#[command(author, version, about = "ESPILICAM camera client", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Network timeout in seconds
    #[arg(short, long, global = true, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a single image
    Snapshot {
        /// Camera URL (e.g., http://192.168.1.100)
        #[arg(short, long)]
        server: String,

        /// Image route: /bmp, /get, /pgm or /
        #[arg(short, long, default_value = "/bmp")]
        path: String,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Save frames from the multipart stream
    Record {
        /// Camera URL (e.g., http://192.168.1.100)
        #[arg(short, long)]
        server: String,

        /// Number of frames to keep before disconnecting
        #[arg(short, long, default_value_t = 10)]
        frames: usize,

        /// Directory for the frames and manifest.json
        #[arg(short, long)]
        out_dir: PathBuf,
    },
    /// Send one line to the command console, e.g. `console --addr cam:23 -- --video 1`
    Console {
        /// Console address (e.g., 192.168.1.100:23)
        #[arg(short, long)]
        addr: String,

        /// Console options, passed through unchanged
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        line: Vec<String>,
    },
    /// Print the capture status reported by the console
    Status {
        /// Console address (e.g., 192.168.1.100:23)
        #[arg(short, long)]
        addr: String,
    },
}

fn snapshot(server: &str, path: &str, out: &Path, timeout: Duration) -> Result<()> {
    let client = CameraClient::new(server, timeout)?;
    let image = client.snapshot(path)?;
    fs::write(out, &image.body).with_context(|| format!("Failed to write {}", out.display()))?;
    log::info!(
        "Saved {} bytes to {} ({})",
        image.body.len(),
        out.display(),
        image.content_type.as_deref().unwrap_or("unknown type")
    );
    Ok(())
}

fn record(server: &str, frames: usize, out_dir: &Path, timeout: Duration) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let client = CameraClient::new(server, timeout)?;
    let mut stream = client.open_stream()?;
    let mut manifest = Vec::with_capacity(frames);

    while manifest.len() < frames {
        let Some(image) = stream.next_part().context("Stream read failed")? else {
            log::warn!("Stream ended after {} frames", manifest.len());
            break;
        };
        let file = format!("frame_{:04}.{}", manifest.len() + 1, image.extension());
        fs::write(out_dir.join(&file), &image.body)
            .with_context(|| format!("Failed to write {}", file))?;
        log::debug!("Saved {} ({} bytes)", file, image.body.len());

        manifest.push(RecordedFrame {
            file,
            content_type: image.content_type,
            bytes: image.body.len(),
        });
    }

    let manifest_path = out_dir.join("manifest.json");
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
    log::info!("Recorded {} frames into {}", manifest.len(), out_dir.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let timeout = Duration::from_secs(args.timeout);
    match args.command {
        Command::Snapshot { server, path, out } => snapshot(&server, &path, &out, timeout),
        Command::Record {
            server,
            frames,
            out_dir,
        } => record(&server, frames, &out_dir, timeout),
        Command::Console { addr, line } => {
            let reply = send_console_command(&addr, &line.join(" "), timeout)?;
            print!("{}", reply);
            Ok(())
        }
        Command::Status { addr } => {
            let status = fetch_status(&addr, timeout)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}
