//! framecast - stream a frame buffer as RTP over a TAP interface
//!
//! Usage:
//!   framecast -c framecast.toml
//!   framecast --host-addr 192.168.100.100/24   # also configure the host side
//!
//! Logging follows `RUST_LOG` (default `info`).

use clap::Parser;
use framecast::config::Config;
use framecast::pipeline::Pipeline;
use std::io;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tun_tap::{Iface, Mode};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Address to assign to the host end of the TAP device (CIDR)
    #[arg(short = 'a', long)]
    host_addr: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            log::info!("Using config: {}", path);
            Config::load(path)?
        }
        None => {
            log::info!("Using built-in configuration");
            let config = Config::default();
            config.validate()?;
            config
        }
    };

    let tap_name = config.interface.tap_name.as_str();
    let iface = Iface::without_packet_info(tap_name, Mode::Tap)?;
    iface.set_non_blocking()?;
    log::info!("Opened TAP device {}", iface.name());
    if let Some(cidr) = &args.host_addr {
        configure_interface(iface.name(), cidr)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })?;

    let pipeline = Pipeline::spawn(&config, Arc::new(iface), Arc::clone(&running))?;
    while running.load(Ordering::Relaxed) && !pipeline.is_finished() {
        thread::sleep(Duration::from_millis(100));
    }

    pipeline.shutdown()?;
    Ok(())
}

/// Assign `ip_cidr` to the host side of `iface_name` and bring it up
fn configure_interface(iface_name: &str, ip_cidr: &str) -> io::Result<()> {
    run_ip(&["addr", "add", ip_cidr, "dev", iface_name])?;
    run_ip(&["link", "set", "up", "dev", iface_name])?;
    log::info!("Interface {} configured with {} and brought up", iface_name, ip_cidr);
    Ok(())
}

fn run_ip(args: &[&str]) -> io::Result<()> {
    let status = Command::new("ip").args(args).status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("`ip {}` failed: {}", args.join(" "), status),
        ));
    }
    Ok(())
}
