//! fbxfer - copy an image into or out of a device frame buffer window
//!
//! Usage:
//!   fbxfer -f image.raw                # write image.raw into window 0
//!   fbxfer -f capture.raw -r -b 2      # read window 2 into capture.raw
//!
//! Images are raw 16-bit pixels, `xres * yres * 2` bytes.

use clap::Parser;
use framecast::error::{Error, Result};
use framecast::framebuf::{image_len, read_image, write_image};
use std::fs::{self, OpenOptions};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image file on the host
    #[arg(short, long)]
    file: String,

    /// Frame buffer device
    #[arg(short, long, default_value = "/dev/netv20")]
    dev: String,

    /// Read from the device into the file (default: write file to device)
    #[arg(short, long)]
    read: bool,

    /// Frame buffer window index
    #[arg(short, long, default_value_t = 0)]
    buffer: u32,

    /// Horizontal resolution
    #[arg(short = 'x', long, default_value_t = 800)]
    xres: u32,

    /// Vertical resolution
    #[arg(short = 'y', long, default_value_t = 600)]
    yres: u32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let len = image_len(args.xres, args.yres);

    if args.read {
        let mut device = OpenOptions::new().read(true).open(&args.dev)?;
        let image = read_image(&mut device, args.buffer, len)?;
        fs::write(&args.file, &image)?;
        log::info!(
            "Read {} bytes from {} window {} into {}",
            len,
            args.dev,
            args.buffer,
            args.file
        );
    } else {
        let image = fs::read(&args.file)?;
        if image.len() < len {
            return Err(Error::InvalidParameter(format!(
                "{} holds {} bytes, {}x{} needs {}",
                args.file,
                image.len(),
                args.xres,
                args.yres,
                len
            )));
        }
        if image.len() > len {
            log::warn!(
                "{} holds {} bytes, writing the first {}",
                args.file,
                image.len(),
                len
            );
        }
        let mut device = OpenOptions::new().write(true).open(&args.dev)?;
        write_image(&mut device, args.buffer, &image[..len])?;
        log::info!(
            "Wrote {} bytes from {} to {} window {}",
            len,
            args.file,
            args.dev,
            args.buffer
        );
    }
    Ok(())
}
