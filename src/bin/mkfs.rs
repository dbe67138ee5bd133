//! Formats a new filesystem image file.
//!
//! The teacher's own `mkfs` binary parses `env::args()` by hand; this one
//! takes a `clap` dependency instead (grounded on the `clap`-based
//! `mkfs`-style CLI in the ext2 FUSE reference example), since the image
//! size needs validated numeric parsing that's awkward to hand-roll well.

use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use sectorfs::{Filesystem, block::FileBlockDevice, param::SECTOR_SIZE};

/// Formats a sector-addressable filesystem image.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the image file to create (overwritten if it exists).
    image: String,

    /// Size of the image in sectors.
    #[arg(long, default_value_t = 8192)]
    sectors: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("mkfs failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let device = FileBlockDevice::create(&args.image, args.sectors)?;
    Filesystem::format(device)?.done()?;
    info!(
        "wrote {} ({} sectors, {} bytes)",
        args.image,
        args.sectors,
        args.sectors as usize * SECTOR_SIZE
    );
    Ok(())
}
