use anyhow::Result;
use clap::Parser;
use log::{info, warn, LevelFilter};
use std::path::PathBuf;

mod codec;
mod color_format;
mod config;
mod error;
mod gatt_server;
mod output;
mod pixel_buffer;
mod pixel_format;
mod protocol;
mod service;
mod strand;

use config::Config;
use gatt_server::GattServer;

#[derive(Parser)]
#[command(name = "pixel_strand")]
#[command(about = "Pixel Strand Service\n\nExposes an LED strand as a GATT-style service over TCP and drives it over serial.", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    config: PathBuf,

    /// Enable debug output (statistics)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps of every request)
    #[arg(long)]
    ddebug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ddebug implies debug
    let debug = cli.debug || cli.ddebug;
    let level = if cli.ddebug {
        LevelFilter::Trace
    } else if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = Config::load(&cli.config)?;

    // A bad color format stops us here
    let server = GattServer::new(config, debug)?;

    let running = server.get_running_flag();
    let result = ctrlc::set_handler(move || {
        info!("Shutting down...");
        running.store(false, std::sync::atomic::Ordering::Relaxed);
    });

    if let Err(e) = result {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    // Blocks until shutdown
    server.run()?;

    server.shutdown();

    Ok(())
}
