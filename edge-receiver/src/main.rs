//! edge-receiver entry point.
//!
//! ```text
//! edge-receiver                  Listen with the default config
//! edge-receiver --config <path>  Load a custom config TOML
//! edge-receiver --port <port>    Override the listen port
//! edge-receiver --gen-config     Write default config to stdout
//! edge-receiver --write-config <path>  Write default config to a file
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use edge_receiver::config::ReceiverConfig;
use edge_receiver::service::ReceiverService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "edge-receiver", about = "Records H.264 and JPEG streams from an edge sender")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "edge-receiver.toml")]
    config: PathBuf,

    /// Listen port, overriding the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to this file and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    if let Some(path) = &cli.write_config {
        ReceiverConfig::write_default(path)?;
        println!("Default config written to {}", path.display());
        return Ok(());
    }

    let mut config = ReceiverConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("edge-receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("listen address: {}", config.listen_addr());
    info!("framing: {}", config.network.framing);
    if let Some(path) = config.h264_path() {
        info!("h264 output: {}", path.display());
    }
    if let Some(path) = config.jpeg_path() {
        info!("jpeg snapshot: {}", path.display());
    }

    let service = ReceiverService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    service.run().await?;
    Ok(())
}
