//! deskbeam host: entry point.
//!
//! ```text
//! deskbeam-host                   Run in the foreground
//! deskbeam-host --config <path>   Load a custom config TOML
//! deskbeam-host --gen-config      Write default config to stdout
//! deskbeam-host --write-config    Write default config to --config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deskbeam_host::config::HostConfig;
use deskbeam_host::service::HostService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "deskbeam-host", about = "deskbeam remote desktop host")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "deskbeam-host.toml")]
    config: PathBuf,

    /// Override the TCP listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    write_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if cli.write_config {
        HostConfig::write_default(&cli.config)?;
        println!("Wrote {}", cli.config.display());
        return Ok(());
    }

    // Load config.
    let mut config = HostConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.listen_port = port;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("deskbeam-host v{}", env!("CARGO_PKG_VERSION"));
    info!("listen port: {}", config.network.listen_port);
    info!(
        "discovery: {}",
        if config.network.discovery { "on" } else { "off" }
    );
    let (width, height) = config.screen_size();
    info!("screen: {width}x{height} @ {} fps", config.screen.fps.clamp(1, 60));

    let service = HostService::new(&config);
    let addr = service.start().await?;
    info!("waiting for a viewer on {addr}");

    // Ctrl-C handler.
    let stop = CancellationToken::new();
    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop_clone.cancel();
    });

    service.run(stop).await;

    Ok(())
}
