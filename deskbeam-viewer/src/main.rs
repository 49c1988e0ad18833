//! deskbeam viewer: entry point.
//!
//! ```text
//! deskbeam-viewer                        Connect using the config file
//! deskbeam-viewer --host 10.0.0.5:12346  Connect to a specific host
//! deskbeam-viewer --discover             Search the LAN for a host
//! deskbeam-viewer --pin 123456           Pair without prompting
//! deskbeam-viewer --gen-config           Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deskbeam_viewer::config::ViewerAppConfig;
use deskbeam_viewer::connection::{ViewerSession, find_host};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "deskbeam-viewer", about = "deskbeam remote desktop viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "deskbeam-viewer.toml")]
    config: PathBuf,

    /// Host address (overrides config). Example: 192.168.1.100:12346
    #[arg(long)]
    host: Option<String>,

    /// Ignore the configured address and search the LAN.
    #[arg(long, conflicts_with = "host")]
    discover: bool,

    /// Pairing code shown by the host.
    #[arg(long)]
    pin: Option<String>,

    /// Save the last frame to this PPM file on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerAppConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerAppConfig::load(&cli.config);
    if let Some(addr) = cli.host {
        config.network.host_address = addr;
    }
    if cli.discover {
        config.network.host_address.clear();
    }
    if cli.snapshot.is_some() {
        config.display.snapshot_path = cli.snapshot;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("deskbeam-viewer v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Locate the host ──────────────────────────────────────

    let host = find_host(&config).await?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    // ── 2. Pair ─────────────────────────────────────────────────

    let session = ViewerSession::new(config);
    session.connect(&host).await?;
    if cli.pin.is_none() {
        println!("Enter the pairing code shown on {}:", host.name);
    }
    session.pair_until_accepted(cli.pin, &mut stdin).await?;
    println!("Paired. Commands: move, click, scroll, key, shortcut, clip, chat, quit");

    // ── 3. Stream ───────────────────────────────────────────────

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        ctrl_c.cancel();
    });

    session.run(stdin, cancel).await;

    info!("shutting down");
    Ok(())
}
