//! EEG receiver: entry point.
//!
//! ```text
//! eeg-receiver                        Connect with defaults
//! eeg-receiver --config <path>        Use custom config TOML
//! eeg-receiver --gen-config           Dump default config and exit
//! eeg-receiver --host 10.0.0.5 --port 50012 --ws 127.0.0.1:8765
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eeg_receiver::config::ReceiverConfig;
use eeg_receiver::pipeline::ReceiverPipeline;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "eeg-receiver", about = "Multi-channel EEG receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "eeg-receiver.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Generator host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Generator port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Re-publish samples to this WebSocket peer. Example: 127.0.0.1:8765
    #[arg(long)]
    ws: Option<String>,
}

fn parse_host_port(text: &str) -> Option<(String, u16)> {
    let (host, port) = text.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
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

    let mut config = ReceiverConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = u32::from(port);
    }
    if let Some(target) = cli.ws {
        let (host, port) =
            parse_host_port(&target).ok_or_else(|| format!("invalid --ws target: {target}"))?;
        config.websocket.enabled = true;
        config.websocket.host = host;
        config.websocket.port = u32::from(port);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("eeg-receiver v{}", env!("CARGO_PKG_VERSION"));

    let mut pipeline = ReceiverPipeline::new(config);
    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    pipeline.run().await?;
    Ok(())
}
