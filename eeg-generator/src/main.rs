//! EEG generator: entry point.
//!
//! ```text
//! eeg-generator                        Run with eeg-generator.toml
//! eeg-generator --config <path>        Load a custom config TOML
//! eeg-generator --gen-config           Write default config to stdout
//! eeg-generator --mode replay --file session.csv
//! eeg-generator --port 50020
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eeg_generator::config::{GeneratorConfig, SourceMode};
use eeg_generator::service::GeneratorService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "eeg-generator", about = "Multi-channel EEG sample generator")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "eeg-generator.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Override the signal source.
    #[arg(long, value_enum)]
    mode: Option<SourceMode>,

    /// CSV file for replay mode.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Override the listening port.
    #[arg(short, long)]
    port: Option<u16>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&GeneratorConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = GeneratorConfig::load(&cli.config);
    if let Some(mode) = cli.mode {
        config.signal.mode = mode;
    }
    if let Some(file) = cli.file {
        // A file on the command line implies replay.
        config.signal.mode = SourceMode::Replay;
        config.signal.file = Some(file);
    }
    if let Some(port) = cli.port {
        config.network.port = u32::from(port);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("eeg-generator v{}", env!("CARGO_PKG_VERSION"));

    let mut service = GeneratorService::new(config)?;
    let net = &service.config().network;
    info!(
        "listening on {}:{} (max {} clients)",
        net.host,
        service.config().port(),
        net.max_clients
    );

    let stop = service.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    service.run().await?;
    Ok(())
}
