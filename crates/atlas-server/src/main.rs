//! atlas-server entry point

use std::path::PathBuf;

use anyhow::Context;
use atlas_server::telemetry::{self, LogFormat};
use atlas_server::{ServerSettings, run, shutdown_signal};
use clap::Parser;

/// Atlas API server with OpenID Connect bearer authentication
#[derive(Parser, Debug)]
#[command(name = "atlas-server", version, about, author)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "ATLAS_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host, overriding the configuration
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Log line format, overriding the configuration
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Raise the log level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<ServerSettings> {
        let mut settings =
            ServerSettings::load(self.config.as_deref()).context("Failed to load settings")?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        match self.verbose {
            0 => {}
            1 => settings.log.level = "debug".to_string(),
            _ => settings.log.level = "trace".to_string(),
        }

        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    telemetry::init(&settings.log, cli.log_format).context("Failed to initialize logging")?;

    run(settings, shutdown_signal())
        .await
        .context("atlas-server terminated")
}
