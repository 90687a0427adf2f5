use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use seedfeed_ingest::{FeedConfig, LogFormat, supervisor};
use tracing_subscriber::EnvFilter;

/// Stream SeedLink waveforms into InfluxDB.
#[derive(Parser)]
#[command(name = "seedfeed", version, long_about = None)]
struct Cli {
    /// TOML configuration file. Environment variables prefixed SEEDFEED_
    /// override it (SEEDFEED_INFLUXDB__TOKEN=...).
    #[arg(short, long, env = "SEEDFEED_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match FeedConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("seedfeed: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.log_format);

    supervisor::run(config).await
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
