use std::{
    num::NonZeroUsize,
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use color_eyre::eyre::Error;
use mlat_feed::{
    config::{
        FeedConfig,
        StationConfig,
    },
    error_log::{
        ERROR_LOG_FILE_NAME,
        ErrorLog,
    },
    pipeline::Pipeline,
    source::TcpConnector,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = args.feed_config();

    std::fs::create_dir_all(&config.output_dir)?;
    let station = StationConfig::load_or_create(&config.output_dir)?;
    tracing::info!(
        location = %station.location_name,
        feed_to_base = station.feed_to_base,
        "station"
    );

    let error_log = ErrorLog::open(config.output_dir.join(ERROR_LOG_FILE_NAME))?;
    let connector = TcpConnector::new(config.address.clone());
    let pipeline = Pipeline::spawn(connector, &config, error_log);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    let stats = pipeline.shutdown().await?;
    tracing::info!(
        num_frames = stats.reader.num_frames,
        num_records = stats.sink.num_records,
        num_errors = stats.num_errors,
        "done"
    );

    Ok(())
}

#[derive(Debug, Parser)]
pub struct Args {
    /// Host of the BEAST server.
    #[clap(long, env = "BEAST_HOST", default_value = "localhost")]
    host: String,

    #[clap(long, env = "BEAST_PORT", default_value = "10003")]
    port: u16,

    /// Directory for the per-second files, the error log and the station
    /// config.
    #[clap(short, long, env = "MLAT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    #[clap(long, default_value = "10s", value_parser = humantime::parse_duration)]
    connect_timeout: Duration,

    /// Wait time after a failed connection attempt.
    #[clap(long, default_value = "3s", value_parser = humantime::parse_duration)]
    retry_delay: Duration,

    /// Start over after this many failed attempts in a row. Retries forever
    /// if not set.
    #[clap(long)]
    max_connect_attempts: Option<NonZeroUsize>,
}

impl Args {
    fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            address: format!("{}:{}", self.host, self.port),
            connect_timeout: self.connect_timeout,
            retry_delay: self.retry_delay,
            max_connect_attempts: self.max_connect_attempts,
            output_dir: self.output_dir.clone(),
            ..Default::default()
        }
    }
}
