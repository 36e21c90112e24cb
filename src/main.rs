use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use topsites::config::parse_countries;
use topsites::{
    info_time, process, Config, Credentials, Result, DEFAULT_CONCURRENCY, DEFAULT_COUNT,
    DEFAULT_COUNTRIES, DEFAULT_MAX_RETRIES, DEFAULT_START, DEFAULT_TIMEOUT_SECS,
};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Pull Alexa Top Sites reports and write one CSV per country.
#[derive(Debug, Parser)]
#[command(name = "topsites", version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
    /// Number of records per country. Only whole pages of 100 are fetched.
    #[arg(short = 'n', long, default_value_t = DEFAULT_COUNT)]
    count: u32,
    /// Start record (1-based).
    #[arg(short = 's', long, default_value_t = DEFAULT_START)]
    start: u32,
    /// Comma separated country codes.
    #[arg(short = 'c', long, default_value_t = DEFAULT_COUNTRIES.join(","))]
    countries: String,
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// Service endpoint; its host is part of the signature.
    #[arg(long, default_value = "https://ats.amazonaws.com/")]
    endpoint: Url,
    /// Countries fetched at the same time.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Retries per page on transport errors and 5xx responses.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: usize,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: Option<String>,
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let credentials = Credentials::new(self.access_key_id, self.secret_access_key)?;
        let mut config = Config::new(credentials);
        config.endpoint = self.endpoint;
        config.countries = parse_countries(&self.countries);
        config.count = self.count;
        config.start = self.start;
        config.output_dir = self.output_dir;
        config.max_concurrency = self.concurrency;
        config.max_retries = self.retries;
        config.timeout = Duration::from_secs(self.timeout_secs);
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let start_time = Local::now();
    let config = Args::parse().into_config()?;
    process::run(config).await?;
    info_time!(start_time, "Full program time:");

    Ok(())
}
