//! CLI entry point for the stop scraper.
//!
//! Fetches departure predictions for a handful of stops, merges them into one
//! schedule and writes it as XML for the display client, either once or in a
//! loop.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use stop_scraper::config::{
    CycleDelay, DEFAULT_CONCURRENCY, DEFAULT_STOPS, DEFAULT_TIMEZONE, ScraperConfig,
    api_key_from_env, parse_stops, parse_timezone,
};
use stop_scraper::cycle::ScrapeCycle;
use stop_scraper::fetch::auth::ApiKey;
use stop_scraper::fetch::{BasicClient, FetchPolicy, HttpFeed, METLINK_PREDICTIONS_URL};
use stop_scraper::output::FileSink;
use stop_scraper::retry::RetryPolicy;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "stop_scraper")]
#[command(about = "Scrape real-time departures for a set of stops into one schedule", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scrape cycle and exit
    Once {
        #[command(flatten)]
        scrape: ScrapeArgs,
    },
    /// Scrape repeatedly, pausing between cycles
    Run {
        #[command(flatten)]
        scrape: ScrapeArgs,

        /// Number of cycles to run (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 0)]
        num_cycles: usize,

        /// Fixed pause between cycles, in seconds
        #[arg(long, default_value_t = 20)]
        cycle_delay: u64,
    },
}

#[derive(Args)]
struct ScrapeArgs {
    /// Comma separated stop ids
    #[arg(short, long, default_value = DEFAULT_STOPS)]
    stops: String,

    /// File the schedule is written to
    #[arg(short, long, default_value = "times.xml")]
    output: String,

    /// Stop predictions endpoint; the stop is sent as `stop_id`
    #[arg(long, default_value = METLINK_PREDICTIONS_URL)]
    base_url: String,

    /// Maximum number of concurrent stop fetches
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// IANA time zone arrival times are shown in
    #[arg(long, default_value = DEFAULT_TIMEZONE)]
    timezone: String,
}

impl ScrapeArgs {
    fn into_config(self, delay: CycleDelay) -> Result<ScraperConfig> {
        Ok(ScraperConfig {
            stops: parse_stops(&self.stops)?,
            base_url: self.base_url,
            api_key: api_key_from_env()?,
            output: self.output,
            concurrency: self.concurrency,
            timezone: parse_timezone(&self.timezone)?,
            fetch: FetchPolicy::default(),
            write: RetryPolicy::new(2, Duration::from_secs(2)),
            delay,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/stop_scraper.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("stop_scraper.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Once { scrape } => {
            let config = scrape.into_config(CycleDelay::default())?;
            let cycle = build_cycle(&config)?;
            let report = cycle.run().await?;
            info!(scrape_date = %report.scrape_date, malformed = report.malformed, "Done");
        }
        Commands::Run {
            scrape,
            num_cycles,
            cycle_delay,
        } => {
            let delay = CycleDelay {
                fixed: Duration::from_secs(cycle_delay),
                ..CycleDelay::default()
            };
            let config = scrape.into_config(delay)?;
            run_forever(&config, num_cycles).await?;
        }
    }

    Ok(())
}

fn build_cycle(config: &ScraperConfig) -> Result<ScrapeCycle<HttpFeed<ApiKey<BasicClient>>, FileSink>> {
    let client = BasicClient::new().context("failed to build HTTP client")?;
    let client = ApiKey::metlink(client, &config.api_key)?;
    let feed = HttpFeed::new(client, &config.base_url)?;
    Ok(ScrapeCycle::new(
        Arc::new(feed),
        FileSink::new(&config.output),
        config.settings(),
    ))
}

/// Runs cycles until `num_cycles` is reached (0 = forever) or Ctrl+C.
///
/// A failed cycle is logged and the loop carries on with the next one.
#[tracing::instrument(skip(config), fields(output = %config.output, stops = config.stops.len()))]
async fn run_forever(config: &ScraperConfig, num_cycles: usize) -> Result<()> {
    let cycle = build_cycle(config)?;

    if num_cycles == 0 {
        info!("Scraping until interrupted. Press Ctrl+C to stop.");
    } else {
        info!(num_cycles, "Starting scrape cycles");
    }

    let mut cycle_count = 0;
    loop {
        if num_cycles > 0 && cycle_count >= num_cycles {
            break;
        }
        cycle_count += 1;

        let wrote = match cycle.run().await {
            Ok(report) => {
                info!(cycle = cycle_count, malformed = report.malformed, "Cycle complete");
                true
            }
            Err(e) => {
                error!(cycle = cycle_count, error = %e, "Cycle failed, nothing written");
                false
            }
        };

        if num_cycles > 0 && cycle_count >= num_cycles {
            break;
        }

        let wait = config.delay.after(wrote);
        info!(wait_secs = wait.as_secs(), "Waiting before next scrape");
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
        }
    }

    info!(cycles = cycle_count, "Finished scraping");
    Ok(())
}
