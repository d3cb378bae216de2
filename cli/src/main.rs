//! logflux CLI
//!
//! Reads newline-delimited JSON log events and forwards them to a
//! time-series store through the logflux sink.
//!
//! # Usage
//!
//! ```bash
//! logflux --help
//! logflux ensure-db
//! tail -f app.ndjson | logflux ship
//! logflux --backend console ship events.ndjson
//! ```
//!
//! Connection settings come from `LOGFLUX_*` environment variables, which
//! may also be placed in a `.env` file.

#![deny(unsafe_code)]

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sink::batching::Enqueue;
use sink::models::LogEvent;
use sink::writer::{ClickHouseWriter, ConsoleWriter, InfluxDbWriter, PointWriter};
use sink::{LogSink, SinkConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// logflux CLI - forward log events to a time-series store
#[derive(Parser)]
#[command(name = "logflux")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Destination to write points to
    #[arg(short, long, env = "LOGFLUX_BACKEND", value_enum, default_value_t = Backend::Influx)]
    backend: Backend,

    /// Events per batch (overrides `LOGFLUX_BATCH_SIZE`)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Flush period in seconds (overrides `LOGFLUX_PERIOD_SECS`)
    #[arg(long)]
    period_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read NDJSON events from a file or stdin and ship them
    Ship {
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,
    },
    /// Create the target database if it does not exist
    EnsureDb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// InfluxDB 1.x HTTP API
    Influx,
    /// `ClickHouse` HTTP interface
    Clickhouse,
    /// Print line protocol to stdout
    Console,
}

/// What happened to the input lines.
#[derive(Debug, Default, PartialEq, Eq)]
struct ShipSummary {
    accepted: u64,
    dropped: u64,
    malformed: u64,
}

fn load_config(cli: &Cli) -> anyhow::Result<SinkConfig> {
    let mut config = SinkConfig::from_env().context("Failed to load configuration")?;
    if let Some(size) = cli.batch_size {
        anyhow::ensure!(size > 0, "--batch-size must be greater than zero");
        config.batch_size_limit = size;
    }
    if let Some(secs) = cli.period_secs {
        anyhow::ensure!(secs > 0, "--period-secs must be greater than zero");
        config.period = Duration::from_secs(secs);
    }
    Ok(config)
}

fn build_writer(backend: Backend, config: &SinkConfig) -> anyhow::Result<Arc<dyn PointWriter>> {
    let writer: Arc<dyn PointWriter> = match backend {
        Backend::Influx => Arc::new(
            InfluxDbWriter::from_config(config).context("Failed to create InfluxDB client")?,
        ),
        Backend::Clickhouse => Arc::new(ClickHouseWriter::from_config(config)),
        Backend::Console => Arc::new(ConsoleWriter::stdout()),
    };
    Ok(writer)
}

/// Parses one input line. Blank lines yield `None`.
fn parse_line(line: &str) -> Option<Result<LogEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(serde_json::from_str(line))
    }
}

/// Feeds every line of `reader` into the sink until end of input.
///
/// Counts go into `summary` as lines are read, so they survive an
/// interrupted read.
async fn ship_lines<R>(reader: R, sink: &LogSink, summary: &mut ShipSummary) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_number = 0_u64;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_number += 1;
        match parse_line(&line) {
            None => {}
            Some(Ok(event)) => match sink.emit(event) {
                Enqueue::Accepted => summary.accepted += 1,
                Enqueue::Dropped => summary.dropped += 1,
                Enqueue::Closed => break,
            },
            Some(Err(e)) => {
                warn!(line = line_number, error = %e, "Skipping malformed event");
                summary.malformed += 1;
            }
        }
    }

    Ok(())
}

/// Ships `reader` until end of input or until `stop` completes.
async fn ship_until<R, S>(reader: R, sink: &LogSink, stop: S) -> anyhow::Result<ShipSummary>
where
    R: AsyncBufRead + Unpin,
    S: std::future::Future<Output = std::io::Result<()>>,
{
    let mut summary = ShipSummary::default();
    tokio::select! {
        result = ship_lines(reader, sink, &mut summary) => result?,
        signal = stop => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Interrupted, flushing buffered events");
        }
    }
    Ok(summary)
}

async fn ship(file: Option<PathBuf>, sink: &LogSink) -> anyhow::Result<ShipSummary> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match file {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    ship_until(reader, sink, tokio::signal::ctrl_c()).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so the console backend can own stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let writer = build_writer(cli.backend, &config)?;

    match cli.command {
        Commands::EnsureDb => {
            let database = config.connection.database_name.clone();
            writer
                .ensure_database(&database)
                .await
                .with_context(|| format!("Failed to ensure database '{database}'"))?;
            info!(database = %database, "Database is ready");
        }
        Commands::Ship { file } => {
            let sink = LogSink::new(config, writer).context("Failed to start the sink")?;
            let result = ship(file, &sink).await;
            sink.shutdown().await.context("Failed to flush buffered events")?;

            let summary = result?;
            let stats = sink.stats();
            info!(
                accepted = summary.accepted,
                dropped = summary.dropped,
                malformed = summary.malformed,
                batches_written = stats.batches_written,
                batches_failed = stats.batches_failed,
                "Done"
            );
            if stats.batches_failed > 0 {
                anyhow::bail!("{} batches could not be written", stats.batches_failed);
            }
        }
    }

    Ok(())
}
