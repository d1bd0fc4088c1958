//! Binary entry point for `concierge-bot`.
//!
//! This module provides the command-line interface for concierge-bot with
//! options for configuration file paths and logging verbosity. It initializes
//! the necessary components and starts the service.

use clap::{Parser, Subcommand};
use concierge_bot::base::config::Config;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

/// Concierge-bot – a Slack assistant backed by an LLM.
///
/// Configuration can come from `config.toml` or environment variables.
/// The bot answers direct messages and @-mentions, keeps per-thread
/// conversation history, and can ground answers in a knowledge collection.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// Override the config file path (optional).
    ///
    /// By default, the bot will look for a config file at `.hidden/config.toml`
    /// in the current directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook server (the default).
    Serve,
    /// Ingest a JSON Lines knowledge file into the retrieval collection.
    LoadKnowledge {
        /// Path to the knowledge file.
        file: std::path::PathBuf,
    },
}

/// Main entry point for the concierge-bot binary.
///
/// Sets up logging based on verbosity, loads configuration, and runs the
/// selected command.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Construct the level filter.

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    // Prepare the log layer.

    let stdout = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Prepare the otlp layer.

    let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
    let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_simple_exporter(exporter).build().tracer("concierge-bot");
    let otel = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    let config = Config::load(args.config.as_deref())?;

    match args.command {
        None | Some(Command::Serve) => concierge_bot::start(config).await?,
        Some(Command::LoadKnowledge { file }) => concierge_bot::load_knowledge(config, &file).await?,
    }

    Ok(())
}
