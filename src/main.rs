use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use live_translate::config::{Config, ConfigFile};
use live_translate::engine::EngineOptions;
use live_translate::pipeline::{print_summary, translate_document};
use live_translate::translate::OpenAiChatClient;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "live-translate")]
#[command(version, about = "Streaming document translation into Mongolian Cyrillic")]
#[command(
    long_about = "Translate the text of HTML documents in batches through an OpenAI-compatible chat endpoint, streaming results back as they arrive."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Translate an HTML document
    Translate {
        /// Input HTML file
        input: PathBuf,

        /// Output file (defaults to <input>.mn.html)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Text units per remote call
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Save the endpoint settings to the config file
    Configure {
        /// Chat completion endpoint URL
        #[arg(long)]
        endpoint_url: Option<String>,

        /// API key sent in the api-key header
        #[arg(long)]
        api_key: Option<String>,

        /// Text units per remote call
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Show the effective settings
    Config,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn derive_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let mut output = input.to_path_buf();
    output.set_file_name(format!("{}.mn.html", stem.to_string_lossy()));
    output
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Translate {
            input,
            output,
            batch_size,
        } => run_translate(input, output, batch_size).await,
        Command::Configure {
            endpoint_url,
            api_key,
            batch_size,
        } => run_configure(endpoint_url, api_key, batch_size),
        Command::Config => run_show_config(),
    }
}

async fn run_translate(
    input: PathBuf,
    output: Option<PathBuf>,
    batch_size: Option<usize>,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let output = output.unwrap_or_else(|| derive_output_path(&input));

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(size) = batch_size {
        config.batch_size = size;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    info!("Input:    {}", input.display());
    info!("Output:   {}", output.display());
    info!("Batch:    {} per request", config.batch_size);
    if config.credentials().is_none() {
        warn!("Endpoint URL or API key not set; waiting for `live-translate configure`");
    }

    let shutdown = CancellationToken::new();
    let handler_token = shutdown.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing the current batch...");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let backend = OpenAiChatClient::with_timeout(config.request_timeout())
        .context("Failed to create HTTP client")?;
    let options = EngineOptions::from(&config);

    // Credentials come from disk and the environment on demand, so
    // `configure` can be run from another terminal while this waits.
    let result = translate_document(&input, &output, backend, ConfigFile::new(), options, shutdown)
        .await
        .context("Translation failed")?;

    print_summary(&result);
    Ok(())
}

fn run_configure(
    endpoint_url: Option<String>,
    api_key: Option<String>,
    batch_size: Option<usize>,
) -> Result<()> {
    let mut config = match Config::config_file_path() {
        // Refuse to overwrite a file we could not read.
        Some(path) => Config::load_strict(&path)
            .with_context(|| format!("Cannot update {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(url) = endpoint_url {
        config.endpoint_url = Some(url);
    }
    if let Some(key) = api_key {
        config.api_key = Some(key);
    }
    if let Some(size) = batch_size {
        config.batch_size = size;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    let path = config.save().context("Failed to save configuration")?;
    println!("Saved settings to {}", path.display());
    Ok(())
}

fn run_show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match Config::config_file_path() {
        Some(path) => println!("Config file:   {}", path.display()),
        None => println!("Config file:   (no config directory)"),
    }
    println!(
        "Endpoint URL:  {}",
        config.endpoint_url.as_deref().unwrap_or("(not set)")
    );
    println!("API key:       {}", config.masked_api_key());
    println!("Batch size:    {}", config.batch_size);
    println!("Poll interval: {} ms", config.poll_interval_ms);
    println!("Timeout:       {} s", config.request_timeout_secs);
    Ok(())
}
