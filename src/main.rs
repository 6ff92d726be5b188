use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gula::agent::ChatTransport;
use gula::ui::{render_events, spawn_input_reader, UiEvent, HELP_TEXT};
use gula::{util, App, Config, HttpTransport, ToolRegistry};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "gula-ai", version, about = "Terminal client for the Gula agent service")]
struct Cli {
    /// Config file (defaults to ~/.gula-agent/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Agent service URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Model for new conversations
    #[arg(long)]
    model: Option<String>,

    /// Do not ask the server to search the indexed codebase
    #[arg(long)]
    no_rag: bool,

    /// Directory local tools run in
    #[arg(long, value_name = "DIR")]
    working_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Check that the agent service is reachable and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    util::init_data_dir(None);
    init_logging(cli.verbose)?;

    let config = load_config(&cli)?;
    tracing::info!(api_url = %config.api_url, model = %config.default_model, "Starting gula-ai");

    let transport = Arc::new(HttpTransport::new(
        &config.api_url,
        config.access_token.clone(),
    ));

    if cli.health {
        return Ok(match transport.health_check().await {
            Ok(()) => {
                println!("{} is healthy", transport.base_url());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        });
    }

    let executor = Arc::new(ToolRegistry::new(config.working_dir.clone()));
    let (action_tx, action_rx) = mpsc::unbounded_channel();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let renderer = tokio::spawn(render_events(ui_rx, std::io::stdout()));
    let _ = ui_tx.send(UiEvent::Info(format!(
        "gula-ai {} ({})\n{HELP_TEXT}",
        env!("CARGO_PKG_VERSION"),
        config.working_dir.display()
    )));
    spawn_input_reader(action_tx, ui_tx.clone()).context("failed to start input reader")?;

    let mut app = App::new(&config, transport, executor, ui_tx);
    app.run(action_rx).await;

    // The renderer ends once every UI sender is gone
    drop(app);
    renderer.await?;
    Ok(ExitCode::SUCCESS)
}

fn init_logging(verbose: bool) -> Result<()> {
    // Log to a file so the terminal output stays clean
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url.clone());
    }
    if let Some(model) = &cli.model {
        config = config.with_model(model.clone());
    }
    if cli.no_rag {
        config = config.with_rag(false);
    }
    if let Some(dir) = &cli.working_dir {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("invalid working directory {}", dir.display()))?;
        config = config.with_working_dir(dir);
    }
    Ok(config)
}
