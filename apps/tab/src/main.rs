//! Encore Tab - one participant in Encore's cross-tab playback coordination.
//!
//! Every process started against the same storage file behaves like a browser
//! tab of the app: it joins leader election, and only the leader registers a
//! playback device with the provider. Commands are read from stdin and domain
//! events are printed to stdout as JSON lines.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use encore_core::{
    bootstrap_tab, FileStorage, LoggingEventEmitter, ProxyTokenEndpoint, RemoteDeviceConnector,
    TabDependencies, TabId, TabServices, WebApiClient,
};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use crate::commands::{Command, HELP};
use crate::config::TabConfig;

/// Encore Tab - cross-tab playback coordination from a terminal.
#[derive(Parser, Debug)]
#[command(name = "encore-tab")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ENCORE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Shared storage file (overrides config file).
    #[arg(short, long, env = "ENCORE_STORAGE_PATH")]
    storage: Option<PathBuf>,

    /// Fixed tab identity instead of a random one.
    #[arg(long)]
    tab_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Encore Tab v{}", env!("CARGO_PKG_VERSION"));

    let mut config = TabConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(storage) = args.storage {
        config.storage_path = storage;
    }
    log::info!(
        "Configuration: storage={}, auth_server={}",
        config.storage_path.display(),
        config.auth_server_url
    );

    let web_api = Arc::new(WebApiClient::new().context("Failed to create Web API client")?);
    let connector = RemoteDeviceConnector::new(web_api.clone())
        .with_poll_interval(Duration::from_millis(config.device_poll_interval_ms));
    let token_endpoint = ProxyTokenEndpoint::new(config.auth_server_url.clone())
        .context("Failed to create token endpoint")?;

    let mut deps = TabDependencies::new(
        Arc::new(FileStorage::new(&config.storage_path)),
        Arc::new(token_endpoint),
        Arc::new(connector),
        web_api,
    );
    deps.external_emitter = Some(Arc::new(LoggingEventEmitter));
    deps.tab_id = args.tab_id.map(TabId::from);

    let services =
        bootstrap_tab(&config.coordinator, deps).context("Failed to bootstrap tab")?;
    services.start_background_tasks();

    let printer = tokio::spawn(print_events(services.event_bridge.stream()));

    eprintln!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        log::error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                match commands::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => run_command(&services, command).await,
                    Ok(None) => {}
                    Err(e) => eprintln!("{}\n{}", e, HELP),
                }
            }
        }
    }

    log::info!("Shutting down...");
    services.shutdown().await;
    printer.abort();
    Ok(())
}

async fn run_command(services: &TabServices, command: Command) {
    let session = &services.session;
    let result = match command {
        Command::Play(uri) => services.play(&uri).await.map_err(anyhow::Error::from),
        Command::Pause => session.pause().await.map_err(Into::into),
        Command::Resume => session.resume().await.map_err(Into::into),
        Command::Toggle => session.toggle_play().await.map_err(Into::into),
        Command::Next => session.next().await.map_err(Into::into),
        Command::Previous => session.previous().await.map_err(Into::into),
        Command::Seek(position_ms) => {
            session.begin_seek();
            session.commit_seek(position_ms).await.map_err(Into::into)
        }
        Command::Volume(volume) => session.set_volume(volume).await.map_err(Into::into),
        Command::Status => {
            print_status(services);
            Ok(())
        }
        Command::Login(fragment) => services
            .authorize_from_fragment(&fragment)
            .map_err(Into::into),
        Command::Quit => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
    }
}

fn print_status(services: &TabServices) {
    let display = services.display();
    let track = display
        .transport
        .track
        .as_ref()
        .map(|t| t.name.as_str())
        .unwrap_or("-");
    eprintln!(
        "tab {} | {:?} | device {:?} | {} | {} | volume {:.0}%",
        services.coordinator.tab_id(),
        display.leader,
        display.device,
        track,
        display.progress_label(),
        display.volume * 100.0
    );
    if let Some(message) = display.notice.message() {
        eprintln!("{}", message);
    }
}

/// Prints every domain event as one JSON line.
async fn print_events<S, E>(mut events: S)
where
    S: futures::Stream<Item = Result<encore_core::BroadcastEvent, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => log::warn!("Failed to serialize event: {}", e),
            },
            Err(e) => log::warn!("Event stream: {}", e),
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
