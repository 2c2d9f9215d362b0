//! unlocked-client - fetch a key from an unlocked approval server
//!
//! Requests the key named on the command line, waits until an approver
//! accepts or denies the request, and hands the key to the enabled delivery
//! modules (standard output by default).
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, error, info};
use tokio_util::sync::CancellationToken;

use unlocked::delivery::{ModuleRegistry, StdoutModule};
use unlocked::{Core, Lifecycle, UnlockedClient, UnlockedError};

use crate::config::{FileConfig, Settings};

mod config;

/// Exit code for usage and configuration problems.
const CONFIG_EXIT_CODE: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Handle of the key to request
    #[arg(value_name = "KEY_HANDLE")]
    key_handle: String,

    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hostname of the server
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port on the server (default 443)
    #[arg(short, long)]
    port: Option<u16>,

    /// Secret used to authenticate against the server
    #[arg(short, long)]
    secret: Option<String>,

    /// Handle of the client
    #[arg(short, long)]
    user: Option<String>,

    /// Skip certificate and hostname validation
    #[arg(long)]
    skip_validation: bool,

    /// Send the key to the socket passed by systemd socket activation
    #[arg(long)]
    sd_socket: bool,

    /// Seconds between two state queries (default 1)
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Give up after this many state queries
    #[arg(long, value_name = "N")]
    max_polls: Option<u32>,

    /// Timeout for each request in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

const fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Cancels `token` on the first SIGINT or SIGTERM.
#[cfg(unix)]
async fn signal_handler(token: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, cancelling key request"),
        _ = sigint.recv() => info!("SIGINT received, cancelling key request"),
    }
    token.cancel();
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler(token: CancellationToken) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to register Ctrl-C handler")?;
    info!("Ctrl-C received, cancelling key request");
    token.cancel();
    Ok(())
}

fn load_config(args: &Args) -> Result<FileConfig> {
    match &args.config {
        Some(path) => FileConfig::load(path, true),
        None => match FileConfig::default_path() {
            Some(path) => FileConfig::load(&path, false),
            None => Ok(FileConfig::default()),
        },
    }
}

fn build_registry(args: &Args, file: &FileConfig) -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    registry.register(StdoutModule::new());

    #[cfg(unix)]
    {
        let mut socket = unlocked::delivery::SdSocketModule::new();
        if args.sd_socket {
            socket = socket.with_enabled(true);
        }
        registry.register(socket);
    }
    #[cfg(not(unix))]
    if args.sd_socket {
        anyhow::bail!("--sd-socket is only supported on Unix");
    }

    registry.parse_config(&file.raw)?;
    debug!("Delivery modules: {:?}", registry.enabled_names());
    Ok(registry)
}

async fn run(args: &Args) -> Result<ExitCode> {
    let file = load_config(args)?;
    let settings = Settings::merge(args, &file)?;
    let mut registry = build_registry(args, &file)?;

    debug!(
        "Using server {}:{} as {}",
        settings.endpoint.host, settings.endpoint.port, settings.credentials.username
    );
    let client = UnlockedClient::new(&settings.endpoint, settings.credentials, settings.timeout)?;

    let cancel = CancellationToken::new();
    let handler = tokio::spawn(signal_handler(cancel.clone()));

    let core = Core::new(Lifecycle::new(client, settings.poll).with_cancellation(cancel));
    let outcome = core.run(&args.key_handle, &mut registry).await;
    handler.abort();

    match outcome {
        Ok(delivered) => {
            info!("Key request {} fulfilled", delivered.id);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(report(&e)),
    }
}

fn report(err: &UnlockedError) -> ExitCode {
    error!("{err}");
    ExitCode::from(exit_status(err))
}

fn exit_status(err: &UnlockedError) -> u8 {
    u8::try_from(err.exit_code()).unwrap_or(1)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(level_for(args.verbose))
        .parse_default_env()
        .init();

    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(CONFIG_EXIT_CODE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(7), LevelFilter::Trace);
    }

    #[test]
    fn test_args_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_key_handle_is_required() {
        assert!(Args::try_parse_from(["unlocked-client", "-H", "localhost"]).is_err());
    }

    #[test]
    fn test_exit_status_follows_category() {
        assert_eq!(exit_status(&UnlockedError::Denied { id: 1 }), 3);
        assert_eq!(exit_status(&UnlockedError::Cancelled), 130);
    }
}
