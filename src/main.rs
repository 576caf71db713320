mod cli;
mod config;
mod cycle;
mod error;
mod filter;
mod reaction;
mod source;
mod supervisor;
mod ui;
mod watch;

use std::path::Path;

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use config::{StartupSettings, WatchConfig};
use cycle::{CycleMode, CycleOutcome, Watcher};
use reaction::{EmailDigest, SmtpSettings};
use supervisor::Supervisor;
use watch::StateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config_path = config::resolve_config_path(cli.config.clone());

    match cli.subcommand() {
        Command::TestEmail => send_test_email(&config_path).await,
        command => {
            let settings = startup_settings(&config_path);
            let rest_interval_secs = cli.interval_secs.unwrap_or(settings.rest_interval_secs);
            let store = match &settings.state_path {
                Some(path) if cli.dry_run => StateStore::open(path).unwrap_or_else(|e| {
                    tracing::error!(error = %e, "State file unreadable, previewing against an empty store");
                    StateStore::in_memory()
                }),
                Some(path) => StateStore::open_or_recover(path),
                None => StateStore::in_memory(),
            };
            tracing::info!(
                config = %config_path.display(),
                state = ?store.path(),
                known_jobs = store.len(),
                dry_run = cli.dry_run,
                "jobwatch starting",
            );

            let mode = if cli.dry_run {
                CycleMode::DryRun
            } else {
                CycleMode::Live
            };
            let supervisor = Supervisor::new(rest_interval_secs, settings.cycle_timeout);
            let mut watcher = Watcher::new(config_path, store, mode);

            if command == Command::Once {
                if let CycleOutcome::Crashed { reason } = supervisor.run_iteration(&mut watcher, 1).await {
                    bail!("cycle crashed: {reason}");
                }
            } else {
                supervisor.run_until(&mut watcher, shutdown_signal()).await;
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "jobwatch=debug" } else { "jobwatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json());
    let plain_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .init();
}

/// Values that only take effect on restart. A broken config file is not
/// fatal here; the first cycle will report it and keep retrying.
fn startup_settings(config_path: &Path) -> StartupSettings {
    match WatchConfig::load(config_path) {
        Ok(config) => StartupSettings::from_config(&config),
        Err(e) => {
            tracing::warn!(error = %e, "Config unavailable at startup, using defaults");
            StartupSettings::default()
        }
    }
}

async fn send_test_email(config_path: &Path) -> anyhow::Result<()> {
    let email = WatchConfig::load(config_path)
        .map(|c| c.email)
        .unwrap_or_default();
    let smtp = SmtpSettings::from_env().context("SMTP is not configured")?;
    let to = smtp.mail_to.clone();
    EmailDigest::new(smtp, email)
        .send_test()
        .await
        .context("failed to send test email")?;
    println!("Test email sent to {to}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
