mod app;
mod cli;
mod error;
mod model;
mod plugin;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use cli::Cli;
use model::config::{AppConfig, ProxyConfig};
use plugin::{NpmRegistry, PluginInstaller, PluginManager};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let _guard = init_logging()?;
    tracing::info!(command = ?cli.command, "hpm starting");

    let config = AppConfig::load()?;
    let proxy = ProxyConfig::load(&config.proxy_file()?);
    let registry = NpmRegistry::new(&config.registry, proxy.as_ref())?;

    let manager = match PluginManager::open(
        &config.config_file()?,
        &config.legacy_config_file()?,
        registry,
    )
    .await
    {
        Ok(manager) => manager,
        Err(err) => {
            tracing::error!("{err:?}");
            eprintln!("{err}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let installer = PluginInstaller::new(config.local_plugins_dir()?);

    let mut app = App::new(config, manager, installer);
    let status = app
        .run(cli.command, &mut std::io::stdout(), &mut std::io::stderr())
        .await?;

    tracing::info!(?status, "hpm finished");
    Ok(status.into())
}

/// Log to a daily file in the data directory. Stdout carries command output.
fn init_logging() -> Result<WorkerGuard> {
    let log_dir = directories::ProjectDirs::from("", "", "hpm")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("hpm"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "hpm.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hpm=info"));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    Ok(guard)
}
