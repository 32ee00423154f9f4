use std::io::{self, Write};
use std::process::{ExitCode, Stdio};

use anyhow::Result;

use crate::cli::Commands;
use crate::error::HpmError;
use crate::model::config::AppConfig;
use crate::model::plugin_list::ListKind;
use crate::plugin::manifest::{PackageSummary, PluginId, filter_packages};
use crate::plugin::{PluginInstaller, PluginManager, Registry};

const MISSING_HYPER: &str = "You don't have Hyper installed! :(\n\
You are missing awesomeness.\n\
Check it out: https://hyper.is/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => ExitCode::SUCCESS,
            Status::Failure => ExitCode::FAILURE,
        }
    }
}

/// Runs one command against the user's configuration and reports the result.
pub struct App<R> {
    config: AppConfig,
    manager: PluginManager<R>,
    installer: PluginInstaller,
}

impl<R: Registry> App<R> {
    pub fn new(config: AppConfig, manager: PluginManager<R>, installer: PluginInstaller) -> Self {
        Self {
            config,
            manager,
            installer,
        }
    }

    /// Execute `command`, writing results to `out` and diagnostics to `err`.
    pub async fn run(
        &mut self,
        command: Commands,
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> Result<Status> {
        if !self.manager.exists() {
            tracing::warn!("{} missing", self.manager.config_path().display());
            writeln!(err, "{MISSING_HYPER}")?;
            return Ok(Status::Failure);
        }

        match command {
            Commands::Install { plugin } => {
                let plugin = PluginId::new(plugin);
                let result = self.manager.install(&plugin, ListKind::Tracked).await;
                report(result, out, err, || format!("{plugin} installed successfully!"))
            }
            Commands::Uninstall { plugin } => {
                let plugin = PluginId::new(plugin);
                let result = self.manager.uninstall(&plugin).await;
                report(result, out, err, || format!("{plugin} uninstalled successfully!"))
            }
            Commands::List => self.list(out, err),
            Commands::Search { query } => {
                let query = query.unwrap_or_default();
                self.search(Some(&query), out, err).await
            }
            Commands::ListRemote => self.search(None, out, err).await,
            Commands::Docs { plugin } => self.docs(&plugin, err),
            Commands::Fork { plugin } => {
                let plugin = PluginId::new(plugin);
                match self.installer.fork(&mut self.manager, &plugin).await {
                    Ok(path) => {
                        writeln!(out, "{plugin} installed locally successfully!")?;
                        writeln!(out, "Check {}", path.display())?;
                        Ok(Status::Success)
                    }
                    Err(error) => report::<()>(Err(error), out, err, String::new),
                }
            }
        }
    }

    fn list(&self, out: &mut impl Write, err: &mut impl Write) -> Result<Status> {
        match self.manager.list() {
            Some(plugins) if plugins.is_empty() => {
                writeln!(out, "No plugins installed yet.")?;
                Ok(Status::Success)
            }
            Some(plugins) => {
                writeln!(out, "{plugins}")?;
                Ok(Status::Success)
            }
            None => {
                writeln!(
                    err,
                    "Could not read the `plugins` list in {}",
                    self.manager.config_path().display()
                )?;
                Ok(Status::Failure)
            }
        }
    }

    async fn search(
        &self,
        query: Option<&str>,
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> Result<Status> {
        let packages = match self.manager.registry().search().await {
            Ok(packages) => packages,
            Err(error) => return report::<()>(Err(error), out, err, String::new),
        };

        let packages = match query {
            Some(query) => {
                let query = query.to_lowercase();
                let found = filter_packages(packages, &query);
                if found.is_empty() {
                    writeln!(err, "Your search '{query}' did not match any plugins")?;
                    writeln!(err, "Try hpm ls-remote")?;
                    return Ok(Status::Failure);
                }
                found
            }
            None => packages,
        };

        write!(out, "{}", format_columns(&packages))?;
        Ok(Status::Success)
    }

    fn docs(&self, plugin: &str, err: &mut impl Write) -> Result<Status> {
        let url = docs_url(&self.config.registry.docs_url, plugin);
        tracing::info!("opening {url}");
        if let Err(error) = open_url(&url) {
            writeln!(err, "Could not open {url}: {error}")?;
            return Ok(Status::Failure);
        }
        Ok(Status::Success)
    }
}

fn report<T>(
    result: Result<T, HpmError>,
    out: &mut impl Write,
    err: &mut impl Write,
    success: impl FnOnce() -> String,
) -> Result<Status> {
    match result {
        Ok(_) => {
            writeln!(out, "{}", success())?;
            Ok(Status::Success)
        }
        Err(error) => {
            if error.is_rejection() {
                tracing::warn!("{error}");
            } else {
                tracing::error!("{error:?}");
            }
            writeln!(err, "{error}")?;
            Ok(Status::Failure)
        }
    }
}

pub fn docs_url(base: &str, plugin: &str) -> String {
    format!("{}/{plugin}", base.trim_end_matches('/'))
}

/// Name and description in two aligned columns, one package per line.
pub fn format_columns(packages: &[PackageSummary]) -> String {
    let width = packages
        .iter()
        .map(|package| package.name.chars().count())
        .max()
        .unwrap_or(0);

    packages
        .iter()
        .map(|package| {
            let description = package.description.as_deref().unwrap_or("").trim();
            let line = format!("{:<width$}  {description}", package.name);
            format!("{}\n", line.trim_end())
        })
        .collect()
}

/// Hand `url` to the platform's opener without waiting for it.
fn open_url(url: &str) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut command = std::process::Command::new("open");
        command.arg(url);
        command
    };
    #[cfg(windows)]
    let mut command = {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", ""]).arg(url);
        command
    };
    #[cfg(not(any(target_os = "macos", windows)))]
    let mut command = {
        let mut command = std::process::Command::new("xdg-open");
        command.arg(url);
        command
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(drop)
}
