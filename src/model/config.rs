use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULTS: &str = include_str!("../../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub config_file: String,
    pub legacy_config_file: String,
    pub proxy_file: String,
    pub local_plugins_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub url: String,
    pub search_url: String,
    pub docs_url: String,
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config → environment.
    pub fn load() -> Result<Self> {
        let user = directories::ProjectDirs::from("", "", "hpm")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.exists())
            .map(|path| {
                fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
            })
            .transpose()?;

        let mut config = Self::from_layers(user.as_deref())?;

        let registry_env = ["NPM_CONFIG_REGISTRY", "npm_config_registry"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|value| !value.is_empty()));
        if let Some(url) = registry_env {
            tracing::debug!("registry overridden from environment: {url}");
            config.registry.url = url;
        }

        Ok(config)
    }

    /// Merge an optional user TOML document over the built-in defaults.
    pub fn from_layers(user: Option<&str>) -> Result<Self> {
        let mut merged: toml::Value = toml::from_str(DEFAULTS)?;
        if let Some(raw) = user {
            let overlay: toml::Value = toml::from_str(raw).context("invalid user config")?;
            merge(&mut merged, overlay);
        }
        Ok(merged.try_into()?)
    }

    pub fn config_file(&self) -> Result<PathBuf> {
        expand_tilde(&self.paths.config_file)
    }

    pub fn legacy_config_file(&self) -> Result<PathBuf> {
        expand_tilde(&self.paths.legacy_config_file)
    }

    pub fn proxy_file(&self) -> Result<PathBuf> {
        expand_tilde(&self.paths.proxy_file)
    }

    pub fn local_plugins_dir(&self) -> Result<PathBuf> {
        expand_tilde(&self.paths.local_plugins_dir)
    }
}

fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn expand_tilde(path: &str) -> Result<PathBuf> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };
    let home = dirs_home().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(rest.trim_start_matches(['/', '\\'])))
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Optional HTTP proxy settings read from `~/.hpmproxy`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default)]
    pub proxy_host: Option<String>,
    #[serde(default, deserialize_with = "port_number_or_string")]
    pub proxy_port: Option<u16>,
    /// `user:password`
    #[serde(default)]
    pub proxy_auth: Option<String>,
}

impl ProxyConfig {
    /// Read the proxy file. Absent or unreadable files mean a direct connection.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!("ignoring {}: {err}", path.display());
                return None;
            }
        };

        match Self::parse(&raw) {
            Ok(config) if config.missing_host() => {
                tracing::warn!(
                    "{} enables a proxy without proxyHost, connecting directly",
                    path.display()
                );
                Some(config)
            }
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("ignoring malformed {}: {err}", path.display());
                None
            }
        }
    }

    /// Accepts `{"hpmproxy": {...}}` or the bare settings object.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let settings = match value.get("hpmproxy") {
            Some(inner) => inner.clone(),
            None => value,
        };
        serde_json::from_value(settings)
    }

    pub fn is_enabled(&self) -> bool {
        self.use_proxy && !self.missing_host()
    }

    /// `useProxy` is set but there is no host to route through.
    pub fn missing_host(&self) -> bool {
        self.use_proxy && self.proxy_host.as_deref().is_none_or(str::is_empty)
    }
}

fn port_number_or_string<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
