use std::path::{Path, PathBuf};

use crate::error::HpmError;
use crate::model::document::ConfigDocument;
use crate::model::plugin_list::ListKind;
use crate::plugin::manifest::PluginId;
use crate::plugin::registry::Registry;

/// Install, uninstall and query plugins in the user's Hyper config.
///
/// Owns the loaded document for the lifetime of one command; every mutation
/// is persisted before the operation returns.
pub struct PluginManager<R> {
    config_path: PathBuf,
    document: Option<ConfigDocument>,
    registry: R,
}

impl<R: Registry> PluginManager<R> {
    /// Load the config at `config_path`. A missing file is not an error: the
    /// manager is returned without a document and [`Self::exists`] is false.
    pub async fn open(config_path: &Path, legacy_path: &Path, registry: R) -> Result<Self, HpmError> {
        let document = match ConfigDocument::load(config_path, legacy_path).await {
            Ok(document) => Some(document),
            Err(HpmError::ConfigNotFound { .. }) => {
                tracing::info!("{} not found", config_path.display());
                None
            }
            Err(err) => return Err(err),
        };

        Ok(Self::new(config_path.to_path_buf(), document, registry))
    }

    pub fn new(config_path: PathBuf, document: Option<ConfigDocument>, registry: R) -> Self {
        Self {
            config_path,
            document,
            registry,
        }
    }

    /// Whether the Hyper config file was found.
    pub fn exists(&self) -> bool {
        self.document.is_some()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn is_installed(&self, plugin: &PluginId, list: ListKind) -> bool {
        self.document
            .as_ref()
            .and_then(|document| document.list(list))
            .is_some_and(|entries| entries.contains(plugin.as_str()))
    }

    /// Tracked plugin identifiers, one per line. `None` when the list could
    /// not be read at all, as opposed to `Some("")` for an empty list.
    pub fn list(&self) -> Option<String> {
        let plugins = self.document.as_ref()?.list(ListKind::Tracked)?;
        Some(plugins.names().join("\n"))
    }

    pub async fn check_exists(&self, plugin: &PluginId) -> Result<(), HpmError> {
        self.registry.check_exists(plugin).await
    }

    /// Add `plugin` to `list` after confirming the registry knows it.
    pub async fn install(&mut self, plugin: &PluginId, list: ListKind) -> Result<(), HpmError> {
        self.check_exists(plugin).await?;

        if self.is_installed(plugin, list) {
            return Err(HpmError::AlreadyInstalled {
                name: plugin.to_string(),
                list,
            });
        }

        let document = self.document_mut()?;
        document.insert(list, plugin.as_str())?;
        document.persist().await?;

        tracing::info!(%plugin, fragment = ?plugin.fragment(), %list, "installed");
        Ok(())
    }

    /// Remove `plugin` from the tracked list.
    pub async fn uninstall(&mut self, plugin: &PluginId) -> Result<(), HpmError> {
        if !self.is_installed(plugin, ListKind::Tracked) {
            return Err(HpmError::NotInstalled(plugin.to_string()));
        }

        let document = self.document_mut()?;
        document.remove(ListKind::Tracked, plugin.as_str())?;
        document.persist().await?;

        tracing::info!(%plugin, "uninstalled");
        Ok(())
    }

    fn document_mut(&mut self) -> Result<&mut ConfigDocument, HpmError> {
        self.document
            .as_mut()
            .ok_or_else(|| HpmError::ConfigNotFound {
                path: self.config_path.clone(),
            })
    }
}
