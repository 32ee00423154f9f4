use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::process::Command;

use crate::error::HpmError;
use crate::model::plugin_list::ListKind;
use crate::plugin::manager::PluginManager;
use crate::plugin::manifest::PluginId;
use crate::plugin::registry::Registry;

const PLACEHOLDER_MANIFEST: &str = r#"{"name": "hpm-placeholder"}"#;

#[cfg(windows)]
const NPM: &str = "npm.cmd";
#[cfg(not(windows))]
const NPM: &str = "npm";

/// Copies plugins from the registry into the local plugins directory so they
/// can be edited in place.
#[derive(Debug, Clone)]
pub struct PluginInstaller {
    local_dir: PathBuf,
    npm: Vec<OsString>,
}

impl PluginInstaller {
    pub fn new(local_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_dir: local_dir.into(),
            npm: vec![NPM.into()],
        }
    }

    /// Replace the npm command line. `i <plugin>` is appended to it.
    pub fn with_npm<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.npm = command.into_iter().map(Into::into).collect();
        self
    }

    /// Fork `plugin` into the local plugins directory and move it from
    /// `plugins` to `localPlugins`. Returns the directory of the copy.
    pub async fn fork<R: Registry>(
        &self,
        manager: &mut PluginManager<R>,
        plugin: &PluginId,
    ) -> Result<PathBuf, HpmError> {
        manager.check_exists(plugin).await?;

        if manager.is_installed(plugin, ListKind::Local) {
            return Err(HpmError::AlreadyInstalled {
                name: plugin.to_string(),
                list: ListKind::Local,
            });
        }
        if !manager.exists() {
            return Err(HpmError::ConfigNotFound {
                path: manager.config_path().to_path_buf(),
            });
        }

        self.ensure_placeholder().await?;
        self.npm_install(plugin).await?;
        let destination = self.move_into_place(plugin).await?;

        if manager.is_installed(plugin, ListKind::Tracked) {
            manager.uninstall(plugin).await?;
        }
        manager.install(plugin, ListKind::Local).await?;

        Ok(destination)
    }

    /// Create the local plugins directory and a placeholder `package.json`
    /// so npm installs into it rather than a parent project.
    pub async fn ensure_placeholder(&self) -> Result<PathBuf, HpmError> {
        tokio::fs::create_dir_all(&self.local_dir)
            .await
            .map_err(|source| HpmError::Io {
                path: self.local_dir.clone(),
                source,
            })?;

        let manifest = self.local_dir.join("package.json");
        if !tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
            tokio::fs::write(&manifest, PLACEHOLDER_MANIFEST)
                .await
                .map_err(|source| HpmError::Io {
                    path: manifest.clone(),
                    source,
                })?;
            tracing::debug!("created {}", manifest.display());
        }
        Ok(manifest)
    }

    async fn npm_install(&self, plugin: &PluginId) -> Result<(), HpmError> {
        let fork_error = |reason: String| HpmError::Fork {
            name: plugin.to_string(),
            reason,
        };
        let Some((program, args)) = self.npm.split_first() else {
            return Err(fork_error("no npm command configured".to_string()));
        };

        tracing::info!(%plugin, dir = %self.local_dir.display(), "running npm install");
        let output = Command::new(program)
            .args(args)
            .arg("i")
            .arg(plugin.as_str())
            .current_dir(&self.local_dir)
            .output()
            .await
            .map_err(|err| fork_error(format!("could not run npm: {err}")))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.trim().to_string())
            .unwrap_or_else(|| format!("npm exited with {}", output.status));
        Err(fork_error(reason))
    }

    async fn move_into_place(&self, plugin: &PluginId) -> Result<PathBuf, HpmError> {
        let name = plugin.registry_name();
        let installed = self.local_dir.join("node_modules").join(name);
        let destination = self.local_dir.join(name);

        if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            return Err(HpmError::Fork {
                name: plugin.to_string(),
                reason: format!("{} already exists", destination.display()),
            });
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| HpmError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        match tokio::fs::rename(&installed, &destination).await {
            Ok(()) => Ok(destination),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(HpmError::Fork {
                name: plugin.to_string(),
                reason: format!("npm did not create {}", installed.display()),
            }),
            Err(source) => Err(HpmError::Io {
                path: installed,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manager::tests::StubRegistry;

    /// Stands in for npm: creates `node_modules/<plugin>` like a real install.
    const FAKE_NPM: &str = r#"mkdir -p "node_modules/$2" && echo '{}' > "node_modules/$2/package.json""#;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new(config: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join(".hyper.js"), config).unwrap();
            Self { dir }
        }

        fn config(&self) -> String {
            std::fs::read_to_string(self.dir.path().join(".hyper.js")).unwrap()
        }

        fn local_dir(&self) -> PathBuf {
            self.dir.path().join(".hyper_plugins").join("local")
        }

        fn installer(&self, script: &str) -> PluginInstaller {
            PluginInstaller::new(self.local_dir()).with_npm(["sh", "-c", script, "npm"])
        }

        async fn manager(&self, known: &[&str]) -> PluginManager<StubRegistry> {
            PluginManager::open(
                &self.dir.path().join(".hyper.js"),
                &self.dir.path().join(".hyperterm.js"),
                StubRegistry::knowing(known),
            )
            .await
            .unwrap()
        }
    }

    #[tokio::test]
    async fn placeholder_is_created_once() {
        let fixture = Fixture::new("module.exports = {}");
        let installer = PluginInstaller::new(fixture.local_dir());

        let manifest = installer.ensure_placeholder().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&manifest).unwrap(),
            r#"{"name": "hpm-placeholder"}"#
        );

        std::fs::write(&manifest, r#"{"name": "mine"}"#).unwrap();
        installer.ensure_placeholder().await.unwrap();
        assert_eq!(std::fs::read_to_string(&manifest).unwrap(), r#"{"name": "mine"}"#);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fork_moves_plugin_from_tracked_to_local() {
        let fixture = Fixture::new("module.exports = {plugins: ['foo'], localPlugins: []}");
        let mut manager = fixture.manager(&["foo"]).await;

        let copy = fixture
            .installer(FAKE_NPM)
            .fork(&mut manager, &PluginId::new("foo"))
            .await
            .unwrap();

        assert_eq!(copy, fixture.local_dir().join("foo"));
        assert!(copy.join("package.json").exists());
        assert!(!fixture.local_dir().join("node_modules/foo").exists());
        assert_eq!(
            fixture.config(),
            "module.exports = {plugins: [], localPlugins: [\"foo\"]}"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fork_of_untracked_plugin_only_adds_local_entry() {
        let fixture = Fixture::new("module.exports = {plugins: ['bar'], localPlugins: []}");
        let mut manager = fixture.manager(&["foo"]).await;

        fixture
            .installer(FAKE_NPM)
            .fork(&mut manager, &PluginId::new("foo"))
            .await
            .unwrap();

        assert_eq!(
            fixture.config(),
            "module.exports = {plugins: ['bar'], localPlugins: [\"foo\"]}"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_npm_leaves_config_untouched() {
        let original = "module.exports = {plugins: ['foo'], localPlugins: []}";
        let fixture = Fixture::new(original);
        let mut manager = fixture.manager(&["foo"]).await;

        let err = fixture
            .installer("echo 'npm ERR! 404' >&2; exit 1")
            .fork(&mut manager, &PluginId::new("foo"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to fork foo: npm ERR! 404");
        assert_eq!(fixture.config(), original);
    }

    #[tokio::test]
    async fn fork_rejects_local_duplicates_and_unknown_packages() {
        let fixture = Fixture::new("module.exports = {plugins: [], localPlugins: ['foo']}");
        let mut manager = fixture.manager(&["foo"]).await;
        let installer = fixture.installer("exit 1");

        let err = installer
            .fork(&mut manager, &PluginId::new("foo"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "foo is already installed locally");

        let err = installer
            .fork(&mut manager, &PluginId::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, HpmError::NotFoundOnRegistry(_)));
        assert!(!fixture.local_dir().exists());
    }
}
