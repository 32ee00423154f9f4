use serde::Deserialize;
use std::fmt;

/// A plugin identifier as written in the config: `name`, `@scope/name`,
/// optionally followed by `#ref`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The package name the registry knows, without any `#ref` suffix.
    pub fn registry_name(&self) -> &str {
        self.0.split_once('#').map_or(self.0.as_str(), |(name, _)| name)
    }

    pub fn fragment(&self) -> Option<&str> {
        self.0.split_once('#').map(|(_, fragment)| fragment)
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One search hit: the subset of package metadata hpm displays.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageSummary {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    pub package: PackageSummary,
}

/// Packages whose name or description contains `query`, case-insensitively.
pub fn filter_packages(packages: Vec<PackageSummary>, query: &str) -> Vec<PackageSummary> {
    let query = query.to_lowercase();
    packages
        .into_iter()
        .filter(|package| {
            package.name.to_lowercase().contains(&query)
                || package
                    .description
                    .as_deref()
                    .is_some_and(|description| description.to_lowercase().contains(&query))
        })
        .collect()
}
