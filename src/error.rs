use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::plugin_list::ListKind;

/// Every way a plugin operation can fail.
#[derive(Debug, Error)]
pub enum HpmError {
    #[error("{} does not exist", .path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} could not be parsed: {reason}", .path.display())]
    CorruptConfiguration { path: PathBuf, reason: String },

    #[error("`{list}` is missing from {} or is not an array", .path.display())]
    ListUnavailable { list: ListKind, path: PathBuf },

    #[error("{0} not found on npm")]
    NotFoundOnRegistry(String),

    #[error("{name} is already installed{}", .list.qualifier())]
    AlreadyInstalled { name: String, list: ListKind },

    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("failed to save {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("registry request for {name} failed: {source}")]
    Registry {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("plugin search failed: {0}")]
    Search(#[source] reqwest::Error),

    #[error("registry answered {status} for {name}")]
    RegistryStatus {
        name: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to fork {name}: {reason}")]
    Fork { name: String, reason: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl HpmError {
    /// Expected rejections, as opposed to environment failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            HpmError::NotFoundOnRegistry(_)
                | HpmError::AlreadyInstalled { .. }
                | HpmError::NotInstalled(_)
        )
    }
}
