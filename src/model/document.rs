use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ropey::Rope;

use crate::error::HpmError;
use crate::model::lexer::tokenize;
use crate::model::plugin_list::{ListIndex, ListKind, PluginList, TextEdit};

/// The user's configuration file as an editable text buffer.
///
/// Edits are byte-range splices into the buffer; everything outside the
/// spliced ranges is written back exactly as it was read.
pub struct ConfigDocument {
    path: PathBuf,
    original: String,
    rope: Rope,
    index: ListIndex,
    dirty: bool,
}

impl ConfigDocument {
    /// Read and index the configuration file at `path`.
    ///
    /// A missing file yields [`HpmError::ConfigNotFound`], which callers treat
    /// as "Hyper is not installed" rather than a failure.
    pub async fn load(path: &Path, legacy_path: &Path) -> Result<Self, HpmError> {
        if tokio::fs::try_exists(legacy_path).await.unwrap_or(false) {
            tracing::warn!(
                "legacy config {} found, hyper reads {}",
                legacy_path.display(),
                path.display()
            );
            eprintln!(
                "Warning: {} should be {}",
                legacy_path.display(),
                path.display()
            );
        }

        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(HpmError::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(HpmError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::parse(path, text)
    }

    /// Index `text` as the contents of `path` without touching the disk.
    pub fn parse(path: &Path, text: String) -> Result<Self, HpmError> {
        let index = build_index(path, &text)?;
        tracing::debug!(
            tracked = ?index.tracked.as_ref().map(PluginList::len),
            local = ?index.local.as_ref().map(PluginList::len),
            "indexed {}",
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            rope: Rope::from_str(&text),
            original: text,
            index,
            dirty: false,
        })
    }

    pub fn list(&self, kind: ListKind) -> Option<&PluginList> {
        self.index.get(kind)
    }

    /// Current text of the document, edits included.
    pub fn serialize(&self) -> String {
        self.rope.to_string()
    }

    /// Append `name` to the `kind` array.
    pub fn insert(&mut self, kind: ListKind, name: &str) -> Result<(), HpmError> {
        let source = self.serialize();
        let edit = self.require_list(kind)?.insert_edit(&source, name);
        self.apply(edit)
    }

    /// Remove the first entry of the `kind` array whose identifier is `name`.
    pub fn remove(&mut self, kind: ListKind, name: &str) -> Result<(), HpmError> {
        let source = self.serialize();
        let list = self.require_list(kind)?;
        let position = list
            .position(name)
            .ok_or_else(|| HpmError::NotInstalled(name.to_string()))?;
        let edit = list.remove_edit(&source, position);
        self.apply(edit)
    }

    /// Write the current text back to the file it was loaded from. A
    /// document without edits is not rewritten.
    ///
    /// On failure the buffer keeps its edits, so calling this again retries
    /// the same write.
    pub async fn persist(&mut self) -> Result<(), HpmError> {
        if !self.dirty {
            return Ok(());
        }

        let text = self.serialize();
        tokio::fs::write(&self.path, &text)
            .await
            .map_err(|source| HpmError::Persist {
                path: self.path.clone(),
                source,
            })?;
        self.dirty = false;
        tracing::info!(
            before = self.original.len(),
            after = text.len(),
            "saved {}",
            self.path.display()
        );
        Ok(())
    }

    fn require_list(&self, kind: ListKind) -> Result<&PluginList, HpmError> {
        self.index
            .get(kind)
            .ok_or_else(|| HpmError::ListUnavailable {
                list: kind,
                path: self.path.clone(),
            })
    }

    fn apply(&mut self, edit: TextEdit) -> Result<(), HpmError> {
        let start = self.rope.byte_to_char(edit.range.start);
        let end = self.rope.byte_to_char(edit.range.end);
        self.rope.remove(start..end);
        self.rope.insert(start, &edit.replacement);
        self.dirty = true;

        self.index = build_index(&self.path, &self.serialize())?;
        Ok(())
    }
}

fn build_index(path: &Path, text: &str) -> Result<ListIndex, HpmError> {
    let tokens = tokenize(text).map_err(|err| HpmError::CorruptConfiguration {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(ListIndex::build(text, &tokens))
}
