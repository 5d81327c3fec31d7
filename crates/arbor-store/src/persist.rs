//! Crash-safe whole-document persistence.
//!
//! Every save writes the complete document to `<base>.temp.xml`, moves any
//! existing `<base>` to `<base>.bk.xml`, then renames the temp file into
//! place. Readers therefore see either the old version or the new one, and
//! the immediately prior version survives as the backup sibling. There is
//! no incremental diffing — the documents are small and the rename gives
//! all-or-nothing visibility.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::xml::DocumentError;

/// UTF-8 byte-order mark; written on save, tolerated on load.
const BOM: &str = "\u{feff}";

/// Errors from document I/O or (de)serialization.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One persisted document file with its temp/backup siblings.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    path: PathBuf,
}

impl DocumentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Path of the temp file a save writes first.
    pub fn temp_path(&self) -> PathBuf {
        self.sibling(".temp.xml")
    }

    /// Path of the backup left behind by the previous save.
    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".bk.xml")
    }

    /// Read the document text, stripping a possible byte-order marker.
    pub fn load_text(&self) -> Result<String, StoreError> {
        let text = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(text
            .strip_prefix(BOM)
            .map(str::to_string)
            .unwrap_or(text))
    }

    /// Atomically replace the document with `text`.
    ///
    /// Sequence: write temp file, drop stale backup, rename current file to
    /// the backup name, rename temp into place. The caller observes either
    /// the previous version or the complete new one, never a partial write.
    pub fn save_text(&self, text: &str) -> Result<(), StoreError> {
        let temp = self.temp_path();
        let backup = self.backup_path();

        let mut f = fs::File::create(&temp).map_err(|e| StoreError::io(&temp, e))?;
        f.write_all(BOM.as_bytes())
            .and_then(|_| f.write_all(text.as_bytes()))
            .and_then(|_| f.sync_all())
            .map_err(|e| StoreError::io(&temp, e))?;
        debug!(path = %temp.display(), "document dumped to temp file");

        if self.path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).map_err(|e| StoreError::io(&backup, e))?;
            }
            fs::rename(&self.path, &backup).map_err(|e| StoreError::io(&self.path, e))?;
        }
        fs::rename(&temp, &self.path).map_err(|e| StoreError::io(&temp, e))?;

        info!(path = %self.path.display(), backup = %backup.display(), "document persisted");
        Ok(())
    }
}
