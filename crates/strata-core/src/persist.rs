//! Snapshot persistence for the learning stores.
//!
//! Stores serialize themselves to versioned JSON; this module only moves
//! those strings to and from disk. Writes are atomic: the payload lands in
//! a `.tmp` sibling first, then renames over the target, so readers never
//! observe a torn file. One writer at a time per store.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::{Error, ErrorKind, Result};

/// File names of the persisted stores.
pub const KNOWLEDGE_BASE_FILE: &str = "knowledge-base.json";
/// Pagination pattern store file name.
pub const PAGINATION_FILE: &str = "pagination-patterns.json";
/// Handler registry store file name.
pub const HANDLERS_FILE: &str = "handlers.json";

/// Reads and writes one store file under a data directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    write_lock: std::sync::Arc<tokio::sync::Mutex<()>>,
}

impl JsonStore {
    /// Creates a store handle for `file_name` under `data_dir`.
    pub fn new(data_dir: &Path, file_name: &str) -> Self {
        Self {
            path: data_dir.join(file_name),
            write_lock: std::sync::Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Returns the target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the store contents, `None` when the file does not exist yet.
    pub async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(Error::with_source(
                ErrorKind::Persistence,
                format!("failed to read {}", self.path.display()),
                Box::new(error),
            )),
        }
    }

    /// Atomically replaces the store contents, retrying once.
    ///
    /// A snapshot failure is not fatal to the engine; callers log it and
    /// continue in memory.
    pub async fn save(&self, contents: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        match self.write_once(contents).await {
            Ok(()) => Ok(()),
            Err(first) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    target: crate::TRACING_TARGET_LEARN,
                    path = %self.path.display(),
                    error = %first,
                    "snapshot write failed, retrying once",
                );
                self.write_once(contents).await.map_err(|_retry| first)
            }
        }
    }

    async fn write_once(&self, contents: &str) -> Result<()> {
        let io_error = |error: std::io::Error| {
            Error::with_source(
                ErrorKind::Persistence,
                format!("failed to write {}", self.path.display()),
                Box::new(error),
            )
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_error)?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await.map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), KNOWLEDGE_BASE_FILE);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), HANDLERS_FILE);

        store.save("{\"version\": 1}").await.unwrap();
        assert_eq!(
            store.load().await.unwrap().as_deref(),
            Some("{\"version\": 1}")
        );

        store.save("{\"version\": 2}").await.unwrap();
        assert_eq!(
            store.load().await.unwrap().as_deref(),
            Some("{\"version\": 2}")
        );
    }

    #[tokio::test]
    async fn no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), PAGINATION_FILE);
        store.save("{}").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![PAGINATION_FILE.to_string()]);
    }
}
