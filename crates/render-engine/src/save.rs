//! Destinations for exported images.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use vellum_common::error::{VellumError, VellumResult};

/// Receives the encoded bytes of a finished export.
pub trait FileSaver: Send + Sync {
    /// Persist `bytes` under a name derived from `suggested_file_name`.
    fn save(&self, bytes: &[u8], suggested_file_name: &str) -> VellumResult<()>;
}

/// Writes exports into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where a file with the suggested name ends up.
    pub fn target_path(&self, suggested_file_name: &str) -> VellumResult<PathBuf> {
        let name = Path::new(suggested_file_name)
            .file_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                VellumError::render(format!("invalid export file name `{suggested_file_name}`"))
            })?;
        Ok(self.dir.join(name))
    }
}

impl FileSaver for DirectorySaver {
    fn save(&self, bytes: &[u8], suggested_file_name: &str) -> VellumResult<()> {
        let path = self.target_path(suggested_file_name)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, bytes)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved export");
        Ok(())
    }
}

/// Keeps every save in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySaver {
    saved: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// File names and bytes saved so far, oldest first.
    pub fn saved(&self) -> Vec<(String, Vec<u8>)> {
        match self.saved.lock() {
            Ok(saved) => saved.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.saved().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FileSaver for MemorySaver {
    fn save(&self, bytes: &[u8], suggested_file_name: &str) -> VellumResult<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| VellumError::render("memory saver lock poisoned"))?;
        saved.push((suggested_file_name.to_string(), bytes.to_vec()));
        Ok(())
    }
}
