use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Directory under the media root that holds employee images.
const IMAGE_DIR: &str = "employee_images";

/// File-system store for employee image assets.
///
/// Records keep only the relative path returned by [`ImageStore::save`]; the
/// bytes live under the configured media root.
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes image bytes under a collision-resistant path keyed by the owning
    /// employee id plus a random suffix, returning the relative path to store
    /// in the record.
    pub async fn save(
        &self,
        owner_id: i64,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<String, AssetError> {
        let extension = extension_of(original_filename);
        let relative = format!("{IMAGE_DIR}/{owner_id}-{}.{extension}", Uuid::new_v4());
        let target = self.root.join(&relative);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        Ok(relative)
    }

    /// Removes a previously stored asset. A missing file is reported as
    /// [`AssetError::NotFound`] so boundaries can choose to tolerate it.
    pub async fn delete(&self, relative_path: &str) -> Result<(), AssetError> {
        let target = self.root.join(relative_path);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(AssetError::NotFound),
            Err(err) => Err(AssetError::Io(err)),
        }
    }

    /// Reads a stored asset back, used by the legacy import to copy bytes.
    pub async fn read(&self, relative_path: &str) -> Result<Vec<u8>, AssetError> {
        let target = self.root.join(relative_path);
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(AssetError::NotFound),
            Err(err) => Err(AssetError::Io(err)),
        }
    }

    /// Returns the absolute path for a stored relative path.
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

/// Errors that can occur while reading or writing image assets.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset file not found")]
    NotFound,
    #[error("asset i/o error: {0}")]
    Io(#[from] io::Error),
}
