use std::path::{Component, Path, PathBuf};

use rocket::fs::TempFile;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    ProfilePhotos,
    Worksheets,
    Submissions,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::ProfilePhotos => "profile_photos",
            Bucket::Worksheets => "worksheets",
            Bucket::Submissions => "submissions",
        }
    }

    fn default_extension(&self) -> &'static str {
        match self {
            Bucket::ProfilePhotos => "jpg",
            Bucket::Worksheets | Bucket::Submissions => "pdf",
        }
    }
}

/// Where uploaded files live. Paths handed out are relative to the store and
/// are what gets persisted on the owning row.
#[rocket::async_trait]
pub trait FileStore: Send + Sync {
    async fn store(&self, bucket: Bucket, file: &mut TempFile<'_>) -> Result<String, AppError>;

    async fn delete(&self, path: &str) -> Result<(), AppError>;

    fn resolve(&self, path: &str) -> Option<PathBuf>;
}

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn is_safe_relative(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

#[rocket::async_trait]
impl FileStore for LocalFileStore {
    #[instrument(skip(self, file), fields(bucket = bucket.as_str()))]
    async fn store(&self, bucket: Bucket, file: &mut TempFile<'_>) -> Result<String, AppError> {
        let extension = file
            .content_type()
            .and_then(|content_type| content_type.extension())
            .map(|ext| ext.as_str().to_string())
            .unwrap_or_else(|| bucket.default_extension().to_string());

        let relative = format!("{}/{}.{}", bucket.as_str(), Uuid::new_v4(), extension);
        let target = self.root.join(&relative);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        file.copy_to(&target).await?;
        info!(path = %relative, "Stored uploaded file");

        Ok(relative)
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &str) -> Result<(), AppError> {
        let Some(target) = self.resolve(path) else {
            warn!("Refusing to delete path outside the store");
            return Ok(());
        };

        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                info!("Deleted stored file");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        if is_safe_relative(path) {
            Some(self.root.join(path))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_escaping_paths() {
        let store = LocalFileStore::new("/srv/storage");

        assert_eq!(
            store.resolve("worksheets/a.pdf"),
            Some(PathBuf::from("/srv/storage/worksheets/a.pdf"))
        );
        assert!(store.resolve("../etc/passwd").is_none());
        assert!(store.resolve("/etc/passwd").is_none());
        assert!(store.resolve("worksheets/../../x").is_none());
        assert!(store.resolve("").is_none());
    }
}
