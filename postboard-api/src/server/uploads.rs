//! Image files attached to posts.

use async_trait::async_trait;
use axum::body::Bytes;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, warn};

/// Content types accepted for post images.
pub const ACCEPTED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpg", "image/jpeg"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Refusing to touch image path outside the upload directory: {0}")]
    InvalidPath(String),
    #[error("Could not write image: {0}")]
    Io(#[from] std::io::Error),
}

/// A file part of a multipart submission, fully buffered.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl ImageUpload {
    /// Empty files and anything but png and jpeg are treated as no image at all.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        !self.bytes.is_empty()
            && self
                .content_type
                .as_deref()
                .is_some_and(|content_type| ACCEPTED_IMAGE_TYPES.contains(&content_type))
    }
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists an upload and returns the path to record as the post's image url.
    async fn store(&self, upload: ImageUpload) -> Result<String, UploadError>;

    /// Removes a previously stored image in the background.
    /// Failures are logged and otherwise ignored.
    fn clear(&self, image_url: &str);
}

/// Stores images as `<base_dir>/<images_dir>/<unix nanos>-<file name>`.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct DiskImageStore {
    base_dir: PathBuf,
    images_dir: String,
}

impl DiskImageStore {
    #[must_use]
    pub fn new(base_dir: PathBuf, images_dir: String) -> Self {
        let images_dir = images_dir.trim_matches('/').to_owned();
        Self {
            base_dir,
            images_dir,
        }
    }

    /// URL prefix under which stored images are served.
    #[must_use]
    pub fn images_dir(&self) -> &str {
        &self.images_dir
    }

    #[must_use]
    pub fn images_path(&self) -> PathBuf {
        self.base_dir.join(&self.images_dir)
    }

    pub async fn create_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.images_path()).await
    }

    fn resolve(&self, image_url: &str) -> Result<PathBuf, UploadError> {
        let relative = Path::new(image_url);
        if relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(UploadError::InvalidPath(image_url.to_owned()));
        }

        Ok(self.base_dir.join(relative))
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn store(&self, upload: ImageUpload) -> Result<String, UploadError> {
        let file_name = format!(
            "{}-{}",
            OffsetDateTime::now_utc().unix_timestamp_nanos(),
            sanitize_file_name(&upload.file_name)
        );
        let image_url = format!("{}/{file_name}", self.images_dir);

        let path = self.resolve(&image_url)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &upload.bytes).await?;

        debug!(%image_url, bytes = upload.bytes.len(), "Stored image");
        Ok(image_url)
    }

    fn clear(&self, image_url: &str) {
        match self.resolve(image_url) {
            Ok(path) => {
                tokio::spawn(remove_image(path));
            }
            Err(err) => warn!(error = %err, "Not clearing image"),
        }
    }
}

async fn remove_image(path: PathBuf) {
    match fs::remove_file(&path).await {
        Ok(()) => debug!(path = %path.display(), "Removed image"),
        Err(err) => warn!(path = %path.display(), error = %err, "Could not remove image"),
    }
}

/// Keeps the final path component, replacing anything unusual with `_`.
fn sanitize_file_name(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.is_empty() {
        "image".to_owned()
    } else {
        sanitized.to_owned()
    }
}
