//! S3-compatible result uploader.

use std::path::{Path, PathBuf};

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;

use conveyor_core::{AppError, AppResult};

use crate::uri::StorageUri;

/// Uploads handler outputs to the assignment's storage location.
#[derive(Debug, Clone)]
pub struct ResultUploader {
    client: aws_sdk_s3::Client,
}

impl ResultUploader {
    /// Build an uploader for the given region, optionally pointed at a
    /// non-AWS S3-compatible endpoint (which requires path-style keys).
    pub async fn new(region: impl Into<String>, endpoint: Option<String>) -> Self {
        let region = region.into();
        tracing::info!(
            "Initializing result uploader (region={}, endpoint={})",
            region,
            endpoint.as_deref().unwrap_or("aws")
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }

    /// Upload one local file to `dest_uri`, returning the URI on success.
    pub async fn upload(&self, local_path: &Path, dest_uri: &str) -> AppResult<String> {
        let uri = StorageUri::parse(dest_uri)?;

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            AppError::storage(format!(
                "Failed to read '{}' for upload: {e}",
                local_path.display()
            ))
        })?;

        self.client
            .put_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::storage(format!("Upload to '{uri}' failed: {e}")))?;

        tracing::debug!("Uploaded '{}' to '{}'", local_path.display(), uri);
        Ok(dest_uri.to_string())
    }

    /// Recursively upload a directory, mirroring its layout under
    /// `base_uri`. Returns the destination URI of every uploaded file.
    pub async fn upload_directory(&self, local_dir: &Path, base_uri: &str) -> AppResult<Vec<String>> {
        let base = StorageUri::parse(base_uri)?;
        let files = collect_files(local_dir).await?;

        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            let relative = file.strip_prefix(local_dir).map_err(|_| {
                AppError::storage(format!(
                    "'{}' is not inside '{}'",
                    file.display(),
                    local_dir.display()
                ))
            })?;

            let key_suffix = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let dest = base.join(&key_suffix).to_string();
            uploaded.push(self.upload(&file, &dest).await?);
        }

        tracing::info!(
            "Uploaded {} files from '{}' to '{}'",
            uploaded.len(),
            local_dir.display(),
            base_uri
        );
        Ok(uploaded)
    }
}

/// Walk a directory tree and return all regular files.
async fn collect_files(root: &Path) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
            AppError::storage(format!("Failed to read directory '{}': {e}", dir.display()))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AppError::storage(format!("Failed to read directory '{}': {e}", dir.display()))
        })? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    // Stable ordering keeps upload logs and tests deterministic.
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_files_walks_nested_dirs() {
        let root = std::env::temp_dir().join(format!("conveyor-walk-{}", std::process::id()));
        tokio::fs::create_dir_all(root.join("frames/sub"))
            .await
            .expect("mkdir");
        tokio::fs::write(root.join("render.log"), b"log")
            .await
            .expect("write");
        tokio::fs::write(root.join("frames/sub/0001.png"), b"png")
            .await
            .expect("write");

        let files = collect_files(&root).await.expect("walk");
        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(&root).expect("prefix").to_path_buf())
            .collect();

        assert_eq!(names.len(), 2);
        assert!(names.contains(&PathBuf::from("render.log")));
        assert!(names.contains(&PathBuf::from("frames/sub/0001.png")));

        tokio::fs::remove_dir_all(&root).await.expect("cleanup");
    }

    #[tokio::test]
    async fn test_collect_files_missing_dir_is_an_error() {
        let missing = std::env::temp_dir().join("conveyor-does-not-exist");
        assert!(collect_files(&missing).await.is_err());
    }
}
