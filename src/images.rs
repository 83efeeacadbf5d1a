//! Image objects in the blob store: key naming, upload, and removal.

use std::{future::Future, sync::Arc};

use bytes::Bytes;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::storage::StorageClient;

/// Image file as received from a form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub body: Bytes,
    pub extension: String,
    pub content_type: String,
}

impl ImageUpload {
    /// Builds an upload from what a multipart field carries.
    pub fn from_field(body: Bytes, file_name: Option<&str>, content_type: Option<&str>) -> Self {
        let content_type = content_type.unwrap_or("application/octet-stream").to_string();
        let extension = file_name
            .and_then(ext_from_file_name)
            .or_else(|| ext_from_mime(&content_type).map(str::to_string))
            .unwrap_or_else(|| "bin".to_string());
        Self {
            body,
            extension,
            content_type,
        }
    }
}

/// Storage key of an uploaded image together with its public URL.
/// Path and URL only ever travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Error)]
#[error("image upload to {key} failed")]
pub struct UploadFailed {
    pub key: String,
    pub source: anyhow::Error,
}

/// Cleanup of an uploaded image failed; the object at `key` has no row.
#[derive(Debug, Error)]
#[error("orphaned image at key {key}")]
pub struct CompensationFailed {
    pub key: String,
    pub source: anyhow::Error,
}

/// Uploads and removes images on behalf of the record writers.
#[derive(Clone)]
pub struct ImageStore {
    storage: Arc<dyn StorageClient>,
}

impl ImageStore {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self { storage }
    }

    /// Uploads `image` under a fresh key in the owner's namespace.
    /// A missing or zero-byte image uploads nothing.
    pub async fn upload(
        &self,
        owner_id: Uuid,
        image: Option<ImageUpload>,
    ) -> Result<Option<ImageRef>, UploadFailed> {
        let Some(img) = image.filter(|i| !i.body.is_empty()) else {
            return Ok(None);
        };
        let key = object_key(owner_id, &img.extension);
        if let Err(source) = self
            .storage
            .put_object(&key, img.body, &img.content_type)
            .await
        {
            error!(error = %source, %key, "image upload failed");
            return Err(UploadFailed { key, source });
        }
        debug!(%key, "image uploaded");
        let url = self.storage.public_url(&key);
        Ok(Some(ImageRef { path: key, url }))
    }

    /// Deletes an image whose record write did not happen.
    pub async fn discard(&self, key: String) -> Option<CompensationFailed> {
        match self.storage.delete_object(&key).await {
            Ok(()) => {
                warn!(%key, "removed image of unsaved record");
                None
            }
            Err(source) => {
                error!(error = %source, orphaned_key = %key, "image cleanup failed, object orphaned");
                Some(CompensationFailed { key, source })
            }
        }
    }

    /// Deletes an image no record points at any more. Failure is only logged.
    pub async fn retire(&self, key: &str) {
        match self.storage.delete_object(key).await {
            Ok(()) => info!(%key, "removed replaced image"),
            Err(e) => error!(error = %e, orphaned_key = %key, "image delete failed, object orphaned"),
        }
    }
}

/// Runs `work` on its own task and waits for it. Dropping the returned
/// future detaches from the task instead of cancelling it, so a write that
/// has already uploaded an image still reaches its cleanup.
pub async fn detached<T, E, F>(work: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    joined(tokio::spawn(work).await)
}

/// Panics inside the task resume in the caller; a cancelled task
/// (runtime shutdown) becomes an error.
fn joined<T, E: From<JoinError>>(outcome: Result<Result<T, E>, JoinError>) -> Result<T, E> {
    match outcome {
        Ok(result) => result,
        Err(e) => match e.try_into_panic() {
            Ok(payload) => std::panic::resume_unwind(payload),
            Err(e) => {
                warn!(error = %e, "write task cancelled");
                Err(E::from(e))
            }
        },
    }
}

fn object_key(owner_id: Uuid, extension: &str) -> String {
    format!("{}/{}.{}", owner_id, Uuid::new_v4(), extension)
}

fn ext_from_file_name(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
