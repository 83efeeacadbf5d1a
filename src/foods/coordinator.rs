use std::sync::Arc;

use thiserror::Error;
use time::Date;
use tokio::task::JoinError;
use tracing::{error, info};
use uuid::Uuid;

use super::repo::FoodRecordStore;
use super::repo_types::{FoodChanges, FoodEntry, NewFood};
use crate::images::{detached, CompensationFailed, ImageStore, ImageUpload, UploadFailed};
use crate::storage::StorageClient;

/// User-supplied fields of a food entry.
#[derive(Debug, Clone)]
pub struct FoodDraft {
    pub name: String,
    pub meal: String,
    pub date: Date,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("no authenticated owner")]
    Unauthenticated,

    #[error("image upload to {key} failed")]
    AssetUploadFailed { key: String, source: anyhow::Error },

    #[error("food insert failed")]
    RecordInsertFailed {
        source: anyhow::Error,
        orphaned: Option<CompensationFailed>,
    },

    #[error("food not found")]
    NotFound,

    #[error("food update failed")]
    RecordUpdateFailed {
        source: anyhow::Error,
        orphaned: Option<CompensationFailed>,
    },

    #[error("write task cancelled")]
    Interrupted(#[from] JoinError),
}

impl From<UploadFailed> for WriteError {
    fn from(e: UploadFailed) -> Self {
        WriteError::AssetUploadFailed {
            key: e.key,
            source: e.source,
        }
    }
}

impl WriteError {
    /// Key of an image left behind by a failed write, if cleanup failed too.
    pub fn orphaned_key(&self) -> Option<&str> {
        match self {
            WriteError::RecordInsertFailed {
                orphaned: Some(c), ..
            }
            | WriteError::RecordUpdateFailed {
                orphaned: Some(c), ..
            } => Some(c.key.as_str()),
            _ => None,
        }
    }
}

/// Writes a food row and its optional image so that an image never
/// outlives a failed insert.
#[derive(Clone)]
pub struct WriteCoordinator {
    images: ImageStore,
    records: Arc<dyn FoodRecordStore>,
}

impl WriteCoordinator {
    pub fn new(storage: Arc<dyn StorageClient>, records: Arc<dyn FoodRecordStore>) -> Self {
        Self {
            images: ImageStore::new(storage),
            records,
        }
    }

    /// Uploads `image` (if any), inserts the row, and removes the image
    /// again when the insert fails.
    ///
    /// The work runs on its own task: once the image is uploaded, dropping
    /// the returned future does not stop the insert or the cleanup.
    pub async fn submit(
        &self,
        owner_id: Uuid,
        draft: FoodDraft,
        image: Option<ImageUpload>,
    ) -> Result<FoodEntry, WriteError> {
        let this = self.clone();
        detached(async move { this.create(owner_id, draft, image).await }).await
    }

    /// Edits an existing row. A new image is uploaded first and linked by
    /// the update; the image it replaces is deleted afterwards. When the
    /// update fails or finds no row, the new image is removed instead.
    pub async fn revise(
        &self,
        owner_id: Uuid,
        food_id: Uuid,
        changes: FoodChanges,
        image: Option<ImageUpload>,
    ) -> Result<FoodEntry, WriteError> {
        let this = self.clone();
        detached(async move { this.replace(owner_id, food_id, changes, image).await }).await
    }

    async fn create(
        &self,
        owner_id: Uuid,
        draft: FoodDraft,
        image: Option<ImageUpload>,
    ) -> Result<FoodEntry, WriteError> {
        let image = self.images.upload(owner_id, image).await?;
        let uploaded_key = image.as_ref().map(|i| i.path.clone());

        let row = NewFood {
            owner_id,
            name: draft.name,
            meal: draft.meal,
            date: draft.date,
            image,
        };

        match self.records.insert(row).await {
            Ok(entry) => {
                info!(food_id = %entry.id, %owner_id, image = ?entry.image_path, "food saved");
                Ok(entry)
            }
            Err(source) => {
                error!(error = %source, %owner_id, "food insert failed");
                let orphaned = match uploaded_key {
                    Some(key) => self.images.discard(key).await,
                    None => None,
                };
                Err(WriteError::RecordInsertFailed { source, orphaned })
            }
        }
    }

    async fn replace(
        &self,
        owner_id: Uuid,
        food_id: Uuid,
        mut changes: FoodChanges,
        image: Option<ImageUpload>,
    ) -> Result<FoodEntry, WriteError> {
        changes.image = self.images.upload(owner_id, image).await?;
        let uploaded_key = changes.image.as_ref().map(|i| i.path.clone());

        match self.records.update(owner_id, food_id, changes).await {
            Ok(Some(updated)) => {
                if let (Some(_), Some(old_key)) = (&uploaded_key, &updated.previous_image) {
                    self.images.retire(old_key).await;
                }
                info!(%food_id, %owner_id, image = ?updated.entry.image_path, "food updated");
                Ok(updated.entry)
            }
            Ok(None) => {
                if let Some(key) = uploaded_key {
                    self.images.discard(key).await;
                }
                Err(WriteError::NotFound)
            }
            Err(source) => {
                error!(error = %source, %food_id, %owner_id, "food update failed");
                let orphaned = match uploaded_key {
                    Some(key) => self.images.discard(key).await,
                    None => None,
                };
                Err(WriteError::RecordUpdateFailed { source, orphaned })
            }
        }
    }
}
