use tracing::{error, info};
use uuid::Uuid;

use super::repo::FoodRecordStore;
use super::repo_types::{FoodEntry, FoodFilter};
use crate::storage::StorageClient;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Clamps client-supplied paging into a sane window.
pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

pub async fn list_foods(
    records: &dyn FoodRecordStore,
    owner_id: Uuid,
    mut filter: FoodFilter,
) -> anyhow::Result<Vec<FoodEntry>> {
    filter.search = filter
        .search
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    records.list(owner_id, &filter).await
}

/// Deletes the row, then its image. The row goes first so a failed image
/// delete leaves an orphaned object rather than a row pointing at nothing.
pub async fn delete_food(
    storage: &dyn StorageClient,
    records: &dyn FoodRecordStore,
    owner_id: Uuid,
    food_id: Uuid,
) -> anyhow::Result<Option<FoodEntry>> {
    let Some(entry) = records.delete(owner_id, food_id).await? else {
        return Ok(None);
    };

    if let Some(key) = entry.image_path.as_deref() {
        if let Err(e) = storage.delete_object(key).await {
            error!(error = %e, orphaned_key = %key, %food_id, "image delete failed, object orphaned");
        }
    }
    info!(%food_id, %owner_id, "food deleted");
    Ok(Some(entry))
}
