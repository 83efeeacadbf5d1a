use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{FoodChanges, FoodEntry, FoodFilter, NewFood, UpdatedFood};

const FOOD_COLUMNS: &str = "id, user_id, name, meal, date, image_path, image_url, created_at";

/// Structured storage for food rows. Every read and write is scoped to an owner.
#[async_trait]
pub trait FoodRecordStore: Send + Sync {
    async fn insert(&self, row: NewFood) -> anyhow::Result<FoodEntry>;
    async fn list(&self, owner_id: Uuid, filter: &FoodFilter) -> anyhow::Result<Vec<FoodEntry>>;
    async fn get(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<FoodEntry>>;
    /// Applies `changes` and reports the image key the row held before.
    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: FoodChanges,
    ) -> anyhow::Result<Option<UpdatedFood>>;
    /// Removes the row and hands it back so the caller can clean up its image.
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<FoodEntry>>;
}

#[derive(Clone)]
pub struct PgFoodStore {
    db: PgPool,
}

impl PgFoodStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FoodRecordStore for PgFoodStore {
    async fn insert(&self, row: NewFood) -> anyhow::Result<FoodEntry> {
        let (image_path, image_url) = match row.image {
            Some(img) => (Some(img.path), Some(img.url)),
            None => (None, None),
        };
        let entry = sqlx::query_as::<_, FoodEntry>(&format!(
            r#"
            INSERT INTO foods (user_id, name, meal, date, image_path, image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {FOOD_COLUMNS}
            "#
        ))
        .bind(row.owner_id)
        .bind(row.name)
        .bind(row.meal)
        .bind(row.date)
        .bind(image_path)
        .bind(image_url)
        .fetch_one(&self.db)
        .await
        .context("insert food")?;
        Ok(entry)
    }

    async fn list(&self, owner_id: Uuid, filter: &FoodFilter) -> anyhow::Result<Vec<FoodEntry>> {
        let rows = sqlx::query_as::<_, FoodEntry>(&format!(
            r#"
            SELECT {FOOD_COLUMNS}
              FROM foods
             WHERE user_id = $1
               AND ($2::text IS NULL OR name ILIKE $2)
               AND ($3::date IS NULL OR date = $3)
               AND ($4::text IS NULL OR meal = $4)
             ORDER BY date DESC, created_at DESC
             LIMIT $5 OFFSET $6
            "#
        ))
        .bind(owner_id)
        .bind(filter.search.as_deref().map(like_pattern))
        .bind(filter.date)
        .bind(filter.meal.map(|m| m.as_str()))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.db)
        .await
        .context("list foods")?;
        Ok(rows)
    }

    async fn get(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<FoodEntry>> {
        let row = sqlx::query_as::<_, FoodEntry>(&format!(
            "SELECT {FOOD_COLUMNS} FROM foods WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await
        .context("get food")?;
        Ok(row)
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: FoodChanges,
    ) -> anyhow::Result<Option<UpdatedFood>> {
        let (image_path, image_url) = match changes.image {
            Some(img) => (Some(img.path), Some(img.url)),
            None => (None, None),
        };
        let row = sqlx::query_as::<_, UpdatedFood>(
            r#"
            WITH prev AS (
                SELECT id, image_path FROM foods WHERE id = $1 AND user_id = $2 FOR UPDATE
            )
            UPDATE foods AS f
               SET name = COALESCE($3, f.name),
                   meal = COALESCE($4, f.meal),
                   date = COALESCE($5, f.date),
                   image_path = COALESCE($6, f.image_path),
                   image_url = COALESCE($7, f.image_url)
              FROM prev
             WHERE f.id = prev.id
            RETURNING f.id, f.user_id, f.name, f.meal, f.date, f.image_path, f.image_url,
                      f.created_at, prev.image_path AS previous_image
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(changes.name)
        .bind(changes.meal.map(|m| m.as_str()))
        .bind(changes.date)
        .bind(image_path)
        .bind(image_url)
        .fetch_optional(&self.db)
        .await
        .context("update food")?;
        Ok(row)
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> anyhow::Result<Option<FoodEntry>> {
        let row = sqlx::query_as::<_, FoodEntry>(&format!(
            "DELETE FROM foods WHERE id = $1 AND user_id = $2 RETURNING {FOOD_COLUMNS}"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await
        .context("delete food")?;
        Ok(row)
    }
}

/// Substring pattern for ILIKE with the wildcard characters escaped.
fn like_pattern(search: &str) -> String {
    let mut out = String::with_capacity(search.len() + 2);
    out.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
