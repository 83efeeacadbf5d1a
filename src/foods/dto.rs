use serde::Deserialize;

use super::repo_types::MealCategory;

/// Query string of `GET /foods`.
#[derive(Debug, Default, Deserialize)]
pub struct ListFoodsQuery {
    pub search: Option<String>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    pub meal: Option<MealCategory>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Body of `PUT /foods/:id`; the multipart form uses the same field names
/// plus an optional `image` file.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateFoodRequest {
    pub name: Option<String>,
    pub meal: Option<MealCategory>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
}
