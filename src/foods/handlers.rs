use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{error, instrument};
use uuid::Uuid;

use super::coordinator::{FoodDraft, WriteError};
use super::dto::{ListFoodsQuery, UpdateFoodRequest};
use super::repo_types::{parse_date, FoodChanges, FoodEntry, FoodFilter, MealCategory};
use super::services;
use crate::{
    auth::services::{AuthUser, CurrentOwner},
    extract::{FormFields, JsonOrForm},
    state::AppState,
};

pub fn food_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/foods", get(list_foods).post(create_food))
        .route(
            "/foods/:id",
            get(get_food).put(update_food).delete(delete_food),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
}

/// POST /foods (multipart)
/// Fields: name, meal, date (YYYY-MM-DD), image (optional file)
#[instrument(skip(state, owner, mp))]
pub async fn create_food(
    State(state): State<AppState>,
    CurrentOwner(owner): CurrentOwner,
    mut mp: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<FoodEntry>), (StatusCode, String)> {
    let Some(owner_id) = owner else {
        return Err(create_failure(WriteError::Unauthenticated));
    };

    let mut form = FormFields::read(&mut mp).await?;
    let name = form
        .take("name")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| bad_request("name is required"))?;
    let date = form
        .take("date")
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| bad_request("date is required"))
        .and_then(|d| parse_date(&d).map_err(|_| bad_request("date must be YYYY-MM-DD")))?;
    let meal = form
        .take("meal")
        .unwrap_or_else(|| MealCategory::default().as_str().to_string());

    let entry = state
        .writer()
        .submit(owner_id, FoodDraft { name, meal, date }, form.image)
        .await
        .map_err(create_failure)?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/foods/{}", entry.id)) {
        headers.insert(LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(entry)))
}

#[instrument(skip(state))]
pub async fn list_foods(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ListFoodsQuery>,
) -> Result<Json<Vec<FoodEntry>>, (StatusCode, String)> {
    let date = q
        .date
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(|_| bad_request("date must be YYYY-MM-DD"))?;
    let (limit, offset) = services::page(q.limit, q.offset);
    let filter = FoodFilter {
        search: q.search,
        date,
        meal: q.meal,
        limit,
        offset,
    };
    let foods = services::list_foods(state.foods.as_ref(), user_id, filter)
        .await
        .map_err(|e| internal(e, "Failed to load foods."))?;
    Ok(Json(foods))
}

#[instrument(skip(state))]
pub async fn get_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FoodEntry>, (StatusCode, String)> {
    match state.foods.get(user_id, id).await {
        Ok(Some(entry)) => Ok(Json(entry)),
        Ok(None) => Err(not_found()),
        Err(e) => Err(internal(e, "Failed to load food.")),
    }
}

/// PUT /foods/:id
/// JSON `{name?, meal?, date?}`, or a multipart form with the same fields
/// and an optional `image` file that replaces the stored one.
#[instrument(skip(state, body))]
pub async fn update_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    body: JsonOrForm<UpdateFoodRequest>,
) -> Result<Json<FoodEntry>, (StatusCode, String)> {
    let (req, image) = match body {
        JsonOrForm::Json(req) => (req, None),
        JsonOrForm::Form(mut mp) => {
            let mut form = FormFields::read(&mut mp).await?;
            let meal = form
                .take("meal")
                .map(|m| m.parse::<MealCategory>())
                .transpose()
                .map_err(|e| bad_request(&e))?;
            let req = UpdateFoodRequest {
                name: form.take("name"),
                meal,
                date: form.take("date"),
            };
            (req, form.image)
        }
    };
    let changes = food_changes(req)?;

    let entry = state
        .writer()
        .revise(user_id, id, changes, image)
        .await
        .map_err(update_failure)?;
    Ok(Json(entry))
}

#[instrument(skip(state))]
pub async fn delete_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    match services::delete_food(state.storage.as_ref(), state.foods.as_ref(), user_id, id).await {
        Ok(Some(_)) => Ok(StatusCode::NO_CONTENT),
        Ok(None) => Err(not_found()),
        Err(e) => Err(internal(e, "Failed to delete food.")),
    }
}

fn food_changes(req: UpdateFoodRequest) -> Result<FoodChanges, (StatusCode, String)> {
    let name = match req.name {
        Some(n) if n.trim().is_empty() => return Err(bad_request("name must not be blank")),
        Some(n) => Some(n.trim().to_string()),
        None => None,
    };
    let date = req
        .date
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(|_| bad_request("date must be YYYY-MM-DD"))?;
    Ok(FoodChanges {
        name,
        meal: req.meal,
        date,
        image: None,
    })
}

/// Maps coordinator failures on create to the messages a user can act on.
fn create_failure(e: WriteError) -> (StatusCode, String) {
    match &e {
        WriteError::Unauthenticated => (
            StatusCode::UNAUTHORIZED,
            "You must be logged in to add food.".into(),
        ),
        WriteError::AssetUploadFailed { .. } => {
            error!(error = ?e, "create_food failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to upload image.".into(),
            )
        }
        _ => {
            error!(error = ?e, orphaned_key = ?e.orphaned_key(), "create_food failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save food data.".into(),
            )
        }
    }
}

fn update_failure(e: WriteError) -> (StatusCode, String) {
    match &e {
        WriteError::NotFound => not_found(),
        WriteError::AssetUploadFailed { .. } => {
            error!(error = ?e, "update_food failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to upload image.".into(),
            )
        }
        _ => {
            error!(error = ?e, orphaned_key = ?e.orphaned_key(), "update_food failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update food.".into(),
            )
        }
    }
}

fn bad_request(msg: &str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.to_string())
}

fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Food not found".into())
}

fn internal(e: anyhow::Error, msg: &str) -> (StatusCode, String) {
    error!(error = %e, "{}", msg);
    (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string())
}
