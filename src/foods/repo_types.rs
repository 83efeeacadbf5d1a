use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use crate::images::ImageRef;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Parses the `YYYY-MM-DD` form used by forms and query strings.
pub fn parse_date(text: &str) -> Result<Date, time::error::Parse> {
    Date::parse(text.trim(), format_description!("[year]-[month]-[day]"))
}

/// Meal slot a food entry belongs to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum MealCategory {
    #[default]
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MealCategory::Breakfast => "Breakfast",
            MealCategory::Lunch => "Lunch",
            MealCategory::Dinner => "Dinner",
            MealCategory::Snack => "Snack",
        }
    }
}

impl std::str::FromStr for MealCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Breakfast" => Ok(MealCategory::Breakfast),
            "Lunch" => Ok(MealCategory::Lunch),
            "Dinner" => Ok(MealCategory::Dinner),
            "Snack" => Ok(MealCategory::Snack),
            other => Err(format!("unknown meal {other:?}")),
        }
    }
}

/// Food row as stored.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct FoodEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub meal: String,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub image_path: Option<String>,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Row handed to the record store on insert. `meal` is passed through
/// as given; the store rejects values outside [`MealCategory`].
#[derive(Debug, Clone)]
pub struct NewFood {
    pub owner_id: Uuid,
    pub name: String,
    pub meal: String,
    pub date: Date,
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, Default)]
pub struct FoodFilter {
    pub search: Option<String>,
    pub date: Option<Date>,
    pub meal: Option<MealCategory>,
    pub limit: i64,
    pub offset: i64,
}

/// Partial edit of a food row; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct FoodChanges {
    pub name: Option<String>,
    pub meal: Option<MealCategory>,
    pub date: Option<Date>,
    pub image: Option<ImageRef>,
}

/// Row after an update, with the image key it pointed at before.
#[derive(Debug, Clone, FromRow)]
pub struct UpdatedFood {
    #[sqlx(flatten)]
    pub entry: FoodEntry,
    pub previous_image: Option<String>,
}
