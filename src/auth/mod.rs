use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};

mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes().layer(DefaultBodyLimit::max(upload_limit)))
}
