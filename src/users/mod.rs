use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod services;
mod validation;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new().merge(handlers::user_routes(state))
}
