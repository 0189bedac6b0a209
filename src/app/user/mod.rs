//! 用户模块：资料、偏好、标签绑定与账号注销

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

use axum::{
    routing::{delete, get},
    Router,
};

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/profile",
            get(handler::get_profile).put(handler::update_profile),
        )
        .route(
            "/preferences",
            get(handler::get_preferences).put(handler::update_preferences),
        )
        .route("/tags", get(handler::get_tags).put(handler::update_tags))
        .route("/statistics", get(handler::get_statistics))
        .route("/account", delete(handler::delete_account))
}
