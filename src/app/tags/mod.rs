//! 标签模块：系统标签与用户自定义标签

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

use axum::{routing::get, Router};

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::list_tags).post(handler::create_tag))
        .route("/system", get(handler::system_tags))
        .route("/custom", get(handler::custom_tags))
        .route("/popular", get(handler::popular_tags))
        .route("/search", get(handler::search_tags))
        .route("/categories", get(handler::tag_categories))
        .route("/recommendations", get(handler::recommended_tags))
        .route("/statistics", get(handler::tag_statistics))
        .route(
            "/:id",
            get(handler::get_tag)
                .put(handler::update_tag)
                .delete(handler::delete_tag),
        )
}
