//! 分类模块：系统分类与用户自定义分类的树形管理

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

use axum::{
    routing::{get, put},
    Router,
};

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handler::list_categories).post(handler::create_category),
        )
        .route("/system", get(handler::system_categories))
        .route("/custom", get(handler::custom_categories))
        .route("/sort", put(handler::sort_categories))
        .route("/statistics", get(handler::category_statistics))
        .route("/search", get(handler::search_categories))
        .route(
            "/:id",
            get(handler::get_category)
                .put(handler::update_category)
                .delete(handler::delete_category),
        )
}
