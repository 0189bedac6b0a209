//! 设备模板模块：字段定义、设备数据校验与使用统计

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

use axum::{
    routing::{get, post},
    Router,
};

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handler::list_templates).post(handler::create_template),
        )
        .route("/popular", get(handler::popular_templates))
        .route("/recommendations", get(handler::recommended_templates))
        .route(
            "/:id",
            get(handler::get_template)
                .put(handler::update_template)
                .delete(handler::delete_template),
        )
        .route("/:id/fields", get(handler::get_template_fields))
        .route("/:id/validate", post(handler::validate_device_data))
        .route("/:id/statistics", get(handler::template_statistics))
}
