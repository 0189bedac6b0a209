//! 设备模块：设备台账、估值预测、批量导入与图片管理

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::list_devices).post(handler::create_device))
        .route("/import", post(handler::import_devices))
        .route(
            "/:id",
            get(handler::get_device)
                .put(handler::update_device)
                .delete(handler::delete_device),
        )
        .route("/:id/status", patch(handler::update_status))
        .route("/:id/valuation", get(handler::get_valuation))
        .route("/:id/prediction", get(handler::get_prediction))
        .route(
            "/:id/images",
            get(handler::list_images).post(handler::upload_image),
        )
        .route("/:id/images/:image_id", delete(handler::delete_image))
}
