//! 价格模块：价格历史、趋势、预测、预警与市场对比

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/device/:id", get(handler::get_device_price))
        .route("/device/:id/history", get(handler::get_history))
        .route("/device/:id/trend", get(handler::get_trend))
        .route("/device/:id/prediction", get(handler::get_prediction))
        .route("/device/:id/update", post(handler::update_price))
        .route("/device/:id/comparison", get(handler::get_comparison))
        .route("/device/:id/alerts", post(handler::create_alert))
        .route("/alerts", get(handler::list_alerts))
        .route(
            "/alerts/:alert_id",
            put(handler::update_alert).delete(handler::delete_alert),
        )
        .route("/sources", get(handler::get_sources))
        .route("/batch-update", post(handler::batch_update))
}
