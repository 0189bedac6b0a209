//! 统计模块：仪表盘、价值分析与各类报表

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
        .route("/dashboard", get(handler::dashboard))
        .route("/devices", get(handler::devices))
        .route("/value-analysis", get(handler::value_analysis))
        .route("/price-trends", get(handler::price_trends))
        .route("/brands", get(handler::brands))
        .route("/device-age", get(handler::device_age))
        .route("/depreciation", get(handler::depreciation))
        .route("/spending", get(handler::spending))
        .route("/heatmap", get(handler::heatmap))
        .route("/investment-return", get(handler::investment_return))
        .route("/custom", post(handler::custom))
        .route("/export", post(handler::export))
        .route("/insights", get(handler::insights))
        .route("/comparison", post(handler::comparison))
}
