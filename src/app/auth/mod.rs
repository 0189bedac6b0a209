//! 认证模块：微信登录、令牌刷新、退出与校验

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;
pub mod wechat;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::app::AppState;
use crate::core::middleware::jwt_auth_middleware;

/// 登录和刷新无需认证，退出与校验需要有效的访问令牌
pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(handler::logout))
        .route("/verify", get(handler::verify))
        .route_layer(middleware::from_fn_with_state(state, jwt_auth_middleware));

    Router::new()
        .route("/login", post(handler::login))
        .route("/refresh", post(handler::refresh))
        .merge(protected)
}
