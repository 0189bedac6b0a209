//! 应用层：业务模块、共享状态与路由装配

pub mod auth;
pub mod category;
pub mod device;
pub mod price;
pub mod statistics;
pub mod tags;
pub mod template;
pub mod user;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::warn;

use crate::core::auth::TokenIssuer;
use crate::core::config::Config;
use crate::core::error::CoreError;
use crate::core::middleware::{cors_layer, jwt_auth_middleware, request_logging_middleware};

use auth::{repository::AuthRepository, service::AuthService, wechat::WechatClient};
use category::{repository::CategoryRepository, service::CategoryService};
use device::{repository::DeviceRepository, service::DeviceService};
use price::{repository::PriceRepository, service::PriceService};
use statistics::{repository::StatisticsRepository, service::StatisticsService};
use tags::{repository::TagRepository, service::TagService};
use template::{repository::TemplateRepository, service::TemplateService};
use user::{repository::UserRepository, service::UserService};

/// 所有处理器共享的应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: PgPool,
    pub tokens: TokenIssuer,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub device_service: DeviceService,
    pub price_service: PriceService,
    pub category_service: CategoryService,
    pub template_service: TemplateService,
    pub statistics_service: StatisticsService,
    pub tag_service: TagService,
}

impl AppState {
    pub fn new(config: Config, db: PgPool) -> Result<Self, CoreError> {
        let tokens = TokenIssuer::new(config.jwt.clone());
        let wechat = WechatClient::new(config.wechat.clone())?;
        let users = UserRepository::new(db.clone());
        let prices = PriceRepository::new(db.clone());

        Ok(Self {
            auth_service: AuthService::new(
                AuthRepository::new(db.clone()),
                users.clone(),
                tokens.clone(),
                wechat,
            ),
            user_service: UserService::new(users),
            device_service: DeviceService::new(
                DeviceRepository::new(db.clone()),
                prices.clone(),
                config.upload.clone(),
            ),
            price_service: PriceService::new(prices),
            category_service: CategoryService::new(CategoryRepository::new(db.clone())),
            template_service: TemplateService::new(TemplateRepository::new(db.clone())),
            statistics_service: StatisticsService::new(StatisticsRepository::new(db.clone())),
            tag_service: TagService::new(TagRepository::new(db.clone())),
            config: Arc::new(config),
            db,
            tokens,
        })
    }
}

/// 健康检查，数据库不可用时返回 503
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, database) = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (StatusCode::OK, "connected"),
        Err(e) => {
            warn!("健康检查数据库不可用: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "disconnected")
        }
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "error" },
            "database": database,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// 装配完整路由
///
/// `/api/v1` 下除登录与刷新令牌外都需要访问令牌。中间件由外到内依次是
/// 追踪、访问日志、跨域和超时。
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let protected = Router::new()
        .nest("/users", user::routes())
        .nest("/devices", device::routes())
        .nest("/device-templates", template::routes())
        .nest("/categories", category::routes())
        .nest("/prices", price::routes())
        .nest("/statistics", statistics::routes())
        .nest("/tags", tags::routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    let api = Router::new()
        .nest("/auth", auth::routes(state.clone()))
        .merge(protected);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .nest_service(
            &config.upload.url_prefix,
            ServeDir::new(&config.upload.dir),
        )
        .layer(DefaultBodyLimit::max(config.http.body_limit_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(cors_layer(&config.cors))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.http.timeout_seconds,
                ))),
        )
        .with_state(state)
}
