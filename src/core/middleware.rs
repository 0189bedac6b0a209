//! 核心中间件模块

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use super::auth::{bearer_token, CurrentUser, ACCESS_TOKEN};
use super::config::CorsConfig;
use super::error::CoreError;
use crate::app::AppState;

/// 请求日志中间件
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let client_ip = client_ip(req.headers());
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(req).await;
    let status = response.status();
    let duration = start.elapsed();

    info!(
        "[ACCESS] {} {} - {} - {}ms - IP: {} - UA: {}",
        method,
        path,
        status.as_u16(),
        duration.as_millis(),
        client_ip,
        user_agent
    );

    response
}

/// 反向代理头优先，拿不到时记为 "-"
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|v| v.trim().to_string())
        })
        .unwrap_or_else(|| "-".to_string())
}

/// JWT 认证中间件
///
/// 校验通过后把 [`CurrentUser`] 放进请求扩展，处理器通过 `Extension<CurrentUser>` 取用。
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, CoreError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = bearer_token(header_value)
        .ok_or_else(|| CoreError::unauthorized("认证失败，请提供有效的认证信息"))?;

    let claims = state.tokens.verify(token, ACCESS_TOKEN)?;

    if state.auth_service.is_revoked(&claims.jti).await? {
        warn!("Revoked token used by user {}", claims.user_id);
        return Err(CoreError::unauthorized("令牌已失效，请重新登录"));
    }

    req.extensions_mut().insert(CurrentUser::from(claims));
    Ok(next.run(req).await)
}

/// 根据配置构建跨域层
///
/// 浏览器不接受通配来源与凭证同时出现，因此只有显式列出来源时才允许携带凭证。
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = CorsConfig::split(&config.allow_methods)
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let headers: Vec<header::HeaderName> = CorsConfig::split(&config.allow_headers)
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(config.max_age_seconds));

    if config.allows_any_origin() {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = CorsConfig::split(&config.allow_origins)
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        layer
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "-");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), "10.0.0.2");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }
}
