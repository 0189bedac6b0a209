//! 认证处理器

use axum::extract::{Extension, State};

use super::model::{LoginResponse, RefreshTokenRequest, TokenVerifyResponse, WechatLoginRequest};
use crate::app::AppState;
use crate::core::auth::CurrentUser;
use crate::core::extract::ValidJson;
use crate::core::response::{ok, ApiResult, MessageData};

pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<WechatLoginRequest>,
) -> ApiResult<LoginResponse> {
    ok(state.auth_service.login(req).await?)
}

pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshTokenRequest>,
) -> ApiResult<LoginResponse> {
    ok(state.auth_service.refresh(req).await?)
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<MessageData> {
    state.auth_service.logout(&user).await?;
    ok(MessageData::new("已退出登录"))
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<TokenVerifyResponse> {
    ok(state.auth_service.verify(&user).await?)
}
