//! 用户处理器

use axum::extract::{Extension, State};

use super::model::{
    Preferences, UpdatePreferencesRequest, UpdateProfileRequest, UpdateUserTagsRequest, User,
    UserStatistics, UserTagInfo,
};
use crate::app::AppState;
use crate::core::auth::CurrentUser;
use crate::core::extract::ValidJson;
use crate::core::response::{ok, ApiResult, MessageData};

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<User> {
    ok(state.user_service.get_profile(user.user_id).await?)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> ApiResult<User> {
    ok(state.user_service.update_profile(user.user_id, req).await?)
}

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Preferences> {
    ok(state.user_service.get_preferences(user.user_id).await?)
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<UpdatePreferencesRequest>,
) -> ApiResult<Preferences> {
    ok(state.user_service.update_preferences(user.user_id, req).await?)
}

pub async fn get_tags(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Vec<UserTagInfo>> {
    ok(state.user_service.get_tags(user.user_id).await?)
}

pub async fn update_tags(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<UpdateUserTagsRequest>,
) -> ApiResult<Vec<UserTagInfo>> {
    ok(state.user_service.update_tags(user.user_id, req).await?)
}

pub async fn get_statistics(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<UserStatistics> {
    ok(state.user_service.statistics(user.user_id).await?)
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<MessageData> {
    state.user_service.delete_account(user.user_id).await?;
    state.auth_service.revoke(&user.jti, user.exp).await?;
    ok(MessageData::new("账号已注销"))
}
