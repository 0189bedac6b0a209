//! 标签处理器

use axum::extract::{Extension, State};

use super::model::{
    CreateTagRequest, PopularTagsQuery, SearchTagsQuery, Tag, TagCategoriesResponse,
    TagDetailResponse, TagListQuery, TagListResponse, TagScope, TagStatisticsQuery,
    TagStatisticsResponse, TagsResponse, UpdateTagRequest,
};
use crate::app::AppState;
use crate::core::auth::CurrentUser;
use crate::core::extract::{AppPath, AppQuery, ValidJson};
use crate::core::response::{ok, ApiResult, MessageData};

pub async fn list_tags(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<TagListQuery>,
) -> ApiResult<TagListResponse> {
    ok(state.tag_service.list(user.user_id, query).await?)
}

pub async fn system_tags(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<TagListResponse> {
    ok(state
        .tag_service
        .list_scope(user.user_id, TagScope::System)
        .await?)
}

pub async fn custom_tags(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<TagListResponse> {
    ok(state
        .tag_service
        .list_scope(user.user_id, TagScope::Custom)
        .await?)
}

pub async fn get_tag(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<TagDetailResponse> {
    ok(state.tag_service.get(user.user_id, id).await?)
}

pub async fn create_tag(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<CreateTagRequest>,
) -> ApiResult<Tag> {
    ok(state.tag_service.create(user.user_id, req).await?)
}

pub async fn update_tag(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
    ValidJson(req): ValidJson<UpdateTagRequest>,
) -> ApiResult<Tag> {
    ok(state.tag_service.update(user.user_id, id, req).await?)
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<MessageData> {
    state.tag_service.delete(user.user_id, id).await?;
    ok(MessageData::new("标签已删除"))
}

pub async fn popular_tags(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<PopularTagsQuery>,
) -> ApiResult<TagListResponse> {
    ok(state.tag_service.popular(user.user_id, query).await?)
}

pub async fn search_tags(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<SearchTagsQuery>,
) -> ApiResult<TagListResponse> {
    ok(state.tag_service.search(user.user_id, query).await?)
}

pub async fn tag_categories(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<TagCategoriesResponse> {
    ok(state.tag_service.categories(user.user_id).await?)
}

pub async fn recommended_tags(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<TagsResponse> {
    ok(state.tag_service.recommendations(user.user_id).await?)
}

pub async fn tag_statistics(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<TagStatisticsQuery>,
) -> ApiResult<TagStatisticsResponse> {
    ok(state
        .tag_service
        .statistics(user.user_id, query.period)
        .await?)
}
