//! 分类处理器

use axum::extract::{Extension, State};

use super::model::{
    Category, CategoryListQuery, CategoryListResponse, CategoryScope, CategoryStatisticsQuery,
    CategoryStatisticsResponse, CreateCategoryRequest, SearchCategoriesQuery,
    SortCategoriesRequest, UpdateCategoryRequest,
};
use crate::app::AppState;
use crate::core::auth::CurrentUser;
use crate::core::extract::{AppPath, AppQuery, ValidJson};
use crate::core::response::{ok, ApiResult, MessageData};

pub async fn list_categories(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<CategoryListQuery>,
) -> ApiResult<CategoryListResponse> {
    ok(state.category_service.list(user.user_id, query).await?)
}

pub async fn system_categories(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<CategoryListResponse> {
    ok(state
        .category_service
        .tree(user.user_id, CategoryScope::System)
        .await?)
}

pub async fn custom_categories(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<CategoryListResponse> {
    ok(state
        .category_service
        .tree(user.user_id, CategoryScope::Custom)
        .await?)
}

pub async fn get_category(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<Category> {
    ok(state.category_service.get(user.user_id, id).await?)
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<CreateCategoryRequest>,
) -> ApiResult<Category> {
    ok(state.category_service.create(user.user_id, req).await?)
}

pub async fn update_category(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
    ValidJson(req): ValidJson<UpdateCategoryRequest>,
) -> ApiResult<Category> {
    ok(state.category_service.update(user.user_id, id, req).await?)
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<MessageData> {
    state.category_service.delete(user.user_id, id).await?;
    ok(MessageData::new("分类已删除"))
}

pub async fn sort_categories(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<SortCategoriesRequest>,
) -> ApiResult<MessageData> {
    state.category_service.sort(user.user_id, req).await?;
    ok(MessageData::new("排序已更新"))
}

pub async fn category_statistics(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<CategoryStatisticsQuery>,
) -> ApiResult<CategoryStatisticsResponse> {
    ok(state
        .category_service
        .statistics(user.user_id, query.period)
        .await?)
}

pub async fn search_categories(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<SearchCategoriesQuery>,
) -> ApiResult<CategoryListResponse> {
    ok(state
        .category_service
        .search(user.user_id, query.keyword, query.category_type)
        .await?)
}
