//! 设备模板处理器

use axum::extract::{Extension, State};

use super::model::{
    CreateTemplateRequest, DeviceTemplate, PopularTemplatesQuery, TemplateField,
    TemplateListQuery, TemplateListResponse, TemplateStatisticsResponse, UpdateTemplateRequest,
    ValidateDeviceDataRequest, ValidateDeviceDataResponse,
};
use crate::app::AppState;
use crate::core::auth::CurrentUser;
use crate::core::extract::{AppJson, AppPath, AppQuery};
use crate::core::response::{ok, ApiResult, MessageData};

pub async fn list_templates(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<TemplateListQuery>,
) -> ApiResult<TemplateListResponse> {
    ok(state.template_service.list(query).await?)
}

pub async fn popular_templates(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PopularTemplatesQuery>,
) -> ApiResult<Vec<DeviceTemplate>> {
    ok(state.template_service.popular(query.limit).await?)
}

pub async fn recommended_templates(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Vec<DeviceTemplate>> {
    ok(state.template_service.recommendations(user.user_id).await?)
}

pub async fn get_template(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<DeviceTemplate> {
    ok(state.template_service.get(id).await?)
}

pub async fn get_template_fields(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<Vec<TemplateField>> {
    ok(state.template_service.fields(id).await?)
}

pub async fn create_template(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateTemplateRequest>,
) -> ApiResult<DeviceTemplate> {
    ok(state.template_service.create(req).await?)
}

pub async fn update_template(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateTemplateRequest>,
) -> ApiResult<DeviceTemplate> {
    ok(state.template_service.update(id, req).await?)
}

pub async fn delete_template(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<MessageData> {
    state.template_service.delete(id).await?;
    ok(MessageData::new("模板已删除"))
}

pub async fn validate_device_data(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<ValidateDeviceDataRequest>,
) -> ApiResult<ValidateDeviceDataResponse> {
    ok(state.template_service.validate_data(id, req).await?)
}

pub async fn template_statistics(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<TemplateStatisticsResponse> {
    ok(state.template_service.statistics(user.user_id, id).await?)
}
