//! 设备处理器

use axum::extract::{multipart::MultipartRejection, Extension, Multipart, State};

use super::model::{
    BatchImportDevicesRequest, BatchImportDevicesResponse, CreateDeviceRequest, Device,
    DeviceImage, DeviceListQuery, DeviceListResponse, DeviceValuationResponse, PredictionQuery,
    PricePredictionResponse, UpdateDeviceRequest, UpdateDeviceStatusRequest,
    UploadDeviceImageResponse,
};
use super::service::ImageUpload;
use crate::app::AppState;
use crate::core::auth::CurrentUser;
use crate::core::error::CoreError;
use crate::core::extract::{AppJson, AppPath, AppQuery};
use crate::core::response::{ok, ApiResult, MessageData};

pub async fn list_devices(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<DeviceListQuery>,
) -> ApiResult<DeviceListResponse> {
    ok(state.device_service.list(user.user_id, query).await?)
}

pub async fn get_device(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<Device> {
    ok(state.device_service.get(user.user_id, id).await?)
}

pub async fn create_device(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(req): AppJson<CreateDeviceRequest>,
) -> ApiResult<Device> {
    ok(state.device_service.create(user.user_id, req).await?)
}

pub async fn update_device(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateDeviceRequest>,
) -> ApiResult<Device> {
    ok(state.device_service.update(user.user_id, id, req).await?)
}

pub async fn delete_device(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<MessageData> {
    state.device_service.delete(user.user_id, id).await?;
    ok(MessageData::new("设备已删除"))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateDeviceStatusRequest>,
) -> ApiResult<Device> {
    ok(state
        .device_service
        .update_status(user.user_id, id, req)
        .await?)
}

pub async fn get_valuation(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<DeviceValuationResponse> {
    ok(state.device_service.valuation(user.user_id, id).await?)
}

pub async fn get_prediction(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
    AppQuery(query): AppQuery<PredictionQuery>,
) -> ApiResult<PricePredictionResponse> {
    ok(state
        .device_service
        .prediction(user.user_id, id, query.days)
        .await?)
}

pub async fn import_devices(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(req): AppJson<BatchImportDevicesRequest>,
) -> ApiResult<BatchImportDevicesResponse> {
    ok(state.device_service.import(user.user_id, req).await?)
}

pub async fn list_images(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
) -> ApiResult<Vec<DeviceImage>> {
    ok(state.device_service.images(user.user_id, id).await?)
}

/// 表单字段：image（文件）、image_type、sort_order
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(id): AppPath<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<UploadDeviceImageResponse> {
    let mut multipart =
        multipart.map_err(|_| CoreError::bad_request("请使用 multipart/form-data 上传"))?;
    let upload_failed = |_: axum::extract::multipart::MultipartError| {
        CoreError::bad_request("文件上传失败")
    };

    let mut upload = ImageUpload::default();
    let mut has_file = false;
    while let Some(field) = multipart.next_field().await.map_err(upload_failed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                upload.file_name = field.file_name().unwrap_or_default().to_string();
                upload.content_type = field.content_type().map(str::to_string);
                upload.bytes = field.bytes().await.map_err(upload_failed)?.to_vec();
                has_file = true;
            }
            "image_type" => {
                upload.image_type = Some(field.text().await.map_err(upload_failed)?);
            }
            "sort_order" => {
                let text = field.text().await.map_err(upload_failed)?;
                upload.sort_order = Some(
                    text.trim()
                        .parse()
                        .map_err(|_| CoreError::bad_request("排序值必须是整数"))?,
                );
            }
            _ => {}
        }
    }

    if !has_file {
        return Err(CoreError::bad_request("请选择要上传的图片"));
    }

    ok(state
        .device_service
        .upload_image(user.user_id, id, upload)
        .await?)
}

pub async fn delete_image(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath((id, image_id)): AppPath<(i64, i64)>,
) -> ApiResult<MessageData> {
    state
        .device_service
        .delete_image(user.user_id, id, image_id)
        .await?;
    ok(MessageData::new("图片已删除"))
}
