//! 价格处理器

use axum::{
    body::Bytes,
    extract::{Extension, State},
};

use super::model::{
    BatchUpdatePricesRequest, BatchUpdatePricesResponse, CreatePriceAlertRequest,
    DevicePriceResponse, MarketComparisonResponse, PriceAlert, PriceAlertListResponse,
    PriceAlertQuery, PriceHistoryQuery, PriceHistoryResponse, PricePredictionQuery,
    PricePredictionResponse, PriceSource, PriceTrendResponse, UpdatePriceAlertRequest,
    UpdatePriceRequest, UpdatePriceResponse,
};
use crate::app::AppState;
use crate::core::auth::CurrentUser;
use crate::core::error::CoreError;
use crate::core::extract::{AppJson, AppPath, AppQuery, ValidJson};
use crate::core::response::{ok, ApiResult, MessageData};

pub async fn get_device_price(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(device_id): AppPath<i64>,
) -> ApiResult<DevicePriceResponse> {
    ok(state.price_service.get_device_price(user.user_id, device_id).await?)
}

pub async fn get_history(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(device_id): AppPath<i64>,
    AppQuery(query): AppQuery<PriceHistoryQuery>,
) -> ApiResult<PriceHistoryResponse> {
    ok(state
        .price_service
        .get_history(user.user_id, device_id, query)
        .await?)
}

pub async fn get_trend(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(device_id): AppPath<i64>,
) -> ApiResult<PriceTrendResponse> {
    ok(state.price_service.get_trend(user.user_id, device_id).await?)
}

pub async fn get_prediction(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(device_id): AppPath<i64>,
    AppQuery(query): AppQuery<PricePredictionQuery>,
) -> ApiResult<PricePredictionResponse> {
    ok(state
        .price_service
        .get_prediction(user.user_id, device_id, query.period)
        .await?)
}

/// 请求体可以为空，此时按市场估价更新
pub async fn update_price(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(device_id): AppPath<i64>,
    body: Bytes,
) -> ApiResult<UpdatePriceResponse> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        UpdatePriceRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| CoreError::bad_request("参数解析失败"))?
    };
    ok(state
        .price_service
        .update_price(user.user_id, device_id, req)
        .await?)
}

pub async fn get_comparison(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(device_id): AppPath<i64>,
) -> ApiResult<MarketComparisonResponse> {
    ok(state.price_service.get_comparison(user.user_id, device_id).await?)
}

pub async fn create_alert(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(device_id): AppPath<i64>,
    AppJson(req): AppJson<CreatePriceAlertRequest>,
) -> ApiResult<PriceAlert> {
    ok(state
        .price_service
        .create_alert(user.user_id, device_id, req)
        .await?)
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<PriceAlertQuery>,
) -> ApiResult<PriceAlertListResponse> {
    ok(state.price_service.list_alerts(user.user_id, query).await?)
}

pub async fn update_alert(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(alert_id): AppPath<i64>,
    AppJson(req): AppJson<UpdatePriceAlertRequest>,
) -> ApiResult<PriceAlert> {
    ok(state
        .price_service
        .update_alert(user.user_id, alert_id, req)
        .await?)
}

pub async fn delete_alert(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppPath(alert_id): AppPath<i64>,
) -> ApiResult<MessageData> {
    state.price_service.delete_alert(user.user_id, alert_id).await?;
    ok(MessageData::new("价格预警已删除"))
}

pub async fn get_sources(State(state): State<AppState>) -> ApiResult<Vec<PriceSource>> {
    ok(state.price_service.sources().await?)
}

pub async fn batch_update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<BatchUpdatePricesRequest>,
) -> ApiResult<BatchUpdatePricesResponse> {
    ok(state.price_service.batch_update(user.user_id, req).await?)
}
