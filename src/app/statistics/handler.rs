//! 统计报表处理器

use axum::extract::{Extension, State};

use super::model::{
    BrandsStatisticsResponse, CategoryFilterQuery, ComparisonRequest, ComparisonResponse,
    CustomStatisticsRequest, CustomStatisticsResponse, DashboardResponse, DepreciationQuery,
    DepreciationResponse, DeviceAgeResponse, DevicesStatisticsQuery, DevicesStatisticsResponse,
    ExportReportRequest, ExportReportResponse, HeatmapQuery, HeatmapResponse, InsightsResponse,
    InvestmentReturnQuery, InvestmentReturnResponse, PeriodQuery, PriceTrendsQuery,
    PriceTrendsResponse, SpendingQuery, SpendingResponse, ValueAnalysisResponse,
};
use crate::app::AppState;
use crate::core::auth::CurrentUser;
use crate::core::extract::{AppJson, AppQuery, ValidJson};
use crate::core::response::{ok, ApiResult};

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<DashboardResponse> {
    ok(state.statistics_service.dashboard(user.user_id).await?)
}

pub async fn devices(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<DevicesStatisticsQuery>,
) -> ApiResult<DevicesStatisticsResponse> {
    ok(state.statistics_service.devices(user.user_id, query).await?)
}

pub async fn value_analysis(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> ApiResult<ValueAnalysisResponse> {
    ok(state
        .statistics_service
        .value_analysis(user.user_id, query.period)
        .await?)
}

pub async fn price_trends(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<PriceTrendsQuery>,
) -> ApiResult<PriceTrendsResponse> {
    ok(state
        .statistics_service
        .price_trends(user.user_id, query)
        .await?)
}

pub async fn brands(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<CategoryFilterQuery>,
) -> ApiResult<BrandsStatisticsResponse> {
    ok(state
        .statistics_service
        .brands(user.user_id, query.category_id)
        .await?)
}

pub async fn device_age(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<CategoryFilterQuery>,
) -> ApiResult<DeviceAgeResponse> {
    ok(state
        .statistics_service
        .device_age(user.user_id, query.category_id)
        .await?)
}

pub async fn depreciation(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<DepreciationQuery>,
) -> ApiResult<DepreciationResponse> {
    ok(state
        .statistics_service
        .depreciation(user.user_id, query)
        .await?)
}

pub async fn spending(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<SpendingQuery>,
) -> ApiResult<SpendingResponse> {
    ok(state.statistics_service.spending(user.user_id, query).await?)
}

pub async fn heatmap(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<HeatmapQuery>,
) -> ApiResult<HeatmapResponse> {
    ok(state
        .statistics_service
        .heatmap(user.user_id, query.heatmap_type)
        .await?)
}

pub async fn investment_return(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppQuery(query): AppQuery<InvestmentReturnQuery>,
) -> ApiResult<InvestmentReturnResponse> {
    ok(state
        .statistics_service
        .investment_return(user.user_id, query.include_sold)
        .await?)
}

pub async fn custom(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(req): AppJson<CustomStatisticsRequest>,
) -> ApiResult<CustomStatisticsResponse> {
    ok(state.statistics_service.custom(user.user_id, req).await?)
}

pub async fn export(
    State(state): State<AppState>,
    Extension(_user): Extension<CurrentUser>,
    AppJson(req): AppJson<ExportReportRequest>,
) -> ApiResult<ExportReportResponse> {
    ok(state.statistics_service.export(req)?)
}

pub async fn insights(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<InsightsResponse> {
    ok(state.statistics_service.insights(user.user_id).await?)
}

pub async fn comparison(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<ComparisonRequest>,
) -> ApiResult<ComparisonResponse> {
    ok(state
        .statistics_service
        .comparison(user.user_id, req)
        .await?)
}
