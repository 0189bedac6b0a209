//! 统计报表服务

use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashSet;

use super::model::{
    brands, compare_device, custom_statistics, dashboard, depreciation, device_age,
    devices_statistics, export_link, heatmap, insights, investment_return, parse_device_ids,
    parse_group_by, parse_heatmap_type, price_trends, resolve_metrics, spending, value_analysis,
    BrandsStatisticsResponse, ComparisonRequest, ComparisonResponse, CustomStatisticsRequest,
    CustomStatisticsResponse, DashboardResponse, DepreciationQuery, DepreciationResponse,
    DeviceAgeResponse, DevicesStatisticsQuery, DevicesStatisticsResponse, ExportReportRequest,
    ExportReportResponse, HeatmapResponse, InsightsResponse, InvestmentReturnResponse, Period,
    PriceTrendsQuery, PriceTrendsResponse, SpendingQuery, SpendingResponse,
    ValueAnalysisResponse, COMPARISON_METRICS, CUSTOM_METRICS, GROUP_BY_FIELDS,
};
use super::repository::StatisticsRepository;
use crate::analytics::Granularity;
use crate::core::error::CoreError;

const INSIGHT_PRICE_DAYS: i64 = 90;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn category_filter(category_id: Option<i64>) -> Option<i64> {
    category_id.filter(|id| *id > 0)
}

#[derive(Clone)]
pub struct StatisticsService {
    repo: StatisticsRepository,
}

impl StatisticsService {
    pub fn new(repo: StatisticsRepository) -> Self {
        Self { repo }
    }

    pub async fn dashboard(&self, user_id: i64) -> Result<DashboardResponse, CoreError> {
        let devices = self.repo.devices(user_id, None).await?;
        let alerts = self.repo.active_alert_count(user_id).await?;
        Ok(dashboard(&devices, alerts, today()))
    }

    pub async fn devices(
        &self,
        user_id: i64,
        query: DevicesStatisticsQuery,
    ) -> Result<DevicesStatisticsResponse, CoreError> {
        let period = Period::parse(query.period.as_deref(), "month")?;
        let group_by = parse_group_by(query.group_by.as_deref())?;
        let devices = self.repo.devices(user_id, None).await?;
        Ok(devices_statistics(&devices, &period, group_by, today()))
    }

    pub async fn value_analysis(
        &self,
        user_id: i64,
        period: Option<String>,
    ) -> Result<ValueAnalysisResponse, CoreError> {
        let period = Period::parse(period.as_deref(), "month")?;
        let devices = self.repo.devices(user_id, None).await?;
        Ok(value_analysis(&devices, &period, today()))
    }

    pub async fn price_trends(
        &self,
        user_id: i64,
        query: PriceTrendsQuery,
    ) -> Result<PriceTrendsResponse, CoreError> {
        let period = Period::parse(query.period.as_deref(), "30d")?;
        let ids = parse_device_ids(query.device_ids.as_deref())?;
        let since = Utc::now() - Duration::days(period.days);
        let points = self.repo.price_points(user_id, since, &ids).await?;
        Ok(PriceTrendsResponse {
            period: period.label,
            items: price_trends(&points),
        })
    }

    pub async fn brands(
        &self,
        user_id: i64,
        category_id: Option<i64>,
    ) -> Result<BrandsStatisticsResponse, CoreError> {
        let devices = self.repo.devices(user_id, category_filter(category_id)).await?;
        Ok(brands(&devices))
    }

    pub async fn device_age(
        &self,
        user_id: i64,
        category_id: Option<i64>,
    ) -> Result<DeviceAgeResponse, CoreError> {
        let devices = self.repo.devices(user_id, category_filter(category_id)).await?;
        Ok(device_age(&devices, today()))
    }

    pub async fn depreciation(
        &self,
        user_id: i64,
        query: DepreciationQuery,
    ) -> Result<DepreciationResponse, CoreError> {
        let period = Period::parse(query.period.as_deref(), "month")?;
        let devices = self
            .repo
            .devices(user_id, category_filter(query.category_id))
            .await?;
        Ok(depreciation(&devices, &period, today()))
    }

    pub async fn spending(
        &self,
        user_id: i64,
        query: SpendingQuery,
    ) -> Result<SpendingResponse, CoreError> {
        let period = Period::parse(query.period.as_deref(), "year")?;
        let group_by = query
            .group_by
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or("month")
            .to_string();
        let granularity =
            Granularity::parse(&group_by).ok_or_else(|| CoreError::bad_request("无效的分组方式"))?;

        let devices = self.repo.devices(user_id, None).await?;
        Ok(SpendingResponse {
            trend: spending(&devices, &period, granularity, today()),
            period: period.label,
            group_by,
        })
    }

    pub async fn heatmap(
        &self,
        user_id: i64,
        heatmap_type: Option<String>,
    ) -> Result<HeatmapResponse, CoreError> {
        let heatmap_type = parse_heatmap_type(heatmap_type.as_deref())?;
        let devices = self.repo.devices(user_id, None).await?;
        Ok(HeatmapResponse {
            data: heatmap(&devices, &heatmap_type),
            heatmap_type,
        })
    }

    pub async fn investment_return(
        &self,
        user_id: i64,
        include_sold: Option<bool>,
    ) -> Result<InvestmentReturnResponse, CoreError> {
        let devices = self.repo.devices(user_id, None).await?;
        Ok(investment_return(&devices, include_sold.unwrap_or(true)))
    }

    pub async fn custom(
        &self,
        user_id: i64,
        req: CustomStatisticsRequest,
    ) -> Result<CustomStatisticsResponse, CoreError> {
        let metrics = resolve_metrics(&req.metrics, &CUSTOM_METRICS)?;
        let group_by = match req.group_by.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            Some(g) if GROUP_BY_FIELDS.contains(&g) => Some(g),
            Some(_) => return Err(CoreError::bad_request("无效的分组方式")),
            None => None,
        };

        let devices = self.repo.devices(user_id, None).await?;
        let alert_counts = if metrics.contains(&"alert_count") {
            self.repo.alert_counts(user_id).await?
        } else {
            Default::default()
        };
        Ok(CustomStatisticsResponse {
            result: custom_statistics(&devices, &alert_counts, &metrics, &req.filters, group_by),
        })
    }

    pub fn export(&self, req: ExportReportRequest) -> Result<ExportReportResponse, CoreError> {
        export_link(&req, Utc::now())
    }

    pub async fn insights(&self, user_id: i64) -> Result<InsightsResponse, CoreError> {
        let devices = self.repo.devices(user_id, None).await?;
        let since = Utc::now() - Duration::days(INSIGHT_PRICE_DAYS);
        let prices = self.repo.price_points(user_id, since, &[]).await?;
        let alerted = self.repo.alerted_devices(user_id).await?;
        Ok(InsightsResponse {
            items: insights(&devices, &prices, &alerted, today()),
        })
    }

    pub async fn comparison(
        &self,
        user_id: i64,
        req: ComparisonRequest,
    ) -> Result<ComparisonResponse, CoreError> {
        let metrics = resolve_metrics(&req.metrics, &COMPARISON_METRICS)?;
        let wanted: HashSet<i64> = req.device_ids.iter().copied().collect();

        let devices: Vec<_> = self
            .repo
            .devices(user_id, None)
            .await?
            .into_iter()
            .filter(|d| wanted.contains(&d.id))
            .collect();
        let ids: Vec<i64> = devices.iter().map(|d| d.id).collect();
        let market = if metrics.contains(&"latest_market_price") && !ids.is_empty() {
            self.repo.latest_market_prices(&ids).await?
        } else {
            Default::default()
        };

        let today = today();
        // 按请求中的顺序输出
        let items = req
            .device_ids
            .iter()
            .filter_map(|id| devices.iter().find(|d| d.id == *id))
            .map(|d| compare_device(d, market.get(&d.id).copied(), &metrics, today))
            .collect();
        Ok(ComparisonResponse { items })
    }
}
